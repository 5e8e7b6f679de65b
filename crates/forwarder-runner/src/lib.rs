//! Library half of the forwarder binary, split out so integration tests can
//! reach [`Runner`] and the GPIO/MAC stand-ins without spawning a process.

pub mod can_stub;
pub mod ignition;
pub mod runner;

pub use can_stub::StubCanChannel;
pub use ignition::{Ignition, LoggingGpio, MacSource, StatusIndicators, SystemMacSource};
pub use runner::Runner;
