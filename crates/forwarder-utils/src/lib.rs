pub mod log;
pub mod mac;

pub use log::RotatingLogWriter;
pub use mac::format_mac;
