//! Bridges local CAN channels into the multicast group and back.
//!
//! This crate owns the frame model ([`CanFrame`]), the external driver
//! contract ([`CanChannel`]), and the autobaud probe ([`Autobaud`]). It does
//! not own a socket, a sequence counter, or a statistics table — those are
//! session state the runner threads through explicit function calls.

mod autobaud;
mod channel;
mod frame;

pub use autobaud::{Autobaud, AutobaudOutcome, CANDIDATE_BAUD_RATES};
pub use channel::CanChannel;
pub use frame::{from_can_payload, to_can_payload, CanFrame};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}
