//! The [`CommBlock`] envelope carried over the UDP multicast group.
//!
//! Every datagram on the data plane starts with a 14-byte header (`index`,
//! `kind`, `frameNumber`, `timestamp`) followed by a payload whose shape is
//! determined entirely by `kind`. Nothing here depends on in-memory struct
//! layout: every field is written and read byte-by-byte in little-endian
//! order so the wire format is stable regardless of what the compiler would
//! otherwise do with padding.

mod codec;
mod header;
mod payload;

pub use codec::{encoded_len, pack, unpack};
pub use header::{Header, Kind};
pub use payload::{
    CanPayload, CommBlock, HealthCore, NodeReport, Payload, ReportPayload, SensorPayload,
};

/// Size in bytes of the mandatory [`Header`] on every datagram.
pub const HEADER_LEN: usize = 14;

/// Maximum number of sensor signals a [`SensorPayload`] may carry.
pub const MAX_SIGNALS: usize = 16;

/// Maximum data length for a classic (non-FD) CAN frame.
pub const MAX_CLASSIC_DATA_LEN: usize = 8;

/// Maximum data length for a CAN-FD frame.
pub const MAX_FD_DATA_LEN: usize = 64;

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}
