//! The HTTP/1.1 control-plane channel to the Controller.
//!
//! Non-standard by REST conventions: after this node's initial
//! `POST /sssf/register`, the Controller sends its own POST/DELETE requests
//! back down the SAME socket to start and stop a session. There is no
//! off-the-shelf HTTP crate for that shape, so this is a small hand-rolled
//! request-line/header/body parser rather than a client library.

mod client;
mod request;

pub use client::{ConnectionStatus, HttpClient, RECONNECT_BACKOFF};
pub use request::{Command, RequestError};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}
