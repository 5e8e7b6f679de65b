use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde::Serialize;

use crate::request::{parse_request, Command, RequestError};

/// Backoff between reconnect attempts after a TCP failure.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Lifecycle of the single persistent control-plane socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    /// Terminal: reconnection is disabled until the process restarts.
    Unreachable,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    #[serde(rename = "MAC")]
    mac: &'a str,
    #[serde(rename = "AttachedDevices")]
    attached_devices: &'a serde_json::Value,
}

/// Maintains the keep-alive TCP connection to the Controller and carries the
/// bi-directional HTTP/1.1 control-plane traffic on it.
pub struct HttpClient {
    server_address: String,
    server_port: u16,
    stream: Option<TcpStream>,
    status: ConnectionStatus,
    next_attempt: Option<Instant>,
    read_buf: Vec<u8>,
}

impl HttpClient {
    #[must_use]
    pub fn new(server_address: impl Into<String>, server_port: u16) -> Self {
        Self {
            server_address: server_address.into(),
            server_port,
            stream: None,
            status: ConnectionStatus::Disconnected,
            next_attempt: None,
            read_buf: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Resolve the Controller and register, retrying once on an HTTP `>=400`
    /// response before declaring the link [`ConnectionStatus::Unreachable`].
    ///
    /// Returns `Ok(false)` without error when called before `next_attempt`'s
    /// 60-second backoff has elapsed — the caller is expected to call this
    /// every tick and let the deadline gate it, rather than sleeping.
    pub fn connect(&mut self, now: Instant, mac: &str, attached_devices: &serde_json::Value) -> eyre::Result<bool> {
        if self.status == ConnectionStatus::Unreachable {
            return Ok(false);
        }
        if let Some(deadline) = self.next_attempt {
            if now < deadline {
                return Ok(false);
            }
        }

        match self.attempt_connection(mac, attached_devices) {
            Ok(()) => {
                self.status = ConnectionStatus::Connected;
                self.next_attempt = None;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "registration attempt failed, backing off");
                self.status = ConnectionStatus::Disconnected;
                self.next_attempt = Some(now + RECONNECT_BACKOFF);
                Ok(false)
            }
        }
    }

    fn attempt_connection(&mut self, mac: &str, attached_devices: &serde_json::Value) -> eyre::Result<()> {
        let body = serde_json::to_string(&RegisterBody {
            mac,
            attached_devices,
        })?;

        for attempt in 0..2 {
            let addr = (self.server_address.as_str(), self.server_port)
                .to_socket_addrs()
                .wrap_err("failed to resolve Controller address")?
                .next()
                .ok_or_else(|| eyre::eyre!("no addresses resolved for Controller"))?;

            let mut stream = TcpStream::connect(addr).wrap_err("TCP connect to Controller failed")?;
            stream.set_nodelay(true).ok();

            let request = format!(
                "POST /sssf/register HTTP/1.1\r\nConnection: keep-alive\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(request.as_bytes())?;

            let code = read_status_code(&mut stream)?;
            if code < 400 {
                stream.set_nonblocking(true)?;
                self.stream = Some(stream);
                return Ok(());
            }

            tracing::warn!(code, attempt, "registration rejected by Controller");
        }

        Err(eyre::eyre!("registration rejected twice, giving up this round"))
    }

    /// Non-blocking poll for an inbound command. `Ok(None)` means no
    /// complete request has arrived yet; a malformed request is answered
    /// with `400`/`501` and reported as `Ok(None)` so the caller keeps
    /// running.
    pub fn read(&mut self) -> eyre::Result<Option<Command>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    tracing::warn!("Controller closed the control-plane socket");
                    self.stream = None;
                    self.status = ConnectionStatus::Disconnected;
                    return Ok(None);
                }
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).wrap_err("reading from Controller"),
            }
        }

        if self.read_buf.is_empty() {
            return Ok(None);
        }

        match parse_request(&self.read_buf) {
            Ok(command) => {
                self.read_buf.clear();
                Ok(Some(command))
            }
            Err(RequestError::Incomplete) => Ok(None),
            Err(RequestError::UnsupportedMethod(_)) => {
                self.read_buf.clear();
                self.respond(501, "NOT IMPLEMENTED")?;
                Ok(None)
            }
            Err(other) => {
                tracing::warn!(?other, "rejecting malformed control-plane request");
                self.read_buf.clear();
                self.respond(400, "BAD REQUEST")?;
                Ok(None)
            }
        }
    }

    /// Write a bare status-line response with no body on the same socket.
    pub fn respond(&mut self, code: u16, reason: &str) -> eyre::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let response = format!("HTTP/1.1 {code} {reason}\r\nContent-Length: 0\r\n\r\n");
        stream.write_all(response.as_bytes()).wrap_err("writing control-plane response")
    }
}

fn read_status_code(stream: &mut TcpStream) -> eyre::Result<u16> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&buf);
    let line = text.lines().next().ok_or_else(|| eyre::eyre!("empty response from Controller"))?;
    let code = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| eyre::eyre!("malformed status line: {line:?}"))?;
    code.parse::<u16>().wrap_err_with(|| format!("malformed status code: {code:?}"))
}
