use std::net::Ipv4Addr;

use serde::Deserialize;

/// A parsed, validated inbound control-plane command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start {
        id: u32,
        index: u8,
        ip: Ipv4Addr,
        port: u16,
        devices: serde_json::Value,
    },
    Stop,
}

/// Why an inbound request was rejected with `400 BAD REQUEST`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// Not a complete HTTP request yet; caller should wait for more bytes.
    Incomplete,
    /// Method other than POST/DELETE: `501 NOT IMPLEMENTED` rather than 400.
    UnsupportedMethod(String),
    MalformedRequestLine,
    MalformedHeaders,
    MissingBody,
    InvalidJson(String),
    MissingField(&'static str),
    /// The multicast group address didn't start with `239.255.`.
    InvalidMulticastAddress,
    /// The port fell outside `[1025, 65535]`.
    InvalidPort(u16),
    NonEmptyDeleteBody,
}

#[derive(Deserialize)]
struct StartBody {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Index")]
    index: u8,
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Devices")]
    devices: serde_json::Value,
}

/// Split a raw byte buffer into (request-line, headers, body) without
/// consuming it; returns `None` if the header block hasn't fully arrived.
fn split_request(buf: &[u8]) -> Option<(&str, &str, &[u8])> {
    let text_end = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
    let head = std::str::from_utf8(&buf[..text_end]).ok()?;
    let body = &buf[text_end + 4..];

    let mut lines = head.splitn(2, "\r\n");
    let request_line = lines.next()?;
    let headers = lines.next().unwrap_or("");
    Some((request_line, headers, body))
}

fn content_length(headers: &str) -> usize {
    headers
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn validate_multicast(ip: &str) -> bool {
    ip.starts_with("239.255.")
}

fn validate_port(port: u16) -> bool {
    (1025..=65535).contains(&port)
}

/// Parse and validate one HTTP request out of `buf`.
///
/// Returns [`RequestError::Incomplete`] if the headers (or, once known, the
/// body) haven't fully arrived yet — the caller should leave the bytes
/// buffered and try again after the next non-blocking read.
pub fn parse_request(buf: &[u8]) -> Result<Command, RequestError> {
    let (request_line, headers, body) =
        split_request(buf).ok_or(RequestError::Incomplete)?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(RequestError::MalformedRequestLine)?;
    let _uri = parts.next().ok_or(RequestError::MalformedRequestLine)?;
    let _version = parts.next().ok_or(RequestError::MalformedRequestLine)?;

    let declared_len = content_length(headers);
    if body.len() < declared_len {
        return Err(RequestError::Incomplete);
    }
    let body = &body[..declared_len];

    match method {
        "POST" => {
            if body.is_empty() {
                return Err(RequestError::MissingBody);
            }
            let parsed: StartBody = serde_json::from_slice(body)
                .map_err(|e| RequestError::InvalidJson(e.to_string()))?;

            if !validate_multicast(&parsed.ip) {
                return Err(RequestError::InvalidMulticastAddress);
            }
            if !validate_port(parsed.port) {
                return Err(RequestError::InvalidPort(parsed.port));
            }
            let ip: Ipv4Addr = parsed
                .ip
                .parse()
                .map_err(|_| RequestError::InvalidMulticastAddress)?;

            Ok(Command::Start {
                id: parsed.id,
                index: parsed.index,
                ip,
                port: parsed.port,
                devices: parsed.devices,
            })
        }
        "DELETE" => {
            if !body.is_empty() {
                return Err(RequestError::NonEmptyDeleteBody);
            }
            Ok(Command::Stop)
        }
        other => Err(RequestError::UnsupportedMethod(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, body: &str) -> Vec<u8> {
        format!(
            "{method} /sssf/command HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[test]
    fn parses_valid_start_command() {
        let body = r#"{"ID":1,"Index":0,"IP":"239.255.1.1","Port":41660,"Devices":["a","b","c"]}"#;
        let command = parse_request(&request("POST", body)).unwrap();
        assert_eq!(
            command,
            Command::Start {
                id: 1,
                index: 0,
                ip: "239.255.1.1".parse().unwrap(),
                port: 41660,
                devices: serde_json::json!(["a", "b", "c"]),
            }
        );
    }

    #[test]
    fn parses_valid_stop_command() {
        let command = parse_request(&request("DELETE", "")).unwrap();
        assert_eq!(command, Command::Stop);
    }

    #[test]
    fn rejects_non_multicast_ip() {
        let body = r#"{"ID":1,"Index":0,"IP":"10.0.0.1","Port":41660,"Devices":[]}"#;
        let err = parse_request(&request("POST", body)).unwrap_err();
        assert_eq!(err, RequestError::InvalidMulticastAddress);
    }

    #[test]
    fn rejects_out_of_range_port() {
        let body = r#"{"ID":1,"Index":0,"IP":"239.255.1.1","Port":80,"Devices":[]}"#;
        let err = parse_request(&request("POST", body)).unwrap_err();
        assert_eq!(err, RequestError::InvalidPort(80));
    }

    #[test]
    fn rejects_non_empty_delete_body() {
        let err = parse_request(&request("DELETE", "{}")).unwrap_err();
        assert_eq!(err, RequestError::NonEmptyDeleteBody);
    }

    #[test]
    fn unsupported_method_is_distinguished_from_malformed() {
        let err = parse_request(&request("PUT", "")).unwrap_err();
        assert_eq!(err, RequestError::UnsupportedMethod("PUT".to_string()));
    }

    #[test]
    fn incomplete_headers_request_more_bytes() {
        let partial = b"POST /sssf/command HTTP/1.1\r\nContent-Length: 5";
        assert_eq!(parse_request(partial), Err(RequestError::Incomplete));
    }

    #[test]
    fn incomplete_body_requests_more_bytes() {
        let partial = b"POST /sssf/command HTTP/1.1\r\nContent-Length: 50\r\n\r\n{\"ID\":1}";
        assert_eq!(parse_request(partial), Err(RequestError::Incomplete));
    }
}
