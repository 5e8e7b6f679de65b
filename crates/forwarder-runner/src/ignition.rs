//! The external collaborators this node explicitly puts out of scope: GPIO
//! (ignition + two status indicators) and the hardware MAC address. This
//! module only defines the boundary traits and a logging stand-in for each;
//! the real bindings are board-specific and live outside this workspace.

/// A boolean "ignition" control asserted for the duration of an Active
/// session.
pub trait Ignition {
    fn assert(&mut self);
    fn deassert(&mut self);
}

/// The two status indicators: a steady session-active light and an
/// RX-activity pulse driven once per dispatched inbound datagram.
pub trait StatusIndicators {
    fn set_active(&mut self, active: bool);
    fn pulse_rx(&mut self);
}

/// Reads the hardware MAC address once at boot.
pub trait MacSource {
    fn read(&self) -> eyre::Result<[u8; 6]>;
}

/// Logs every call instead of toggling real hardware. Used by the binary
/// until a board-specific GPIO/MAC binding is wired in.
#[derive(Debug, Default)]
pub struct LoggingGpio;

impl Ignition for LoggingGpio {
    fn assert(&mut self) {
        tracing::info!("ignition: ON");
    }

    fn deassert(&mut self) {
        tracing::info!("ignition: OFF");
    }
}

impl StatusIndicators for LoggingGpio {
    fn set_active(&mut self, active: bool) {
        tracing::debug!(active, "status indicator: session-active");
    }

    fn pulse_rx(&mut self) {
        tracing::trace!("status indicator: rx pulse");
    }
}

/// Best-effort MAC lookup from the first non-loopback Linux network
/// interface; falls back to the all-zero address with a warning when no
/// interface is readable (e.g. in a container with no real NIC).
#[derive(Debug, Default)]
pub struct SystemMacSource;

impl MacSource for SystemMacSource {
    fn read(&self) -> eyre::Result<[u8; 6]> {
        let net_dir = std::path::Path::new("/sys/class/net");
        if let Ok(entries) = std::fs::read_dir(net_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name == "lo" {
                    continue;
                }
                let addr_path = entry.path().join("address");
                if let Ok(text) = std::fs::read_to_string(&addr_path) {
                    if let Some(mac) = parse_mac(text.trim()) {
                        return Ok(mac);
                    }
                }
            }
        }
        tracing::warn!("no hardware MAC address found, falling back to 00:00:00:00:00:00");
        Ok([0; 6])
    }
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_colon_separated_mac() {
        assert_eq!(
            parse_mac("de:ad:be:ef:fe:ed"),
            Some([0xde, 0xad, 0xbe, 0xef, 0xfe, 0xed])
        );
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(parse_mac("de:ad:be"), None);
        assert_eq!(parse_mac("de:ad:be:ef:fe:ed:00"), None);
    }
}
