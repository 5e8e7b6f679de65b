//! Loads `config.txt`, the forwarder's one immutable configuration record.
//!
//! Reading it off persistent storage is external to this crate, treated as
//! an opaque collaborator; what lives here is the schema and the
//! deserialization, following the same read-then-`serde_json::from_reader`
//! shape the Controller's own JSON control-plane messages use.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

/// The device's hardware role tag, echoed into registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRole {
    #[serde(rename = "SSS3")]
    Sss3,
    #[serde(rename = "CAN-to-Ethernet")]
    CanToEthernet,
}

/// Sentinel interpretation of a configured CAN channel bitrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelBitrate {
    /// Channel not present on this node.
    Absent,
    /// Probe for the bitrate via autobaud.
    Autobaud,
    /// Fixed bitrate in bits/sec.
    Fixed(u32),
}

#[must_use]
pub fn interpret_bitrate(raw: i32) -> ChannelBitrate {
    match raw {
        n if n < 0 => ChannelBitrate::Absent,
        0 => ChannelBitrate::Autobaud,
        n => ChannelBitrate::Fixed(n as u32),
    }
}

/// The forwarder's configuration record, read once at boot and never
/// mutated for the life of the process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(rename = "SSSFDevice")]
    pub device_role: DeviceRole,

    #[serde(rename = "serverAddress")]
    pub server_address: String,

    #[serde(rename = "serverPort")]
    pub server_port: u16,

    /// Loosely JSON-shaped ECU descriptors; echoed back to the Controller
    /// verbatim on registration, never parsed further by this node.
    #[serde(rename = "AttachedDevices", default)]
    pub attached_devices: Vec<serde_json::Value>,

    /// 0 requests autobaud, negative means the channel is absent.
    #[serde(rename = "can0Bitrate", default = "default_absent_bitrate")]
    pub can0_bitrate: i32,

    #[serde(rename = "can1Bitrate", default = "default_absent_bitrate")]
    pub can1_bitrate: i32,
}

fn default_absent_bitrate() -> i32 {
    -1
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).wrap_err_with(|| format!("failed to open {path:?}"))?;
        let config: Configuration = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("failed to parse {path:?} as forwarder configuration"))?;
        tracing::info!(?path, role = ?config.device_role, "loaded configuration");
        Ok(config)
    }

    #[must_use]
    pub fn can0(&self) -> ChannelBitrate {
        interpret_bitrate(self.can0_bitrate)
    }

    #[must_use]
    pub fn can1(&self) -> ChannelBitrate {
        interpret_bitrate(self.can1_bitrate)
    }
}

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_well_formed_config() {
        let file = forwarder_test::tempfile(
            r#"{
                "SSSFDevice": "SSS3",
                "serverAddress": "10.0.0.5",
                "serverPort": 8080,
                "AttachedDevices": [{"sn": "1a2b3c4d", "make": "Cummins"}],
                "can0Bitrate": 0,
                "can1Bitrate": -1
            }"#,
        )
        .unwrap();

        let config = Configuration::load(file.path()).unwrap();
        assert_eq!(config.device_role, DeviceRole::Sss3);
        assert_eq!(config.server_address, "10.0.0.5");
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.attached_devices.len(), 1);
        assert_eq!(config.can0(), ChannelBitrate::Autobaud);
        assert_eq!(config.can1(), ChannelBitrate::Absent);
    }

    #[test]
    fn missing_bitrates_default_to_absent() {
        let file = forwarder_test::tempfile(
            r#"{
                "SSSFDevice": "CAN-to-Ethernet",
                "serverAddress": "controller.example",
                "serverPort": 80,
                "AttachedDevices": []
            }"#,
        )
        .unwrap();

        let config = Configuration::load(file.path()).unwrap();
        assert_eq!(config.can0(), ChannelBitrate::Absent);
        assert_eq!(config.can1(), ChannelBitrate::Absent);
    }

    #[test]
    fn malformed_json_is_a_wrapped_error() {
        let file = forwarder_test::tempfile("not json").unwrap();
        let err = Configuration::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn fixed_bitrate_interprets_positive_values() {
        assert_eq!(interpret_bitrate(500_000), ChannelBitrate::Fixed(500_000));
        assert_eq!(interpret_bitrate(0), ChannelBitrate::Autobaud);
        assert_eq!(interpret_bitrate(-1), ChannelBitrate::Absent);
    }
}
