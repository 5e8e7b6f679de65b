use std::time::Instant;

use forwarder_config::{Configuration, DeviceRole};
use forwarder_runner::{LoggingGpio, MacSource, Runner, StubCanChannel};
use forwarder_session::SessionState;

struct FixedMac;

impl MacSource for FixedMac {
    fn read(&self) -> eyre::Result<[u8; 6]> {
        Ok([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01])
    }
}

fn unreachable_controller_config() -> Configuration {
    Configuration {
        device_role: DeviceRole::Sss3,
        // Port 0 on the loopback address never accepts a connection, so
        // `connect()` fails fast instead of hanging a test on a real socket.
        server_address: "127.0.0.1".to_string(),
        server_port: 0,
        attached_devices: vec![serde_json::json!({"sn": "1a2b3c4d"})],
        can0_bitrate: -1,
        can1_bitrate: -1,
    }
}

#[test]
fn runner_stays_inactive_while_the_controller_is_unreachable() {
    let config = unreachable_controller_config();
    let can0 = Some(Box::new(StubCanChannel::default()) as Box<dyn forwarder_can::CanChannel>);
    let mut runner = Runner::new(config, &FixedMac, can0, None, LoggingGpio).unwrap();

    for _ in 0..3 {
        runner.tick(Instant::now()).unwrap();
    }

    assert_eq!(runner.state(), SessionState::Inactive);
}

#[test]
fn channels_absent_in_configuration_never_get_a_slot() {
    let mut config = unreachable_controller_config();
    config.can0_bitrate = -1;
    config.can1_bitrate = -1;
    let mut runner = Runner::new(config, &FixedMac, None, None, LoggingGpio).unwrap();

    runner.tick(Instant::now()).unwrap();
    assert_eq!(runner.state(), SessionState::Inactive);
}
