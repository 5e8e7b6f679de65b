use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use forwarder_config::Configuration;
use forwarder_runner::{LoggingGpio, Runner, StubCanChannel, SystemMacSource};
use forwarder_utils::RotatingLogWriter;

/// One cooperative loop iteration every 10ms; fast enough that a 65us-scale
/// delay-request timestamp is still meaningful, slow enough not to spin.
const TICK_PERIOD: Duration = Duration::from_millis(10);

const DEFAULT_LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Parser)]
#[clap(version)]
struct Args {
    /// Path to the forwarder's JSON configuration record.
    #[clap(long, default_value = "config.txt")]
    config: PathBuf,

    #[clap(short, long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,

    /// Where the serial-mirrored log file is written and rotated.
    #[clap(long, default_value = "forwarder.log")]
    log_file: PathBuf,
}

fn main() -> eyre::Result<()> {
    let use_color = std::io::stderr().is_terminal();
    if use_color {
        color_eyre::install()?;
    }

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(args.log_level.into())
        .with_env_var("FORWARDER_LOG")
        .from_env_lossy();
    let writer = Mutex::new(RotatingLogWriter::new(args.log_file.clone(), DEFAULT_LOG_MAX_BYTES)?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();

    let config = Configuration::load(&args.config)?;
    let mac_source = SystemMacSource;
    let can0 = (config.can0() != forwarder_config::ChannelBitrate::Absent)
        .then(|| Box::new(StubCanChannel::default()) as Box<dyn forwarder_can::CanChannel>);
    let can1 = (config.can1() != forwarder_config::ChannelBitrate::Absent)
        .then(|| Box::new(StubCanChannel::default()) as Box<dyn forwarder_can::CanChannel>);
    let gpio = LoggingGpio;

    let mut runner = Runner::new(config, &mac_source, can0, can1, gpio)?;

    tracing::info!("forwarder starting its cooperative event loop");
    loop {
        let now = Instant::now();
        if let Err(e) = runner.tick(now) {
            tracing::error!(error = %e, "fatal error, exiting");
            std::process::exit(1);
        }

        let elapsed = now.elapsed();
        if elapsed < TICK_PERIOD {
            thread::sleep(TICK_PERIOD - elapsed);
        }
    }
}
