//! The single-threaded cooperative event loop tying every component together.
//!
//! One [`Runner::tick`] call is one loop iteration: poll HTTP, then (if
//! Active) one CAN read per configured channel, then one multicast recv.
//! Nothing here blocks for more than the underlying non-blocking socket
//! calls take to return.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Instant;

use forwarder_can::{Autobaud, AutobaudOutcome, CanChannel, CanFrame, from_can_payload, to_can_payload};
use forwarder_config::{ChannelBitrate, Configuration};
use forwarder_http::{Command, ConnectionStatus, HttpClient};
use forwarder_session::{Outcome, SessionContext, SessionController, SessionState};
use forwarder_time::{FollowUpAction, SoftwareRtc};
use forwarder_wire::{CommBlock, Header, Kind, Payload, ReportPayload, encoded_len, pack, unpack};

use crate::ignition::{Ignition, MacSource, StatusIndicators};

/// Maximum CommBlock an inbound datagram can be; generous upper bound over
/// the report payload's `N`-dependent size, large enough not to truncate a
/// legitimately larger FD frame or a big group's report.
const RECV_BUF_LEN: usize = 2048;

/// Startup state of one local CAN channel, independent of session state:
/// a channel that's already `Ready` stays ready across session stop/start.
enum ChannelStartup {
    Absent,
    NotStarted,
    Probing(Autobaud),
    Ready,
}

struct ChannelSlot {
    channel: Option<Box<dyn CanChannel>>,
    configured: ChannelBitrate,
    startup: ChannelStartup,
}

impl ChannelSlot {
    fn new(channel: Option<Box<dyn CanChannel>>, configured: ChannelBitrate) -> Self {
        let startup = match configured {
            ChannelBitrate::Absent => ChannelStartup::Absent,
            _ if channel.is_none() => ChannelStartup::Absent,
            _ => ChannelStartup::NotStarted,
        };
        Self {
            channel,
            configured,
            startup,
        }
    }

    fn is_ready(&self) -> bool {
        matches!(self.startup, ChannelStartup::Ready)
    }

    /// Drive this channel towards `Ready`. Returns `Err` only on autobaud
    /// exhaustion, a fatal condition.
    fn ensure_started(&mut self, now: Instant) -> eyre::Result<()> {
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        match &mut self.startup {
            ChannelStartup::Absent | ChannelStartup::Ready => {}
            ChannelStartup::NotStarted => match self.configured {
                ChannelBitrate::Fixed(rate) => {
                    channel.set_bitrate(rate)?;
                    tracing::info!(rate, "CAN channel committed to fixed bitrate");
                    self.startup = ChannelStartup::Ready;
                }
                ChannelBitrate::Autobaud => {
                    self.startup = ChannelStartup::Probing(Autobaud::new());
                }
                ChannelBitrate::Absent => unreachable!("filtered out at construction"),
            },
            ChannelStartup::Probing(autobaud) => match autobaud.tick(&mut **channel, now)? {
                AutobaudOutcome::Listening => {}
                AutobaudOutcome::Accepted(rate) => {
                    tracing::info!(rate, "autobaud accepted a bitrate");
                    self.startup = ChannelStartup::Ready;
                }
                AutobaudOutcome::Exhausted => {
                    eyre::bail!("autobaud exhausted every candidate bitrate");
                }
            },
        }
        Ok(())
    }
}

/// Ties every component together: the HTTP control-plane client, the
/// session state machine, the two local CAN channels, and the GPIO
/// boundary. Owns the multicast socket for the duration of one Active
/// session; it is created on `Started` and dropped on `Stopped`.
pub struct Runner<G: Ignition + StatusIndicators> {
    config: Configuration,
    mac: [u8; 6],
    http: HttpClient,
    controller: SessionController,
    session: Option<SessionContext<SoftwareRtc>>,
    socket: Option<UdpSocket>,
    can0: ChannelSlot,
    can1: ChannelSlot,
    gpio: G,
}

impl<G: Ignition + StatusIndicators> Runner<G> {
    pub fn new(
        config: Configuration,
        mac_source: &impl MacSource,
        can0: Option<Box<dyn CanChannel>>,
        can1: Option<Box<dyn CanChannel>>,
        gpio: G,
    ) -> eyre::Result<Self> {
        let mac = mac_source.read()?;
        let http = HttpClient::new(config.server_address.clone(), config.server_port);
        let can0_bitrate = config.can0();
        let can1_bitrate = config.can1();
        Ok(Self {
            config,
            mac,
            http,
            controller: SessionController::new(),
            session: None,
            socket: None,
            can0: ChannelSlot::new(can0, can0_bitrate),
            can1: ChannelSlot::new(can1, can1_bitrate),
            gpio,
        })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    #[must_use]
    pub fn http_status(&self) -> ConnectionStatus {
        self.http.status()
    }

    fn mac_string(&self) -> String {
        forwarder_utils::format_mac(self.mac)
    }

    /// One loop iteration: poll HTTP, then (if Active) CAN egress, then one
    /// multicast recv. Returns `Err` only for a fatal condition (autobaud
    /// exhaustion, OOM-equivalent session-start failure).
    pub fn tick(&mut self, now: Instant) -> eyre::Result<()> {
        self.poll_http(now)?;

        if self.controller.state() == SessionState::Active {
            self.can0.ensure_started(now)?;
            self.can1.ensure_started(now)?;
            self.poll_can_egress()?;
            self.poll_multicast_ingress()?;
        }

        Ok(())
    }

    fn poll_http(&mut self, now: Instant) -> eyre::Result<()> {
        if self.http.status() != ConnectionStatus::Connected {
            let devices = serde_json::Value::Array(self.config.attached_devices.clone());
            self.http.connect(now, &self.mac_string(), &devices)?;
        }

        let Some(command) = self.http.read()? else {
            return Ok(());
        };

        self.apply_command(command)
    }

    fn apply_command(&mut self, command: Command) -> eyre::Result<()> {
        let rtc = SoftwareRtc::new(0);
        match self.controller.dispatch(command, rtc) {
            Outcome::Started(ctx) => self.enter_active(ctx)?,
            Outcome::Stopped => self.enter_inactive(),
            Outcome::IgnoredAlreadyActive | Outcome::IgnoredAlreadyInactive => {}
            Outcome::Rejected => {
                self.http.respond(500, "INTERNAL SERVER ERROR")?;
            }
        }
        Ok(())
    }

    fn enter_active(&mut self, ctx: SessionContext<SoftwareRtc>) -> eyre::Result<()> {
        let group = ctx.group;
        let socket = bind_multicast(group)?;
        self.socket = Some(socket);
        self.session = Some(ctx);
        self.gpio.assert();
        self.gpio.set_active(true);
        self.http.respond(200, "OK")?;
        Ok(())
    }

    fn enter_inactive(&mut self) {
        self.socket = None;
        self.session = None;
        self.gpio.deassert();
        self.gpio.set_active(false);
    }

    fn poll_can_egress(&mut self) -> eyre::Result<()> {
        // Read first, holding only the channel slots' borrows; emitting
        // needs `&mut self` as a whole (session + socket), so it happens
        // only after those borrows end.
        let mut pending = Vec::with_capacity(2);
        for slot in [&mut self.can0, &mut self.can1] {
            if !slot.is_ready() {
                continue;
            }
            if let Some(channel) = slot.channel.as_mut() {
                if let Some(frame) = channel.read()? {
                    pending.push(frame);
                }
            }
        }

        for frame in &pending {
            self.emit_can_frame(frame)?;
        }
        Ok(())
    }

    fn emit_can_frame(&mut self, frame: &CanFrame) -> eyre::Result<()> {
        let Some(ctx) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(socket) = self.socket.as_ref() else {
            return Ok(());
        };

        let sequence_number = ctx.take_sequence();
        let payload = to_can_payload(frame, sequence_number, false);
        let msg = CommBlock {
            header: Header {
                index: ctx.self_index,
                kind: Kind::Can,
                frame_number: ctx.frame_number,
                timestamp: ctx.time.can_emission_timestamp(),
            },
            payload: Payload::Can(payload),
        };
        send(socket, ctx.group, &msg)
    }

    fn poll_multicast_ingress(&mut self) -> eyre::Result<()> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(());
        };

        let mut buf = [0u8; RECV_BUF_LEN];
        let (len, _from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e).map_err(eyre::Report::from),
        };

        let member_count = self.session.as_ref().map_or(0, |ctx| ctx.member_count);
        let Some(msg) = unpack(&buf[..len], member_count) else {
            return Ok(());
        };

        self.gpio.pulse_rx();
        self.dispatch_inbound(msg, len as u32)
    }

    fn dispatch_inbound(&mut self, msg: CommBlock, wire_len: u32) -> eyre::Result<()> {
        let Some(ctx) = self.session.as_mut() else {
            return Ok(());
        };
        let now_us = ctx.time.now_us() as i64;
        let index = msg.header.index as usize;

        match msg.payload {
            Payload::Can(payload) => {
                ctx.stats
                    .observe(index, now_us, msg.header.timestamp as i64, payload.sequence_number as i64, wire_len);
                let frame = from_can_payload(&payload);
                if let Some(channel) = self.can0.channel.as_mut() {
                    channel.write(&frame)?;
                }
                if let Some(channel) = self.can1.channel.as_mut() {
                    channel.write(&frame)?;
                }
            }
            Payload::Sensor(_) => {
                ctx.stats.observe(
                    index,
                    now_us,
                    msg.header.timestamp as i64,
                    msg.header.frame_number as i64,
                    wire_len,
                );
                ctx.frame_number = msg.header.frame_number;
            }
            Payload::ReportRequest => self.emit_report()?,
            Payload::Report(_) => {
                tracing::debug!("ignoring inbound kind-4 report (Controller-addressed, not ours to apply)");
            }
            Payload::Sync => {
                ctx.time.on_sync(msg.header.timestamp, now_us as u64);
            }
            Payload::FollowUp { original_send_time } => {
                let action = ctx.time.on_follow_up(msg.header.timestamp, original_send_time);
                if let FollowUpAction::SendDelayRequest { transmit } = action {
                    ctx.time.on_delay_request_sent(transmit);
                    let group = ctx.group;
                    let request = CommBlock {
                        header: Header {
                            index: ctx.self_index,
                            kind: Kind::DelayRequest,
                            frame_number: ctx.frame_number,
                            timestamp: transmit,
                        },
                        payload: Payload::DelayRequest,
                    };
                    if let Some(socket) = self.socket.as_ref() {
                        send(socket, group, &request)?;
                    }
                }
            }
            Payload::DelayRequest => {
                tracing::debug!("ignoring inbound delay-request (Controller answers these, not peers)");
            }
            Payload::DelayResponse { original_send_time } => {
                ctx.time.on_delay_response(original_send_time, now_us as u64);
            }
        }
        Ok(())
    }

    fn emit_report(&mut self) -> eyre::Result<()> {
        let Some(ctx) = self.session.as_ref() else {
            return Ok(());
        };
        let Some(socket) = self.socket.as_ref() else {
            return Ok(());
        };

        let reports = ctx.stats.to_reports();
        let msg = CommBlock {
            header: Header {
                index: ctx.self_index,
                kind: Kind::Report,
                frame_number: ctx.frame_number,
                timestamp: ctx.time.now_us(),
            },
            payload: Payload::Report(ReportPayload { reports }),
        };
        send(socket, ctx.group, &msg)?;

        if let Some(ctx) = self.session.as_mut() {
            ctx.stats.reset();
        }
        Ok(())
    }
}

fn bind_multicast(group: SocketAddrV4) -> eyre::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()))?;
    socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn send(socket: &UdpSocket, group: SocketAddrV4, msg: &CommBlock) -> eyre::Result<()> {
    let mut buf = vec![0u8; encoded_len(msg)];
    let written = pack(msg, &mut buf);
    socket.send_to(&buf[..written], group)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_slot_absent_never_starts() {
        let mut slot = ChannelSlot::new(None, ChannelBitrate::Fixed(500_000));
        slot.ensure_started(Instant::now()).unwrap();
        assert!(!slot.is_ready());
    }
}
