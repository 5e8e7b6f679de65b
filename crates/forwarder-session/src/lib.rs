//! The Inactive/Active session state machine.
//!
//! [`SessionController`] owns at most one [`SessionContext`] at a time. It
//! never touches a socket or a CAN channel directly — those are the
//! runner's resources, borrowed in for the duration of one call. This crate
//! only decides *whether* a transition happens and builds the fresh
//! per-session state when it does.

use std::net::SocketAddrV4;

use forwarder_http::Command;
use forwarder_stats::StatisticsTable;
use forwarder_time::{Rtc, TimeService};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}

/// The two-state session lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Inactive,
    Active,
}

/// Per-session state, created on Active entry and destroyed on Inactive
/// entry. Owns the statistics table and the time service; does not own the
/// multicast socket or CAN channels (the runner does).
pub struct SessionContext<R: Rtc> {
    pub self_id: u32,
    pub self_index: u8,
    pub group: SocketAddrV4,
    pub member_count: usize,
    pub frame_number: u32,
    /// Starts at 1; incremented after every non-report emission.
    pub next_sequence: u32,
    pub stats: StatisticsTable,
    pub time: TimeService<R>,
}

impl<R: Rtc> SessionContext<R> {
    fn new(self_id: u32, self_index: u8, group: SocketAddrV4, member_count: usize, rtc: R) -> Self {
        Self {
            self_id,
            self_index,
            group,
            member_count,
            frame_number: 0,
            next_sequence: 1,
            stats: StatisticsTable::new(member_count),
            time: TimeService::new(rtc, self_index, member_count as u32),
        }
    }

    /// The sequence number to stamp on the next non-report emission, which
    /// also advances the counter. Reports never call this.
    pub fn take_sequence(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }
}

/// Result of feeding one parsed [`Command`] to [`SessionController`].
#[derive(Debug)]
pub enum Outcome<R: Rtc> {
    /// Inactive -> Active: a fresh context was created, ignition should be
    /// asserted, and the multicast socket should be joined by the caller.
    Started(SessionContext<R>),
    /// Active -> Inactive: ignition should be deasserted and the multicast
    /// socket closed by the caller.
    Stopped,
    /// POST while Active: a Controller bug, logged and ignored.
    IgnoredAlreadyActive,
    /// DELETE while Inactive: logged and ignored.
    IgnoredAlreadyInactive,
    /// POST with a member count of zero or one: a session needs N >= 2.
    Rejected,
}

/// Drives the Inactive/Active state machine's transition table. Holds no
/// resources itself; the runner owns the `Option<SessionContext>` this
/// produces.
#[derive(Default)]
pub struct SessionController {
    state: SessionState,
}

impl SessionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feed one parsed control-plane [`Command`] through the state machine.
    /// `rtc` is only consumed when a new session actually starts.
    pub fn dispatch<R: Rtc>(&mut self, command: Command, rtc: R) -> Outcome<R> {
        match command {
            Command::Start {
                id,
                index,
                ip,
                port,
                devices,
            } => self.on_start(id, index, ip, port, &devices, rtc),
            Command::Stop => self.on_stop(),
        }
    }

    fn on_start<R: Rtc>(
        &mut self,
        id: u32,
        index: u8,
        ip: std::net::Ipv4Addr,
        port: u16,
        devices: &serde_json::Value,
        rtc: R,
    ) -> Outcome<R> {
        if self.state == SessionState::Active {
            tracing::warn!("POST received while already Active, ignoring (Controller bug)");
            return Outcome::IgnoredAlreadyActive;
        }

        let member_count = devices.as_array().map_or(1, Vec::len).max(1);
        if member_count < 2 {
            tracing::error!(member_count, "rejecting session start: need at least 2 members");
            return Outcome::Rejected;
        }

        let group = SocketAddrV4::new(ip, port);
        let context = SessionContext::new(id, index, group, member_count, rtc);
        self.state = SessionState::Active;
        tracing::info!(id, index, %group, member_count, "session started");
        Outcome::Started(context)
    }

    fn on_stop<R: Rtc>(&mut self) -> Outcome<R> {
        if self.state == SessionState::Inactive {
            tracing::warn!("DELETE received while already Inactive, ignoring");
            return Outcome::IgnoredAlreadyInactive;
        }
        self.state = SessionState::Inactive;
        tracing::info!("session stopped");
        Outcome::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forwarder_time::SoftwareRtc;
    use std::net::Ipv4Addr;

    fn start_command(member_count: usize) -> Command {
        Command::Start {
            id: 1,
            index: 0,
            ip: Ipv4Addr::new(239, 255, 1, 1),
            port: 41660,
            devices: serde_json::Value::Array(vec![serde_json::Value::Null; member_count]),
        }
    }

    #[test]
    fn start_from_inactive_creates_context_sized_to_members() {
        let mut controller = SessionController::new();
        match controller.dispatch(start_command(3), SoftwareRtc::new(0)) {
            Outcome::Started(ctx) => {
                assert_eq!(ctx.member_count, 3);
                assert_eq!(ctx.stats.len(), 3);
                assert_eq!(ctx.next_sequence, 1);
                assert_eq!(ctx.frame_number, 0);
            }
            other => panic!("expected Started, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Active);
    }

    #[test]
    fn stop_while_inactive_is_ignored() {
        let mut controller = SessionController::new();
        match controller.dispatch(Command::Stop, SoftwareRtc::new(0)) {
            Outcome::IgnoredAlreadyInactive => {}
            other => panic!("expected IgnoredAlreadyInactive, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Inactive);
    }

    #[test]
    fn start_while_active_is_ignored_and_state_unchanged() {
        let mut controller = SessionController::new();
        controller.dispatch(start_command(3), SoftwareRtc::new(0));

        match controller.dispatch(start_command(5), SoftwareRtc::new(0)) {
            Outcome::IgnoredAlreadyActive => {}
            other => panic!("expected IgnoredAlreadyActive, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Active);
    }

    #[test]
    fn stop_from_active_tears_down_to_inactive() {
        let mut controller = SessionController::new();
        controller.dispatch(start_command(3), SoftwareRtc::new(0));

        match controller.dispatch(Command::Stop, SoftwareRtc::new(0)) {
            Outcome::Stopped => {}
            other => panic!("expected Stopped, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Inactive);
    }

    #[test]
    fn start_rejected_below_two_members() {
        let mut controller = SessionController::new();
        match controller.dispatch(start_command(1), SoftwareRtc::new(0)) {
            Outcome::Rejected => {}
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Inactive);
    }

    #[test]
    fn take_sequence_starts_at_one_and_increments() {
        let mut controller = SessionController::new();
        let Outcome::Started(mut ctx) = controller.dispatch(start_command(3), SoftwareRtc::new(0)) else {
            panic!("expected Started");
        };
        assert_eq!(ctx.take_sequence(), 1);
        assert_eq!(ctx.take_sequence(), 2);
        assert_eq!(ctx.take_sequence(), 3);
    }
}
