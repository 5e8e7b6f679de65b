//! PTP-style clock offset tracking: sync / follow-up / delay-request /
//! delay-response, carried in-band over the multicast group rather than a
//! dedicated time-sync port.
//!
//! [`TimeService`] owns one 8-entry [`PTPBuffer`] ring and the handful of
//! in-flight timestamps needed to correlate a delay-response back to the
//! delay-request it answers. Everything else about PTP proper (leap
//! seconds, BMCA) is out of scope; this is the Huff-and-Puff delay-asymmetry
//! heuristic adapted to a single Controller and many forwarders.

mod rtc;

pub use rtc::{Rtc, SoftwareRtc};

/// Compensates for pipeline latency between reading a CAN frame and it
/// actually leaving the wire.
pub const CAN_SEND_DELAY_US: u64 = 85;

/// Compensates for pipeline latency when emitting a delay-request.
pub const DELAY_REQ_DELAY_US: u64 = 65;

const RING_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PTPEntry {
    offset: i64,
    delay: i64,
    time: u64,
    used: bool,
}

/// The fixed 8-entry ring of delay-request/delay-response round results.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PTPBuffer {
    entries: [PTPEntry; RING_SIZE],
    write_index: usize,
    previous_clock_update: u64,
}

impl Default for PTPBuffer {
    fn default() -> Self {
        Self {
            entries: [PTPEntry::default(); RING_SIZE],
            write_index: 0,
            previous_clock_update: 0,
        }
    }
}

impl PTPBuffer {
    fn push(&mut self, offset: i64, delay: i64, time: u64) -> usize {
        let index = self.write_index;
        self.entries[index] = PTPEntry {
            offset,
            delay,
            time,
            used: false,
        };
        self.write_index = (self.write_index + 1) % RING_SIZE;
        index
    }

    /// Selects the peer-update entry: smallest delay among entries at least
    /// as recent as the last clock update, then applies Huff-and-Puff
    /// relative to the just-pushed entry and marks the winner `used`.
    fn peer_update(&mut self, just_pushed: usize) -> i64 {
        let pushed = self.entries[just_pushed];

        let mut winner = just_pushed;
        for (i, entry) in self.entries.iter().enumerate() {
            let smaller_delay = entry.delay < self.entries[winner].delay;
            let recent_enough = entry.time >= self.previous_clock_update;
            if smaller_delay && recent_enough {
                winner = i;
            }
        }

        let chosen = self.entries[winner];
        let mut peer_update = if chosen.used { 0 } else { chosen.offset };

        if peer_update != 0 {
            if pushed.offset > chosen.offset {
                peer_update -= (pushed.delay - chosen.delay) / 2;
            } else if pushed.offset < chosen.offset {
                peer_update += (pushed.delay - chosen.delay) / 2;
            }
        }

        self.entries[winner].used = true;
        self.previous_clock_update = chosen.time;
        peer_update
    }
}

/// What a follow-up tells the caller to do next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FollowUpAction {
    /// Not this node's turn; no network action required.
    None,
    /// First-ever sync: the RTC has already been hard-set.
    RtcHardSet,
    /// This node should emit a delay-request now, with this header timestamp.
    SendDelayRequest { transmit: u64 },
}

/// Per-session PTP-style clock state for one forwarder.
#[derive(Debug)]
pub struct TimeService<R: Rtc> {
    rtc: R,
    index: u8,
    num_peers: u32,
    sync_count: u32,
    originate: u64,
    receive: u64,
    transmit: u64,
    between_rounds_offset: i64,
    buffer: PTPBuffer,
}

impl<R: Rtc> TimeService<R> {
    /// `index` is this node's zero-based group index; `members` is the
    /// session's total member count `N` (including self).
    #[must_use]
    pub fn new(rtc: R, index: u8, members: u32) -> Self {
        Self {
            rtc,
            index,
            num_peers: members.saturating_sub(1).max(1),
            sync_count: 0,
            originate: 0,
            receive: 0,
            transmit: 0,
            between_rounds_offset: 0,
            buffer: PTPBuffer::default(),
        }
    }

    #[must_use]
    pub fn now_us(&self) -> u64 {
        self.rtc.now_us()
    }

    #[must_use]
    pub fn can_emission_timestamp(&self) -> u64 {
        self.now_us() + CAN_SEND_DELAY_US
    }

    #[must_use]
    pub fn between_rounds_offset(&self) -> i64 {
        self.between_rounds_offset
    }

    /// Record a kind-5 sync: `send_time` is the Controller's inline
    /// timestamp, `received_now` is this node's own clock at receipt.
    pub fn on_sync(&mut self, send_time: u64, received_now: u64) {
        self.sync_count += 1;
        self.originate = send_time;
        self.receive = received_now;
    }

    /// Record a kind-6 follow-up. `identifies` must match the sync this
    /// follow-up corresponds to; `actual_send_time` is the sync's true
    /// emission time.
    pub fn on_follow_up(&mut self, identifies: u64, actual_send_time: u64) -> FollowUpAction {
        if identifies != self.originate {
            tracing::debug!("follow-up doesn't match the last recorded sync, dropping");
            return FollowUpAction::None;
        }

        let sync_offset = (u64::from(self.index) + u64::from(self.sync_count)) % u64::from(self.num_peers);
        let is_our_turn = self.sync_count <= 5 || sync_offset == 0;

        if !is_our_turn {
            self.between_rounds_offset = self.calculate_offset(actual_send_time);
            return FollowUpAction::None;
        }

        if self.sync_count == 1 {
            self.rtc.set_us(actual_send_time);
            return FollowUpAction::RtcHardSet;
        }

        self.originate = actual_send_time;
        let transmit = self.now_us() + DELAY_REQ_DELAY_US;
        FollowUpAction::SendDelayRequest { transmit }
    }

    /// Record the timestamp a delay-request was actually sent at. Must be
    /// called after [`Self::on_follow_up`] returns
    /// [`FollowUpAction::SendDelayRequest`] and before the matching
    /// delay-response arrives.
    pub fn on_delay_request_sent(&mut self, transmit: u64) {
        self.transmit = transmit;
    }

    /// Record a kind-8 delay-response. `original_send_time` is the
    /// correlation key (the delay-request's header timestamp); `received_t4`
    /// is this node's own clock at receipt. Returns the RTC adjustment
    /// applied, or `None` if the response doesn't correlate to an
    /// in-flight delay-request.
    pub fn on_delay_response(&mut self, original_send_time: u64, received_t4: u64) -> Option<i64> {
        if original_send_time != self.transmit {
            tracing::debug!("delay-response doesn't correlate to our delay-request, dropping");
            return None;
        }

        let t1 = self.originate as i64;
        let t2 = self.receive as i64;
        let t3 = self.transmit as i64;
        let t4 = received_t4 as i64;

        let offset = -((t2 - t1) + (t3 - t4)) / 2;
        let delay = (t4 - t1) - (t3 - t2);

        let pushed = self.buffer.push(offset, delay, received_t4);
        let adjustment = self.buffer.peer_update(pushed);
        self.rtc.adjust_us(adjustment);
        Some(adjustment)
    }

    fn calculate_offset(&self, send_time: u64) -> i64 {
        // Reference-only estimate when it isn't our turn to sync: shift the
        // inbound timestamp by half the smallest known round-trip delay.
        let smallest_delay = self
            .buffer
            .entries
            .iter()
            .map(|e| e.delay)
            .min()
            .unwrap_or(0);
        send_time as i64 + smallest_delay / 2 - self.now_us() as i64
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
