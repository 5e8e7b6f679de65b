use std::time::{Duration, Instant};

use crate::channel::CanChannel;

/// Candidate bitrates cycled through when a channel is configured with
/// bitrate 0.
pub const CANDIDATE_BAUD_RATES: [u32; 5] = [250_000, 500_000, 125_000, 666_666, 1_000_000];

const LISTEN_WINDOW: Duration = Duration::from_millis(300);

/// Outcome of one [`Autobaud::tick`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutobaudOutcome {
    /// Still listening on the current candidate.
    Listening,
    /// A frame was received cleanly; this is the bus's bitrate.
    Accepted(u32),
    /// Every candidate was tried and none worked.
    Exhausted,
}

/// Cycles a [`CanChannel`] through [`CANDIDATE_BAUD_RATES`] until one
/// receives a frame without tripping the receive-error-counter.
#[derive(Debug)]
pub struct Autobaud {
    candidate_index: usize,
    deadline: Option<Instant>,
}

impl Default for Autobaud {
    fn default() -> Self {
        Self {
            candidate_index: 0,
            deadline: None,
        }
    }
}

impl Autobaud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn arm_candidate(&mut self, channel: &mut dyn CanChannel, now: Instant) -> eyre::Result<()> {
        let candidate = CANDIDATE_BAUD_RATES[self.candidate_index];
        tracing::info!(candidate, "autobaud: probing candidate bitrate");
        channel.set_bitrate(candidate)?;
        channel.clear_error_counters();
        self.deadline = Some(now + LISTEN_WINDOW);
        Ok(())
    }

    /// Advance the autobaud state machine by one tick.
    ///
    /// The caller must keep calling this every loop iteration until it
    /// returns [`AutobaudOutcome::Accepted`] or
    /// [`AutobaudOutcome::Exhausted`].
    pub fn tick(
        &mut self,
        channel: &mut dyn CanChannel,
        now: Instant,
    ) -> eyre::Result<AutobaudOutcome> {
        if self.deadline.is_none() {
            self.arm_candidate(channel, now)?;
        }

        if let Some(frame) = channel.read()? {
            let candidate = CANDIDATE_BAUD_RATES[self.candidate_index];
            tracing::info!(candidate, ?frame, "autobaud: accepted bitrate");
            return Ok(AutobaudOutcome::Accepted(candidate));
        }

        if channel.rx_error_count() > 0 {
            tracing::debug!(
                candidate = CANDIDATE_BAUD_RATES[self.candidate_index],
                "autobaud: candidate rejected by rising error counter"
            );
            return self.advance(channel, now);
        }

        if now >= self.deadline.expect("armed above") {
            tracing::debug!(
                candidate = CANDIDATE_BAUD_RATES[self.candidate_index],
                "autobaud: candidate timed out with no traffic"
            );
            return self.advance(channel, now);
        }

        Ok(AutobaudOutcome::Listening)
    }

    fn advance(
        &mut self,
        channel: &mut dyn CanChannel,
        now: Instant,
    ) -> eyre::Result<AutobaudOutcome> {
        self.candidate_index += 1;
        if self.candidate_index >= CANDIDATE_BAUD_RATES.len() {
            tracing::error!("autobaud: exhausted every candidate bitrate");
            return Ok(AutobaudOutcome::Exhausted);
        }
        self.arm_candidate(channel, now)?;
        Ok(AutobaudOutcome::Listening)
    }
}
