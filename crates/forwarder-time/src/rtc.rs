use std::time::Instant;

/// The forwarder's view of its hardware real-time clock.
///
/// The physical RTC register poking is external to this crate, treated as
/// an opaque collaborator; what lives here is the offset-tracking contract
/// the time service needs: read the current microsecond epoch, hard-set it
/// once, and nudge it by a signed adjustment.
pub trait Rtc {
    /// Microseconds since the Unix epoch, as the RTC currently reports it.
    fn now_us(&self) -> u64;

    /// Hard-set the RTC to `us` microseconds since the Unix epoch.
    fn set_us(&mut self, us: u64);

    /// Nudge the RTC by a signed microsecond delta (may be negative).
    fn adjust_us(&mut self, delta: i64);
}

/// A free-running software clock used where no hardware RTC is wired up.
///
/// Tracks an epoch microsecond value anchored to [`Instant::now`] at
/// construction/set time, so `adjust_us` and `set_us` are O(1) and never
/// touch the system clock.
#[derive(Debug)]
pub struct SoftwareRtc {
    anchor: Instant,
    anchor_us: u64,
}

impl SoftwareRtc {
    #[must_use]
    pub fn new(initial_us: u64) -> Self {
        Self {
            anchor: Instant::now(),
            anchor_us: initial_us,
        }
    }
}

impl Default for SoftwareRtc {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Rtc for SoftwareRtc {
    fn now_us(&self) -> u64 {
        self.anchor_us + self.anchor.elapsed().as_micros() as u64
    }

    fn set_us(&mut self, us: u64) {
        self.anchor = Instant::now();
        self.anchor_us = us;
    }

    fn adjust_us(&mut self, delta: i64) {
        let now = self.now_us();
        let adjusted = (now as i64 + delta).max(0) as u64;
        self.set_us(adjusted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_read_back_is_stable() {
        let mut rtc = SoftwareRtc::default();
        rtc.set_us(1_700_000_000_000_000);
        assert!(rtc.now_us() >= 1_700_000_000_000_000);
    }

    #[test]
    fn adjust_moves_relative_to_current_value() {
        let mut rtc = SoftwareRtc::new(1_000_000);
        rtc.adjust_us(500);
        assert!(rtc.now_us() >= 1_000_500);
    }

    #[test]
    fn adjust_never_goes_negative() {
        let mut rtc = SoftwareRtc::new(100);
        rtc.adjust_us(-1_000_000);
        assert_eq!(rtc.now_us(), 0);
    }
}
