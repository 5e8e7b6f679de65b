//! Per-peer network health statistics, updated online from inbound datagrams.
//!
//! Every peer gets one [`HealthBasics`] (persists across reports) and one
//! [`NodeReport`] (zeroed on every reporting window). Latency and jitter are
//! tracked with Welford's single-pass mean/variance algorithm so nothing
//! needs to retain a history of samples.

use forwarder_wire::{HealthCore, NodeReport};

#[cfg(test)]
#[ctor::ctor]
fn setup_test_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .with_ansi(true)
        .init();
}

/// Feeds one new sample into a Welford running aggregate.
///
/// `count`, `mean`, and `sum_of_squared_differences` are updated in place;
/// `variance` is derived from the running sum on every call rather than
/// tracked separately.
pub fn update_health_core(core: &mut HealthCore, sample: f32) {
    core.count += 1;
    let delta = sample - core.mean;
    core.mean += delta / core.count as f32;
    let delta2 = sample - core.mean;
    core.sum_of_squared_differences += delta * delta2;
    core.variance = core.sum_of_squared_differences / core.count as f32;
    core.min = core.min.min(sample);
    core.max = core.max.max(sample);
}

/// Per-peer state that must survive a report reset: the baselines used to
/// detect gaps and duplicates on the next inbound datagram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HealthBasics {
    pub last_message_time: i64,
    pub last_sequence_number: i64,
}

impl Default for HealthBasics {
    fn default() -> Self {
        Self {
            last_message_time: 0,
            last_sequence_number: 0,
        }
    }
}

/// One slot of the [`StatisticsTable`]: a peer's baselines plus its current
/// reporting-window [`NodeReport`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerStats {
    pub basics: HealthBasics,
    pub report: NodeReport,
}

/// `N`-sized table of per-peer statistics, indexed by the peer's `index`
/// field from the [`forwarder_wire::Header`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatisticsTable {
    peers: Vec<PeerStats>,
}

impl StatisticsTable {
    /// Build a table sized for `n` members, all peers zeroed.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            peers: vec![PeerStats::default(); n],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PeerStats> {
        self.peers.get(index)
    }

    /// Fold one inbound kind-1/kind-2 datagram into peer `index`'s statistics.
    ///
    /// `now` and `timestamp` are both microseconds since the Unix epoch;
    /// `seq_in` is the datagram's sequence number; `len` is its total wire
    /// length in bytes, accumulated into goodput regardless of gap/duplicate
    /// status. Returns `false` if `index` is out of range for this table.
    pub fn observe(&mut self, index: usize, now: i64, timestamp: i64, seq_in: i64, len: u32) -> bool {
        let Some(peer) = self.peers.get_mut(index) else {
            tracing::debug!(index, "observe() on peer index outside statistics table");
            return false;
        };

        let delay = (now - timestamp).unsigned_abs() as f32;

        if peer.basics.last_message_time != 0 && peer.basics.last_sequence_number != 0 {
            update_health_core(&mut peer.report.latency, delay);
            update_health_core(&mut peer.report.jitter, peer.report.latency.variance);

            let gap = seq_in - (peer.basics.last_sequence_number + 1);
            if gap > 0 {
                peer.report.packet_loss += gap as u32;
            }

            peer.report.goodput += len;
        }

        peer.basics.last_message_time = now;
        peer.basics.last_sequence_number = seq_in;
        true
    }

    /// Zero every [`NodeReport`], keeping each peer's [`HealthBasics`] so the
    /// next reporting window can still detect gaps relative to the last
    /// datagram actually seen.
    pub fn reset(&mut self) {
        for peer in &mut self.peers {
            peer.report = NodeReport::default();
        }
    }

    /// Snapshot the whole table into index-order [`NodeReport`]s for a
    /// kind-4 report payload.
    #[must_use]
    pub fn to_reports(&self) -> Vec<NodeReport> {
        self.peers.iter().map(|peer| peer.report).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_skips_computation_but_sets_baselines() {
        let mut table = StatisticsTable::new(2);
        assert!(table.observe(1, 1_000, 900, 1, 20));

        let peer = table.get(1).unwrap();
        assert_eq!(peer.report.latency.count, 0);
        assert_eq!(peer.basics.last_message_time, 1_000);
        assert_eq!(peer.basics.last_sequence_number, 1);
    }

    #[test]
    fn packet_loss_accumulates_on_gap_and_ignores_reorders() {
        let mut table = StatisticsTable::new(2);
        table.observe(1, 100, 100, 1, 10);
        table.observe(1, 200, 200, 2, 10);
        table.observe(1, 300, 300, 5, 10);
        assert_eq!(table.get(1).unwrap().report.packet_loss, 2);

        // A reorder (seq=3, behind last seen seq=5) must not decrease the count.
        table.observe(1, 400, 400, 3, 10);
        assert_eq!(table.get(1).unwrap().report.packet_loss, 2);
    }

    #[test]
    fn goodput_accumulates_raw_bytes() {
        let mut table = StatisticsTable::new(2);
        table.observe(0, 100, 100, 1, 10);
        table.observe(0, 200, 200, 2, 30);
        assert_eq!(table.get(0).unwrap().report.goodput, 30);
    }

    #[test]
    fn reset_zeroes_reports_but_keeps_basics() {
        let mut table = StatisticsTable::new(1);
        table.observe(0, 100, 100, 1, 10);
        table.observe(0, 200, 150, 2, 10);
        assert!(table.get(0).unwrap().report.latency.count > 0);

        let basics_before = table.get(0).unwrap().basics;
        table.reset();

        let peer = table.get(0).unwrap();
        assert_eq!(peer.report, NodeReport::default());
        assert_eq!(peer.basics, basics_before);
    }

    #[test]
    fn welford_variance_matches_population_variance() {
        let mut core = HealthCore::default();
        let samples = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        for &sample in &samples {
            update_health_core(&mut core, sample);
        }

        let mean: f32 = samples.iter().sum::<f32>() / samples.len() as f32;
        let expected_variance: f32 =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / samples.len() as f32;

        assert!((core.mean - mean).abs() < 1e-4);
        assert!((core.variance - expected_variance).abs() < 1e-3);
    }

    #[test]
    fn observe_out_of_range_index_returns_false() {
        let mut table = StatisticsTable::new(1);
        assert!(!table.observe(5, 100, 100, 1, 10));
    }
}
