use crate::MAX_SIGNALS;

/// Kind-1 payload: a single relayed CAN (or CAN-FD) frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CanPayload {
    pub sequence_number: u32,
    pub fd: bool,
    pub need_response: bool,
    pub id: u32,
    /// Only present when `fd` is set.
    pub flags: Option<u8>,
    /// Length is `<= 8` for classic frames, `<= 64` for FD frames.
    pub data: Vec<u8>,
}

/// Kind-2 payload: a batch of synthetic sensor signals.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorPayload {
    /// Always `<= MAX_SIGNALS`; longer batches are rejected, not truncated.
    pub signals: Vec<f32>,
}

impl SensorPayload {
    #[must_use]
    pub fn new(signals: Vec<f32>) -> Option<Self> {
        if signals.len() > MAX_SIGNALS {
            None
        } else {
            Some(Self { signals })
        }
    }
}

/// Online latency/jitter aggregate, per Welford's algorithm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HealthCore {
    pub count: u32,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub variance: f32,
    pub sum_of_squared_differences: f32,
}

impl Default for HealthCore {
    fn default() -> Self {
        Self {
            count: 0,
            min: f32::MAX,
            max: f32::MIN,
            mean: 0.0,
            variance: 0.0,
            sum_of_squared_differences: 0.0,
        }
    }
}

/// The per-window health statistics computed about one peer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeReport {
    pub packet_loss: u32,
    pub goodput: u32,
    pub latency: HealthCore,
    pub jitter: HealthCore,
}

/// Kind-4 payload: the whole group's [`NodeReport`] table, in index order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportPayload {
    pub reports: Vec<NodeReport>,
}

/// The kind-discriminated body of a [`super::CommBlock`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Can(CanPayload),
    Sensor(SensorPayload),
    ReportRequest,
    Report(ReportPayload),
    Sync,
    /// `original_send_time` identifies, and restates the exact send time of,
    /// the sync this follow-up corresponds to.
    FollowUp { original_send_time: u64 },
    DelayRequest,
    /// `original_send_time` is the correlation key: the delay-request
    /// timestamp this response answers.
    DelayResponse { original_send_time: u64 },
}

/// A fully decoded wire message: header plus its matching payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CommBlock {
    pub header: super::Header,
    pub payload: Payload,
}
