/// Discriminates the payload that follows a [`super::Header`] on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A relayed CAN frame.
    Can,
    /// A synthetic sensor reading, injected by the Controller.
    Sensor,
    /// A request that this node emit a health report.
    ReportRequest,
    /// A per-peer health report.
    Report,
    /// PTP-style sync message.
    Sync,
    /// PTP-style follow-up message.
    FollowUp,
    /// PTP-style delay-request message.
    DelayRequest,
    /// PTP-style delay-response message.
    DelayResponse,
}

impl Kind {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Kind::Can => 1,
            Kind::Sensor => 2,
            Kind::ReportRequest => 3,
            Kind::Report => 4,
            Kind::Sync => 5,
            Kind::FollowUp => 6,
            Kind::DelayRequest => 7,
            Kind::DelayResponse => 8,
        }
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Kind::Can),
            2 => Some(Kind::Sensor),
            3 => Some(Kind::ReportRequest),
            4 => Some(Kind::Report),
            5 => Some(Kind::Sync),
            6 => Some(Kind::FollowUp),
            7 => Some(Kind::DelayRequest),
            8 => Some(Kind::DelayResponse),
            _ => None,
        }
    }
}

/// The mandatory 14-byte envelope header present on every datagram.
///
/// `timestamp` carries different meanings depending on `kind`: for data-plane
/// kinds (CAN, sensor) it is the emission time; for the PTP-style kinds it is
/// the inline sync/delay-request/delay-response time used by the time
/// service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub index: u8,
    pub kind: Kind,
    pub frame_number: u32,
    pub timestamp: u64,
}
