use forwarder_wire::{CanPayload, MAX_CLASSIC_DATA_LEN, MAX_FD_DATA_LEN};

/// A local CAN (or CAN-FD) frame, as read from or written to a channel.
///
/// Unlike [`CanPayload`] this carries no sequence number or need-response
/// flag; those belong to the wire envelope, not the frame itself.
#[derive(Clone, Debug, PartialEq)]
pub struct CanFrame {
    pub id: u32,
    pub fd: bool,
    pub flags: Option<u8>,
    /// Length is `<= 8` for classic frames, `<= 64` for FD frames.
    pub data: Vec<u8>,
}

impl CanFrame {
    #[must_use]
    pub fn classic(id: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            fd: false,
            flags: None,
            data,
        }
    }

    #[must_use]
    pub fn fd(id: u32, flags: u8, data: Vec<u8>) -> Self {
        Self {
            id,
            fd: true,
            flags: Some(flags),
            data,
        }
    }

    #[inline]
    #[must_use]
    pub fn max_data_len(&self) -> usize {
        if self.fd {
            MAX_FD_DATA_LEN
        } else {
            MAX_CLASSIC_DATA_LEN
        }
    }

    #[inline]
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.data.len() <= self.max_data_len()
    }
}

/// Wrap this frame as a kind-1 payload carrying `sequence_number`.
#[must_use]
pub fn to_can_payload(frame: &CanFrame, sequence_number: u32, need_response: bool) -> CanPayload {
    CanPayload {
        sequence_number,
        fd: frame.fd,
        need_response,
        id: frame.id,
        flags: frame.flags,
        data: frame.data.clone(),
    }
}

/// Unwrap a kind-1 payload back into a local frame, dropping the parts that
/// only make sense on the wire (sequence number, need-response).
#[must_use]
pub fn from_can_payload(payload: &CanPayload) -> CanFrame {
    CanFrame {
        id: payload.id,
        fd: payload.fd,
        flags: payload.flags,
        data: payload.data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_frame_round_trips_through_payload() {
        let frame = CanFrame::classic(0x18F0_0485, vec![1, 2, 3]);
        let payload = to_can_payload(&frame, 7, false);
        let back = from_can_payload(&payload);
        assert_eq!(frame, back);
    }

    #[test]
    fn fd_frame_keeps_flags() {
        let frame = CanFrame::fd(0x123, 0b10, vec![0xAB; 40]);
        let payload = to_can_payload(&frame, 1, true);
        assert_eq!(payload.flags, Some(0b10));
        assert!(payload.fd);
    }

    #[test]
    fn oversized_classic_data_is_not_well_formed() {
        let frame = CanFrame::classic(0, vec![0; 9]);
        assert!(!frame.is_well_formed());
    }
}
