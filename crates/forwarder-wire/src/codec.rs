use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::header::{Header, Kind};
use crate::payload::{CanPayload, CommBlock, HealthCore, NodeReport, Payload, ReportPayload};
use crate::{HEADER_LEN, MAX_CLASSIC_DATA_LEN, MAX_FD_DATA_LEN, MAX_SIGNALS};

const HEALTH_CORE_LEN: usize = 4 * 6;
const NODE_REPORT_LEN: usize = 4 + 4 + 2 * HEALTH_CORE_LEN;

/// Number of bytes [`pack`] will write for `msg`.
///
/// Callers should size their send buffer with this before calling [`pack`].
#[must_use]
pub fn encoded_len(msg: &CommBlock) -> usize {
    HEADER_LEN
        + match &msg.payload {
            Payload::Can(can) => {
                let mut len = 4 + 1 + 1 + 4 + 1 + can.data.len();
                if can.fd {
                    len += 1;
                }
                len
            }
            Payload::Sensor(sensor) => 1 + sensor.signals.len() * 4,
            Payload::ReportRequest => 0,
            Payload::Report(report) => report.reports.len() * NODE_REPORT_LEN,
            Payload::Sync => 0,
            Payload::FollowUp { .. } => 8,
            Payload::DelayRequest => 0,
            Payload::DelayResponse { .. } => 8,
        }
}

fn write_health_core(w: &mut impl Write, core: &HealthCore) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(core.count)?;
    w.write_f32::<LittleEndian>(core.min)?;
    w.write_f32::<LittleEndian>(core.max)?;
    w.write_f32::<LittleEndian>(core.mean)?;
    w.write_f32::<LittleEndian>(core.variance)?;
    w.write_f32::<LittleEndian>(core.sum_of_squared_differences)
}

fn read_health_core(r: &mut impl Read) -> std::io::Result<HealthCore> {
    Ok(HealthCore {
        count: r.read_u32::<LittleEndian>()?,
        min: r.read_f32::<LittleEndian>()?,
        max: r.read_f32::<LittleEndian>()?,
        mean: r.read_f32::<LittleEndian>()?,
        variance: r.read_f32::<LittleEndian>()?,
        sum_of_squared_differences: r.read_f32::<LittleEndian>()?,
    })
}

/// Pack `msg` into `buf`, returning the number of bytes written.
///
/// `buf` must be at least [`encoded_len(msg)`](encoded_len) bytes; every
/// field is emitted byte-by-byte in little-endian order, so there is no
/// dependence on the host's struct layout or padding.
///
/// # Panics
///
/// Panics if `buf` is too small to hold the encoded message.
pub fn pack(msg: &CommBlock, buf: &mut [u8]) -> usize {
    let needed = encoded_len(msg);
    assert!(
        buf.len() >= needed,
        "buffer too small to pack CommBlock: have {}, need {needed}",
        buf.len()
    );

    let mut cursor = Cursor::new(&mut *buf);
    cursor.write_u8(msg.header.index).unwrap();
    cursor.write_u8(msg.header.kind.as_u8()).unwrap();
    cursor
        .write_u32::<LittleEndian>(msg.header.frame_number)
        .unwrap();
    cursor
        .write_u64::<LittleEndian>(msg.header.timestamp)
        .unwrap();

    match &msg.payload {
        Payload::Can(can) => {
            cursor.write_u32::<LittleEndian>(can.sequence_number).unwrap();
            cursor.write_u8(can.fd as u8).unwrap();
            cursor.write_u8(can.need_response as u8).unwrap();
            cursor.write_u32::<LittleEndian>(can.id).unwrap();
            cursor.write_u8(can.data.len() as u8).unwrap();
            if can.fd {
                cursor.write_u8(can.flags.unwrap_or(0)).unwrap();
            }
            cursor.write_all(&can.data).unwrap();
        }
        Payload::Sensor(sensor) => {
            cursor.write_u8(sensor.signals.len() as u8).unwrap();
            for signal in &sensor.signals {
                cursor.write_f32::<LittleEndian>(*signal).unwrap();
            }
        }
        Payload::ReportRequest | Payload::Sync | Payload::DelayRequest => {}
        Payload::Report(report) => {
            for node in &report.reports {
                cursor.write_u32::<LittleEndian>(node.packet_loss).unwrap();
                cursor.write_u32::<LittleEndian>(node.goodput).unwrap();
                write_health_core(&mut cursor, &node.latency).unwrap();
                write_health_core(&mut cursor, &node.jitter).unwrap();
            }
        }
        Payload::FollowUp { original_send_time } | Payload::DelayResponse { original_send_time } => {
            cursor
                .write_u64::<LittleEndian>(*original_send_time)
                .unwrap();
        }
    }

    needed
}

/// Unpack a datagram into a [`CommBlock`].
///
/// Returns `None` on any length mismatch or unknown `kind`: a malformed or
/// truncated datagram is dropped wholesale, never partially applied.
///
/// `members` is the current session's member count `N`. It is only
/// consulted for kind-4 (report) datagrams: unlike every other kind, a
/// report's length is `N * size_of::<NodeReport>()`, which isn't
/// self-describing from the bytes alone.
#[must_use]
pub fn unpack(buf: &[u8], members: usize) -> Option<CommBlock> {
    if buf.len() < HEADER_LEN {
        tracing::debug!(len = buf.len(), "datagram shorter than CommBlock header");
        return None;
    }

    let mut cursor = Cursor::new(buf);
    let index = cursor.read_u8().ok()?;
    let kind_byte = cursor.read_u8().ok()?;
    let frame_number = cursor.read_u32::<LittleEndian>().ok()?;
    let timestamp = cursor.read_u64::<LittleEndian>().ok()?;

    let Some(kind) = Kind::from_u8(kind_byte) else {
        tracing::debug!(kind = kind_byte, "unknown CommBlock kind, dropping datagram");
        return None;
    };
    let header = Header {
        index,
        kind,
        frame_number,
        timestamp,
    };

    let payload = match kind {
        Kind::Can => {
            let sequence_number = cursor.read_u32::<LittleEndian>().ok()?;
            let fd = cursor.read_u8().ok()? != 0;
            let need_response = cursor.read_u8().ok()? != 0;
            let id = cursor.read_u32::<LittleEndian>().ok()?;
            let len = cursor.read_u8().ok()? as usize;
            let max_len = if fd { MAX_FD_DATA_LEN } else { MAX_CLASSIC_DATA_LEN };
            if len > max_len {
                tracing::debug!(len, fd, "oversized CAN payload, dropping datagram");
                return None;
            }
            let flags = if fd { Some(cursor.read_u8().ok()?) } else { None };
            let mut data = vec![0u8; len];
            cursor.read_exact(&mut data).ok()?;
            Payload::Can(CanPayload {
                sequence_number,
                fd,
                need_response,
                id,
                flags,
                data,
            })
        }
        Kind::Sensor => {
            let num_signals = (cursor.read_u8().ok()? as usize).min(MAX_SIGNALS);
            let mut signals = Vec::with_capacity(num_signals);
            for _ in 0..num_signals {
                signals.push(cursor.read_f32::<LittleEndian>().ok()?);
            }
            Payload::Sensor(crate::payload::SensorPayload { signals })
        }
        Kind::ReportRequest => Payload::ReportRequest,
        Kind::Report => {
            let mut reports = Vec::with_capacity(members);
            for _ in 0..members {
                let packet_loss = cursor.read_u32::<LittleEndian>().ok()?;
                let goodput = cursor.read_u32::<LittleEndian>().ok()?;
                let latency = read_health_core(&mut cursor).ok()?;
                let jitter = read_health_core(&mut cursor).ok()?;
                reports.push(NodeReport {
                    packet_loss,
                    goodput,
                    latency,
                    jitter,
                });
            }
            Payload::Report(ReportPayload { reports })
        }
        Kind::Sync => Payload::Sync,
        Kind::FollowUp => Payload::FollowUp {
            original_send_time: cursor.read_u64::<LittleEndian>().ok()?,
        },
        Kind::DelayRequest => Payload::DelayRequest,
        Kind::DelayResponse => Payload::DelayResponse {
            original_send_time: cursor.read_u64::<LittleEndian>().ok()?,
        },
    };

    // Any leftover bytes mean the datagram didn't match kind+len exactly.
    let consumed = cursor.position() as usize;
    if consumed != buf.len() {
        tracing::debug!(consumed, total = buf.len(), "trailing bytes after CommBlock");
        return None;
    }

    Some(CommBlock { header, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::SensorPayload;

    fn roundtrip(msg: CommBlock, members: usize) {
        let mut buf = vec![0u8; encoded_len(&msg)];
        let written = pack(&msg, &mut buf);
        assert_eq!(written, buf.len());
        let decoded = unpack(&buf, members).expect("should decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn roundtrips_classic_can_frame() {
        let msg = CommBlock {
            header: Header {
                index: 1,
                kind: Kind::Can,
                frame_number: 42,
                timestamp: 1_700_000_000_000_000,
            },
            payload: Payload::Can(CanPayload {
                sequence_number: 7,
                fd: false,
                need_response: false,
                id: 0x18F0_0485,
                flags: None,
                data: vec![0xFF],
            }),
        };
        roundtrip(msg, 3);
    }

    #[test]
    fn roundtrips_fd_can_frame_with_flags() {
        let msg = CommBlock {
            header: Header {
                index: 2,
                kind: Kind::Can,
                frame_number: 1,
                timestamp: 123,
            },
            payload: Payload::Can(CanPayload {
                sequence_number: 1,
                fd: true,
                need_response: true,
                id: 0x1234,
                flags: Some(0b0000_0010),
                data: vec![0xAB; 64],
            }),
        };
        roundtrip(msg, 3);
    }

    #[test]
    fn roundtrips_sensor_payload() {
        let msg = CommBlock {
            header: Header {
                index: 0,
                kind: Kind::Sensor,
                frame_number: 9,
                timestamp: 55,
            },
            payload: Payload::Sensor(SensorPayload::new(vec![1.0, -2.5, 3.25]).unwrap()),
        };
        roundtrip(msg, 3);
    }

    #[test]
    fn roundtrips_report() {
        let msg = CommBlock {
            header: Header {
                index: 0,
                kind: Kind::Report,
                frame_number: 0,
                timestamp: 0,
            },
            payload: Payload::Report(ReportPayload {
                reports: vec![NodeReport::default(); 3],
            }),
        };
        roundtrip(msg, 3);
    }

    #[test]
    fn roundtrips_sync_follow_up_delay_request_response() {
        for (kind, payload) in [
            (Kind::Sync, Payload::Sync),
            (
                Kind::FollowUp,
                Payload::FollowUp {
                    original_send_time: 1_000_000,
                },
            ),
            (Kind::DelayRequest, Payload::DelayRequest),
            (
                Kind::DelayResponse,
                Payload::DelayResponse {
                    original_send_time: 1_000_065,
                },
            ),
        ] {
            let msg = CommBlock {
                header: Header {
                    index: 1,
                    kind,
                    frame_number: 0,
                    timestamp: 1_000_000,
                },
                payload,
            };
            roundtrip(msg, 3);
        }
    }

    #[test]
    fn unpack_rejects_truncated_header() {
        let buf = [0u8; HEADER_LEN - 1];
        assert!(unpack(&buf, 0).is_none());
    }

    #[test]
    fn unpack_rejects_unknown_kind() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[1] = 200; // kind byte
        assert!(unpack(&buf, 0).is_none());
    }

    #[test]
    fn unpack_rejects_oversized_can_payload() {
        let msg = CommBlock {
            header: Header {
                index: 0,
                kind: Kind::Can,
                frame_number: 0,
                timestamp: 0,
            },
            payload: Payload::Can(CanPayload {
                sequence_number: 0,
                fd: false,
                need_response: false,
                id: 0,
                flags: None,
                data: vec![0; 8],
            }),
        };
        let mut buf = vec![0u8; encoded_len(&msg)];
        pack(&msg, &mut buf);
        // Corrupt the declared length byte to claim 9 bytes of classic data.
        buf[HEADER_LEN + 4 + 1 + 1 + 4] = 9;
        assert!(unpack(&buf, 0).is_none());
    }

    #[test]
    fn unpack_clamps_oversized_sensor_count_by_dropping() {
        // numSignals byte claims more signals than actually follow; short read -> None.
        let mut buf = vec![0u8; HEADER_LEN + 1];
        buf[1] = Kind::Sensor.as_u8();
        buf[HEADER_LEN] = 255;
        assert!(unpack(&buf, 0).is_none());
    }
}
