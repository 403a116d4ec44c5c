//! ISO 15765-2 (ISO-TP) framing: receive-side reassembly and the
//! single-frame encoder used for outbound OBD-II requests.

use tracing::warn;

use crate::error::{CanError, CanResult};
use crate::types::*;

/// ISO-TP Flow Control frame: ContinueToSend, block_size=0, separation_time=0.
pub const FLOW_CONTROL_CTS: [u8; CAN_PAYLOAD_LEN] = [0x30, 0, 0, 0, 0, 0, 0, 0];

/// Payload bytes carried by a single frame.
pub const SF_MAX_LEN: usize = 7;
/// Payload bytes carried by a first frame.
pub const FF_PAYLOAD_LEN: usize = 6;
/// Payload bytes carried by a consecutive frame.
pub const CF_PAYLOAD_LEN: usize = 7;

/// Flow control addressed back to the ECU that sent a first frame
/// (its physical request ID, i.e. response ID − 8).
pub fn flow_control_frame(responder_id: u32) -> CanFrame {
    CanFrame::new(responder_id.saturating_sub(8), &FLOW_CONTROL_CTS)
}

/// Encode `payload` as one single frame, padding unused bytes with 0xCC.
///
/// There is no multi-frame send path: every OBD-II request fits in 7 bytes.
pub fn encode_single_frame(payload: &[u8]) -> CanResult<[u8; CAN_PAYLOAD_LEN]> {
    if payload.len() > SF_MAX_LEN {
        return Err(CanError::IsoTp(format!(
            "{} byte request does not fit a single frame",
            payload.len()
        )));
    }

    let mut data = [OBD_PAD_BYTE; CAN_PAYLOAD_LEN];
    data[0] = (ISOTP_SF << 4) | payload.len() as u8;
    data[1..=payload.len()].copy_from_slice(payload);
    Ok(data)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Idle,
    Receiving,
    Complete,
}

/// Reassembles one logical ISO-TP message from a stream of CAN payloads.
///
/// Holds state for exactly one message; call [`Reassembler::begin`] before
/// reusing it for the next one.
#[derive(Debug, Default)]
pub struct Reassembler {
    state: State,
    expected_len: usize,
    offset: usize,
    last_seq: u8,
    lost_frames: usize,
    buffer: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial message and wait for a new single or first frame.
    pub fn begin(&mut self) {
        *self = Self::default();
    }

    /// Consume one frame payload. Returns `true` while more frames are
    /// expected and `false` once the message is complete.
    ///
    /// A consecutive frame whose sequence number skips ahead is logged as a
    /// lost frame; the write offset is advanced by one frame width before the
    /// new bytes are copied. This keeps the byte count aligned with the
    /// sender but does not repair the missing content.
    pub fn accept_frame(&mut self, data: &[u8; CAN_PAYLOAD_LEN]) -> CanResult<bool> {
        match data[0] >> 4 {
            ISOTP_SF => {
                let len = (data[0] & 0x0F) as usize;
                if len > SF_MAX_LEN {
                    return Err(CanError::IsoTp(format!(
                        "single frame declares {len} bytes (max {SF_MAX_LEN})"
                    )));
                }

                self.begin();
                self.buffer.extend_from_slice(&data[1..=len]);
                self.expected_len = len;
                self.offset = len;
                self.state = State::Complete;
                Ok(false)
            }
            ISOTP_FF => {
                let len = (((data[0] & 0x0F) as usize) << 8) | data[1] as usize;
                if len > ISOTP_MAX_MESSAGE_LEN {
                    return Err(CanError::IsoTp(format!(
                        "first frame declares {len} bytes (max {ISOTP_MAX_MESSAGE_LEN})"
                    )));
                }
                if len <= SF_MAX_LEN {
                    return Err(CanError::IsoTp(format!(
                        "first frame declares {len} bytes, which fits a single frame"
                    )));
                }

                self.begin();
                self.buffer = vec![0; len];
                self.buffer[..FF_PAYLOAD_LEN].copy_from_slice(&data[2..]);
                self.expected_len = len;
                self.offset = FF_PAYLOAD_LEN;
                self.state = State::Receiving;
                Ok(true)
            }
            ISOTP_CF => {
                if self.state != State::Receiving {
                    return Err(CanError::IsoTp(
                        "consecutive frame without a preceding first frame".into(),
                    ));
                }

                let seq = data[0] & 0x0F;
                let expected_seq = (self.last_seq + 1) & 0x0F;
                if seq != expected_seq {
                    self.lost_frames += 1;
                    warn!(
                        expected = expected_seq,
                        got = seq,
                        offset = self.offset,
                        "ISO-TP consecutive frame lost"
                    );
                    self.offset += CF_PAYLOAD_LEN;
                }

                if self.offset < self.expected_len {
                    let n = CF_PAYLOAD_LEN.min(self.expected_len - self.offset);
                    self.buffer[self.offset..self.offset + n].copy_from_slice(&data[1..=n]);
                }
                self.offset = (self.offset + CF_PAYLOAD_LEN).min(self.expected_len);
                self.last_seq = seq;

                if self.offset < self.expected_len {
                    Ok(true)
                } else {
                    self.state = State::Complete;
                    Ok(false)
                }
            }
            // Peer flow control never carries message bytes.
            ISOTP_FC => Ok(true),
            other => Err(CanError::IsoTp(format!("unexpected frame type 0x{other:X}"))),
        }
    }

    /// The logically valid prefix of the buffer. Only meaningful once
    /// [`Reassembler::accept_frame`] has returned `false`.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.expected_len]
    }

    pub fn into_data(mut self) -> Vec<u8> {
        self.buffer.truncate(self.expected_len);
        self.buffer
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// A first frame has been accepted and consecutive frames are pending.
    pub fn is_receiving(&self) -> bool {
        self.state == State::Receiving
    }

    /// Number of sequence gaps seen in the current message.
    pub fn lost_frames(&self) -> usize {
        self.lost_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split `payload` into first + consecutive frame payloads.
    fn segment(payload: &[u8]) -> Vec<[u8; 8]> {
        let len = payload.len();
        let mut frames = Vec::new();

        let mut ff = [0u8; 8];
        ff[0] = 0x10 | ((len >> 8) as u8 & 0x0F);
        ff[1] = len as u8;
        ff[2..].copy_from_slice(&payload[..6]);
        frames.push(ff);

        for (i, chunk) in payload[6..].chunks(7).enumerate() {
            let mut cf = [0u8; 8];
            cf[0] = 0x20 | ((i + 1) as u8 & 0x0F);
            cf[1..=chunk.len()].copy_from_slice(chunk);
            frames.push(cf);
        }
        frames
    }

    #[test]
    fn single_frames_of_every_length() {
        for len in 0..=7usize {
            let payload: Vec<u8> = (0..len as u8).map(|b| b + 0x40).collect();
            let mut data = [0xAAu8; 8];
            data[0] = len as u8;
            data[1..=len].copy_from_slice(&payload);

            let mut r = Reassembler::new();
            assert!(!r.accept_frame(&data).unwrap());
            assert_eq!(r.data(), payload.as_slice());
            assert!(r.is_complete());
        }
    }

    #[test]
    fn single_frame_length_above_seven_is_rejected() {
        let mut r = Reassembler::new();
        let err = r.accept_frame(&[0x08, 1, 2, 3, 4, 5, 6, 7]).unwrap_err();
        assert!(matches!(err, CanError::IsoTp(_)));
    }

    #[test]
    fn multi_frame_reassembly() {
        for len in [8usize, 13, 20, 62, 100, 300] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let frames = segment(&payload);
            assert_eq!(frames.len(), 1 + (len - 6).div_ceil(7));

            let mut r = Reassembler::new();
            assert!(r.accept_frame(&frames[0]).unwrap());
            let (last, middle) = frames[1..].split_last().unwrap();
            for cf in middle {
                assert!(r.accept_frame(cf).unwrap());
            }
            assert!(!r.accept_frame(last).unwrap());
            assert_eq!(r.data(), payload.as_slice());
            assert_eq!(r.lost_frames(), 0);
        }
    }

    #[test]
    fn sequence_number_wraps_after_fifteen() {
        let payload: Vec<u8> = (0..200u8).collect();
        let frames = segment(&payload);
        assert!(frames.len() > 17);
        assert_eq!(frames[16][0], 0x20);

        let mut r = Reassembler::new();
        let mut more = true;
        for f in &frames {
            more = r.accept_frame(f).unwrap();
        }
        assert!(!more);
        assert_eq!(r.data(), payload.as_slice());
        assert_eq!(r.lost_frames(), 0);
    }

    #[test]
    fn sequence_gap_keeps_declared_length() {
        let payload: Vec<u8> = (0..34u8).collect();
        let frames = segment(&payload);
        assert_eq!(frames.len(), 5);

        let mut r = Reassembler::new();
        assert!(r.accept_frame(&frames[0]).unwrap());
        assert!(r.accept_frame(&frames[1]).unwrap());
        // frames[2] (seq 2) is lost on the bus
        assert!(r.accept_frame(&frames[3]).unwrap());
        assert!(!r.accept_frame(&frames[4]).unwrap());

        assert_eq!(r.lost_frames(), 1);
        assert_eq!(r.data().len(), 34);
        assert_eq!(&r.data()[..13], &payload[..13]);
    }

    #[test]
    fn gap_on_last_frame_completes() {
        let payload: Vec<u8> = (0..20u8).collect();
        let frames = segment(&payload);

        let mut r = Reassembler::new();
        r.accept_frame(&frames[0]).unwrap();
        // seq 1 lost; seq 2 fills the tail
        assert!(!r.accept_frame(&frames[2]).unwrap());
        assert_eq!(r.data().len(), 20);
        assert_eq!(&r.data()[13..], &payload[13..]);
    }

    #[test]
    fn consecutive_without_first_is_rejected() {
        let mut r = Reassembler::new();
        let err = r.accept_frame(&[0x21, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, CanError::IsoTp(_)));
    }

    #[test]
    fn short_first_frame_is_rejected() {
        let mut r = Reassembler::new();
        assert!(r.accept_frame(&[0x10, 0x05, 1, 2, 3, 4, 5, 6]).is_err());
    }

    #[test]
    fn flow_control_does_not_touch_buffer() {
        let mut r = Reassembler::new();
        assert!(r.accept_frame(&FLOW_CONTROL_CTS).unwrap());
        assert!(r.data().is_empty());
        assert!(!r.is_receiving());
    }

    #[test]
    fn begin_discards_partial_message() {
        let payload: Vec<u8> = (0..20u8).collect();
        let frames = segment(&payload);
        let mut r = Reassembler::new();
        r.accept_frame(&frames[0]).unwrap();
        r.begin();
        assert!(!r.is_receiving());
        assert!(r.accept_frame(&frames[1]).is_err());
    }

    #[test]
    fn encode_request_pads_with_cc() {
        let data = encode_single_frame(&[0x01, 0x00]).unwrap();
        assert_eq!(data, [0x02, 0x01, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]);

        let data = encode_single_frame(&[0x22, 0xF1, 0x90]).unwrap();
        assert_eq!(data, [0x03, 0x22, 0xF1, 0x90, 0xCC, 0xCC, 0xCC, 0xCC]);
    }

    #[test]
    fn encode_rejects_multi_frame_payloads() {
        assert!(encode_single_frame(&[0; 8]).is_err());
    }

    #[test]
    fn flow_control_goes_to_request_id() {
        let fc = flow_control_frame(0x7E9);
        assert_eq!(fc.id, 0x7E1);
        assert_eq!(fc.data, FLOW_CONTROL_CTS);
    }
}
