//! Shared test harness for E2E scenarios.
//!
//! Scripts ECU answers onto a `MockCanInterface` the way an ISO-TP sender
//! would put them on the wire, so the session, enumerator and CLI dispatch
//! run their real code paths end to end.

#![allow(dead_code)]

use std::time::Duration;

use obd_canbus::{CanFrame, MockCanInterface, ObdSession};
use obd_protocol::EcuSlot;

/// Response CAN ID of ECU slot `n`.
pub fn ecu_id(n: u8) -> u32 {
    0x7E8 + u32::from(n)
}

pub fn slot(n: u8) -> EcuSlot {
    EcuSlot::new(n).expect("slot in range")
}

/// Encode `payload` as an ECU would send it: one single frame, or a first
/// frame followed by consecutive frames (sequence 1, 2, ... wrapping at 16).
/// Unused bytes are padded with 0xAA.
pub fn segment(id: u32, payload: &[u8]) -> Vec<CanFrame> {
    let pad = |bytes: &[u8]| {
        let mut data = [0xAAu8; 8];
        data[..bytes.len()].copy_from_slice(bytes);
        CanFrame { id, data }
    };

    if payload.len() <= 7 {
        let mut sf = vec![payload.len() as u8];
        sf.extend_from_slice(payload);
        return vec![pad(&sf)];
    }

    let len = payload.len();
    let mut ff = vec![0x10 | ((len >> 8) as u8 & 0x0F), len as u8];
    ff.extend_from_slice(&payload[..6]);
    let mut frames = vec![pad(&ff)];

    for (i, chunk) in payload[6..].chunks(7).enumerate() {
        let mut cf = vec![0x20 | ((i + 1) as u8 & 0x0F)];
        cf.extend_from_slice(chunk);
        frames.push(pad(&cf));
    }
    frames
}

/// Service 0x01 supported-PID answer for page `offset`.
pub fn pid_page(id: u32, offset: u8, bits: u32) -> CanFrame {
    let mut payload = vec![0x41, offset];
    payload.extend_from_slice(&bits.to_be_bytes());
    segment(id, &payload)[0]
}

/// Service 0x09 PID 0x00 answer.
pub fn info_page(id: u32, bits: u32) -> CanFrame {
    let mut payload = vec![0x49, 0x00];
    payload.extend_from_slice(&bits.to_be_bytes());
    segment(id, &payload)[0]
}

/// Positive DTC response: echo byte followed by packed codes.
pub fn dtc_payload(service: u8, codes: &[u16]) -> Vec<u8> {
    let mut payload = vec![service | 0x40];
    for code in codes {
        payload.extend_from_slice(&code.to_be_bytes());
    }
    payload
}

/// Mock bus plus the session timeout the scenarios run with.
pub struct TestBus {
    pub mock: MockCanInterface,
    pub timeout: Duration,
}

impl TestBus {
    pub fn new() -> Self {
        Self {
            mock: MockCanInterface::new(),
            timeout: Duration::from_secs(1),
        }
    }

    pub fn session(&self) -> ObdSession<'_> {
        ObdSession::new(&self.mock).with_timeout(self.timeout)
    }

    /// Script the answer to the next request.
    pub fn reply(&self, frames: Vec<CanFrame>) {
        self.mock.queue_reply(frames);
    }

    /// Script an ECU that stays silent for the next request.
    pub fn silence(&self) {
        self.mock.queue_reply(Vec::new());
    }

    /// IDs of every frame the tester put on the bus.
    pub fn sent_ids(&self) -> Vec<u32> {
        self.mock.sent_frames().iter().map(|f| f.id).collect()
    }
}
