//! Core CAN frame type and ISO-TP wire constants.

use std::fmt;

// ── ISO-TP frame type nibbles (upper nibble of byte 0) ────────

/// Single Frame.
pub const ISOTP_SF: u8 = 0x0;
/// First Frame.
pub const ISOTP_FF: u8 = 0x1;
/// Consecutive Frame.
pub const ISOTP_CF: u8 = 0x2;
/// Flow Control.
pub const ISOTP_FC: u8 = 0x3;

/// Classic CAN payload size.
pub const CAN_PAYLOAD_LEN: usize = 8;

/// Largest message expressible in the 12-bit first-frame length field.
pub const ISOTP_MAX_MESSAGE_LEN: usize = 4095;

/// Filler for unused request bytes, so padding is never mistaken for data.
pub const OBD_PAD_BYTE: u8 = 0xCC;

// ── CAN Frame ───────────────────────────────────────────────────

/// A raw CAN 2.0A frame (standard 11-bit ID) with a fixed 8-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN arbitration ID (11-bit standard).
    pub id: u32,
    /// Payload, zero-padded to 8 bytes.
    pub data: [u8; CAN_PAYLOAD_LEN],
}

impl CanFrame {
    /// Build a frame, zero-padding `data` to 8 bytes. Bytes past the eighth
    /// are ignored.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let mut payload = [0u8; CAN_PAYLOAD_LEN];
        let len = data.len().min(CAN_PAYLOAD_LEN);
        payload[..len].copy_from_slice(&data[..len]);
        Self { id, data: payload }
    }

    /// ISO-TP frame type nibble.
    pub fn pci_type(&self) -> u8 {
        self.data[0] >> 4
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03x}#", self.id)?;
        for (i, b) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
