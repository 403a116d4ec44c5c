//! Supported-PID feature bitmaps (service 0x01 PID 0x00/0x20/..., service 0x09 PID 0x00).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of PIDs described by one bitmap page.
pub const FEATURE_PAGE_SIZE: u8 = 0x20;

/// 32-bit supported-PID bitmap. Bit 31 is the first PID of the page, bit 0
/// the last; for service 0x01 bit 0 also announces the next page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureBitmap(u32);

impl FeatureBitmap {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Read a bitmap from the first four bytes of `bytes` (big-endian).
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let word: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Self(u32::from_be_bytes(word)))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Page-relative PID `n` (1–32) is supported.
    pub fn supports(self, n: u8) -> bool {
        (1..=32).contains(&n) && (self.0 >> (32 - u32::from(n))) & 0x01 != 0
    }

    /// Bit 0: the ECU has another page of supported PIDs.
    pub fn has_next_page(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Page-relative PIDs (1–32) whose bit is set, ascending.
    pub fn pids(self) -> SupportedPids {
        SupportedPids {
            bits: self.0,
            next: 0,
        }
    }
}

impl fmt::Display for FeatureBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Lazy iterator over the set bits of a [`FeatureBitmap`], MSB first.
#[derive(Debug, Clone)]
pub struct SupportedPids {
    bits: u32,
    next: u8,
}

impl Iterator for SupportedPids {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        while self.next < 32 {
            let i = self.next;
            self.next += 1;
            if (self.bits >> (31 - u32::from(i))) & 0x01 != 0 {
                return Some(i + 1);
            }
        }
        None
    }
}

/// One page of a service 0x01 supported-PID walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePage {
    /// PID that was requested for this page (0x00, 0x20, 0x40, ...).
    pub offset: u8,
    pub bitmap: FeatureBitmap,
}

impl FeaturePage {
    /// Absolute PID numbers supported on this page.
    pub fn pids(&self) -> impl Iterator<Item = u16> + '_ {
        let offset = u16::from(self.offset);
        self.bitmap.pids().map(move |n| offset + u16::from(n))
    }

    /// First and last PID this page describes.
    pub fn range(&self) -> (u16, u16) {
        let offset = u16::from(self.offset);
        (offset + 1, offset + u16::from(FEATURE_PAGE_SIZE))
    }
}
