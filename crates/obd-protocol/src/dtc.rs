use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// DTC category, selected by the top two bits of the packed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcCategory {
    /// P: Powertrain (engine, transmission).
    Powertrain,
    /// C: Chassis (ABS, steering).
    Chassis,
    /// B: Body (airbags, AC, lighting).
    Body,
    /// U: Network/Communication (CAN bus errors).
    Network,
}

impl DtcCategory {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0b00 => DtcCategory::Powertrain,
            0b01 => DtcCategory::Chassis,
            0b10 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    fn bits(self) -> u16 {
        match self {
            DtcCategory::Powertrain => 0b00,
            DtcCategory::Chassis => 0b01,
            DtcCategory::Body => 0b10,
            DtcCategory::Network => 0b11,
        }
    }

    pub fn letter(self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

/// OBD-II Diagnostic Trouble Code in its 2-byte packed form.
///
/// Layout (MSB first): 2 bits category, 2 bits first digit (0–3), then three
/// hex nibbles. Serializes as the rendered code string (e.g. `"P0158"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Dtc(u16);

impl Dtc {
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub fn from_bytes(hi: u8, lo: u8) -> Self {
        Self(u16::from_be_bytes([hi, lo]))
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub fn category(self) -> DtcCategory {
        DtcCategory::from_bits(self.0 >> 14)
    }

    /// Decode every 2-byte pair of `bytes` as a DTC. A trailing odd byte is a
    /// truncated code and is dropped.
    pub fn list_from_payload(bytes: &[u8]) -> Vec<Dtc> {
        bytes
            .chunks_exact(2)
            .map(|pair| Dtc::from_bytes(pair[0], pair[1]))
            .collect()
    }
}

fn hex_char(nibble: u16) -> char {
    let nibble = (nibble & 0x0F) as u8;
    if nibble > 9 {
        char::from(b'A' + nibble - 10)
    } else {
        char::from(b'0' + nibble)
    }
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0;
        write!(
            f,
            "{}{}{}{}{}",
            self.category().letter(),
            (raw >> 12) & 0x03,
            hex_char(raw >> 8),
            hex_char(raw >> 4),
            hex_char(raw)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid DTC code {0:?}: expected [PCBU][0-3][0-9A-F]{{3}}")]
pub struct DtcParseError(pub String);

impl FromStr for Dtc {
    type Err = DtcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DtcParseError(s.to_string());
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 5 {
            return Err(err());
        }

        let category = DtcCategory::from_letter(chars[0]).ok_or_else(err)?;
        let first = chars[1].to_digit(4).ok_or_else(err)?;

        let mut raw = (category.bits() << 14) | ((first as u16) << 12);
        for (i, c) in chars[2..].iter().enumerate() {
            let nibble = c.to_digit(16).ok_or_else(err)? as u16;
            raw |= nibble << (8 - 4 * i);
        }
        Ok(Dtc(raw))
    }
}

impl From<Dtc> for String {
    fn from(dtc: Dtc) -> Self {
        dtc.to_string()
    }
}

impl TryFrom<String> for Dtc {
    type Error = DtcParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
