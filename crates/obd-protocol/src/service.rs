//! OBD-II service codes and validated request descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── OBD-II services ─────────────────────────────────────────────

/// Service 0x01: Show current data (live PIDs).
pub const SERVICE_CURRENT_DATA: u8 = 0x01;

/// Service 0x02: Show freeze frame data.
pub const SERVICE_FREEZE_FRAME: u8 = 0x02;

/// Service 0x03: Show stored DTCs.
pub const SERVICE_STORED_DTCS: u8 = 0x03;

/// Service 0x04: Clear DTCs and stored values.
pub const SERVICE_CLEAR_DTCS: u8 = 0x04;

/// Service 0x07: Show pending DTCs.
pub const SERVICE_PENDING_DTCS: u8 = 0x07;

/// Service 0x09: Request vehicle information.
pub const SERVICE_VEHICLE_INFO: u8 = 0x09;

/// Service 0x0A: Show permanent DTCs.
pub const SERVICE_PERMANENT_DTCS: u8 = 0x0A;

/// Highest service ID expressible in the 6-bit echo field.
pub const MAX_SERVICE: u32 = 0x3F;

/// Highest PID; anything above 0xFF is sent as two bytes.
pub const MAX_PID: u32 = 0xFFFF;

/// Offset added to the request service to form the positive response SID.
pub const RESPONSE_SID_OFFSET: u8 = 0x40;

/// Vehicle info PID 0x02: VIN.
pub const PID_VIN: u16 = 0x02;

/// Where a set of trouble codes is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcSource {
    #[default]
    Stored,
    Pending,
    Permanent,
}

impl DtcSource {
    pub fn service(self) -> u8 {
        match self {
            DtcSource::Stored => SERVICE_STORED_DTCS,
            DtcSource::Pending => SERVICE_PENDING_DTCS,
            DtcSource::Permanent => SERVICE_PERMANENT_DTCS,
        }
    }
}

impl fmt::Display for DtcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DtcSource::Stored => "stored",
            DtcSource::Pending => "pending",
            DtcSource::Permanent => "permanent",
        };
        f.write_str(name)
    }
}

/// Rejected before any frame reaches the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("impossible service ID 0x{0:X} (valid range 0x00-0x3F)")]
    InvalidService(u32),

    #[error("impossible PID 0x{0:X} (valid range 0x0000-0xFFFF)")]
    InvalidPid(u32),
}

/// A service plus optional PID, range-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObdRequest {
    pub service: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
}

impl ObdRequest {
    /// Validate raw user input into a request.
    pub fn new(service: u32, pid: Option<u32>) -> Result<Self, RequestError> {
        if service > MAX_SERVICE {
            return Err(RequestError::InvalidService(service));
        }
        let pid = pid
            .map(|p| u16::try_from(p).map_err(|_| RequestError::InvalidPid(p)))
            .transpose()?;
        Ok(Self {
            service: service as u8,
            pid,
        })
    }

    /// Request without a PID byte (DTC services).
    pub fn service_only(service: u8) -> Self {
        Self { service, pid: None }
    }

    pub fn with_pid(service: u8, pid: u16) -> Self {
        Self {
            service,
            pid: Some(pid),
        }
    }

    /// Service + PID bytes as they travel on the wire (1–3 bytes).
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = vec![self.service];
        match self.pid {
            Some(pid) if pid > 0xFF => payload.extend_from_slice(&pid.to_be_bytes()),
            Some(pid) => payload.push(pid as u8),
            None => {}
        }
        payload
    }

    /// Number of bytes the PID echo occupies in a response.
    pub fn pid_width(&self) -> usize {
        self.payload().len() - 1
    }

    /// True when `sid` (first response byte) echoes this request's service.
    pub fn is_echoed_by(&self, sid: u8) -> bool {
        (sid & MAX_SERVICE as u8) == self.service
    }
}
