//! OBD-II session layer.
//!
//! An [`ObdSession`] maps OBD-II services onto the ISO-TP transport: it picks
//! functional or physical addressing, installs the matching receive filter,
//! sends the request as a single frame and reassembles the answer until the
//! session deadline expires.
//!
//! Outcomes follow three tiers:
//! - transport faults are returned as errors;
//! - silence, echo mismatches and malformed frames yield `Ok(None)`;
//! - out-of-range service or PID values are rejected before anything is sent.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use obd_protocol::{
    Dtc, DtcSource, EcuSlot, FeatureBitmap, ObdRequest, PID_VIN, SERVICE_CLEAR_DTCS,
    SERVICE_CURRENT_DATA, SERVICE_FREEZE_FRAME, SERVICE_VEHICLE_INFO, Target,
};

use crate::error::CanResult;
use crate::interface::CanInterface;
use crate::isotp::{Reassembler, encode_single_frame, flow_control_frame};
use crate::poll::{Deadline, Step, drain_stale, poll_until};
use crate::types::{CanFrame, ISOTP_FF};

/// How long a request waits for its response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of characters in a vehicle identification number.
const VIN_LEN: usize = 17;

/// Raw answer to a service/PID request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObdResponse {
    pub ecu: EcuSlot,
    pub service: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    /// Response bytes after the service and PID echo.
    pub data: Vec<u8>,
}

/// Vehicle information (service 0x09) features an ECU supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InfoReport {
    pub ecu: EcuSlot,
    pub bitmap: FeatureBitmap,
}

/// Trouble codes read from one ECU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtcReport {
    pub ecu: EcuSlot,
    pub source: DtcSource,
    pub codes: Vec<Dtc>,
}

/// Request/response exchange over one CAN interface.
pub struct ObdSession<'a> {
    iface: &'a dyn CanInterface,
    timeout: Duration,
}

impl<'a> ObdSession<'a> {
    pub fn new(iface: &'a dyn CanInterface) -> Self {
        Self {
            iface,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request receive deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interface(&self) -> &'a dyn CanInterface {
        self.iface
    }

    /// Validate a user-supplied service/PID pair and run it as a request.
    pub async fn custom(
        &self,
        target: Target,
        service: u32,
        pid: Option<u32>,
    ) -> CanResult<Option<ObdResponse>> {
        let request = ObdRequest::new(service, pid)?;
        self.request(target, request).await
    }

    /// Send `request` and return the first matching response.
    pub async fn request(
        &self,
        target: Target,
        request: ObdRequest,
    ) -> CanResult<Option<ObdResponse>> {
        let Some((ecu, payload)) = self.transact(target, &request).await? else {
            return Ok(None);
        };

        let data = payload
            .get(1 + request.pid_width()..)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        Ok(Some(ObdResponse {
            ecu,
            service: request.service,
            pid: request.pid,
            data,
        }))
    }

    /// Service 0x01: current value of `pid`.
    pub async fn show_data(&self, target: Target, pid: u16) -> CanResult<Option<ObdResponse>> {
        self.request(target, ObdRequest::with_pid(SERVICE_CURRENT_DATA, pid))
            .await
    }

    /// Service 0x02: freeze frame value of `pid`.
    pub async fn freeze_frame(&self, target: Target, pid: u16) -> CanResult<Option<ObdResponse>> {
        self.request(target, ObdRequest::with_pid(SERVICE_FREEZE_FRAME, pid))
            .await
    }

    /// Service 0x09 with an explicit PID.
    pub async fn vehicle_info(&self, target: Target, pid: u16) -> CanResult<Option<ObdResponse>> {
        self.request(target, ObdRequest::with_pid(SERVICE_VEHICLE_INFO, pid))
            .await
    }

    /// Service 0x09 PID 0x00: which vehicle information PIDs are available.
    pub async fn supported_info(&self, target: Target) -> CanResult<Option<InfoReport>> {
        let request = ObdRequest::with_pid(SERVICE_VEHICLE_INFO, 0x00);
        Ok(self
            .bitmap(target, &request)
            .await?
            .map(|(ecu, bitmap)| InfoReport { ecu, bitmap }))
    }

    /// Service 0x01 supported-PID page starting at `offset` (0x00, 0x20, ...).
    pub async fn supported_pids(
        &self,
        slot: EcuSlot,
        offset: u8,
    ) -> CanResult<Option<FeatureBitmap>> {
        let request = ObdRequest::with_pid(SERVICE_CURRENT_DATA, u16::from(offset));
        Ok(self
            .bitmap(Target::Ecu(slot), &request)
            .await?
            .map(|(_, bitmap)| bitmap))
    }

    /// Read stored, pending or permanent trouble codes.
    pub async fn read_dtcs(
        &self,
        target: Target,
        source: DtcSource,
    ) -> CanResult<Option<DtcReport>> {
        let request = ObdRequest::service_only(source.service());
        let Some((ecu, payload)) = self.transact(target, &request).await? else {
            return Ok(None);
        };

        Ok(Some(DtcReport {
            ecu,
            source,
            codes: Dtc::list_from_payload(&payload[1..]),
        }))
    }

    /// Service 0x04. No response is awaited.
    pub async fn clear_dtcs(&self, target: Target) -> CanResult<()> {
        self.send_request(target, &ObdRequest::service_only(SERVICE_CLEAR_DTCS))
            .await
    }

    /// Service 0x09 PID 0x02: the vehicle identification number.
    pub async fn read_vin(&self, target: Target) -> CanResult<Option<String>> {
        let Some(response) = self.vehicle_info(target, PID_VIN).await? else {
            return Ok(None);
        };

        // [item count, 17 ASCII characters]
        let Some(chars) = response.data.get(1..) else {
            return Ok(None);
        };
        let vin: String = chars
            .iter()
            .filter(|b| b.is_ascii_alphanumeric())
            .map(|&b| b as char)
            .collect();

        if vin.len() != VIN_LEN {
            warn!(ecu = %response.ecu, len = vin.len(), "unexpected VIN length");
        }
        Ok((!vin.is_empty()).then_some(vin))
    }

    async fn bitmap(
        &self,
        target: Target,
        request: &ObdRequest,
    ) -> CanResult<Option<(EcuSlot, FeatureBitmap)>> {
        let Some((ecu, payload)) = self.transact(target, request).await? else {
            return Ok(None);
        };

        let sent = request.payload();
        let pid_echo = &sent[1..];
        if payload.get(1..1 + pid_echo.len()) != Some(pid_echo) {
            debug!(%ecu, "feature response is for another PID");
            return Ok(None);
        }

        let bitmap = payload
            .get(1 + pid_echo.len()..)
            .and_then(FeatureBitmap::from_be_slice);
        if bitmap.is_none() {
            debug!(%ecu, len = payload.len(), "feature response too short");
        }
        Ok(bitmap.map(|b| (ecu, b)))
    }

    /// Filter, drain, send, receive, validate the echo.
    async fn transact(
        &self,
        target: Target,
        request: &ObdRequest,
    ) -> CanResult<Option<(EcuSlot, Vec<u8>)>> {
        self.iface.set_filter(target.response_filter())?;
        drain_stale(self.iface).await?;
        self.send_request(target, request).await?;

        let Some((id, payload)) = self.receive_message().await? else {
            debug!(service = request.service, "no response before deadline");
            return Ok(None);
        };

        let Some(&sid) = payload.first() else {
            debug!(id, "empty response");
            return Ok(None);
        };
        if !request.is_echoed_by(sid) {
            debug!(
                id,
                sid,
                service = request.service,
                "response does not echo the requested service"
            );
            return Ok(None);
        }

        Ok(EcuSlot::from_response_id(id).map(|ecu| (ecu, payload)))
    }

    pub(crate) async fn send_request(
        &self,
        target: Target,
        request: &ObdRequest,
    ) -> CanResult<()> {
        let frame = CanFrame {
            id: target.request_id(),
            data: encode_single_frame(&request.payload())?,
        };
        debug!(%frame, "sending request");
        self.iface.send_frame(&frame).await
    }

    /// Reassemble the next complete ISO-TP message, answering its first
    /// frame with one flow control. Once a multi-frame message has started,
    /// frames from other responders are ignored until it completes.
    async fn receive_message(&self) -> CanResult<Option<(u32, Vec<u8>)>> {
        let deadline = Deadline::after(self.timeout);
        let mut reassembler = Reassembler::new();
        let mut responder: Option<u32> = None;
        let mut message = None;

        poll_until(self.iface, &deadline, |frame| {
            if responder.is_some_and(|id| id != frame.id) {
                debug!(%frame, "ignoring frame from another responder");
                return Ok(Step::Continue);
            }

            match reassembler.accept_frame(&frame.data) {
                Ok(true) if frame.pci_type() == ISOTP_FF => {
                    responder = Some(frame.id);
                    Ok(Step::Reply(flow_control_frame(frame.id)))
                }
                Ok(true) => Ok(Step::Continue),
                Ok(false) => {
                    message = Some((frame.id, reassembler.data().to_vec()));
                    Ok(Step::Done)
                }
                Err(e) => {
                    warn!(%frame, error = %e, "discarding malformed frame");
                    reassembler.begin();
                    responder = None;
                    Ok(Step::Continue)
                }
            }
        })
        .await?;

        Ok(message)
    }
}
