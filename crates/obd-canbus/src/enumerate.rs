//! ECU discovery.
//!
//! A functional 0x01/0x00 request finds every responding ECU; each one is
//! then asked, over physical addressing, for its remaining supported-PID
//! pages and its vehicle information bitmap.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use obd_protocol::{
    EcuSlot, FEATURE_PAGE_SIZE, FeatureBitmap, FeaturePage, ObdRequest, SERVICE_CURRENT_DATA,
    Target,
};

use crate::error::CanResult;
use crate::poll::{Deadline, Step, drain_stale, poll_until};
use crate::session::ObdSession;
use crate::types::{CanFrame, ISOTP_SF};

/// Supported-PID pages walked per ECU (PIDs 0x01–0xE0).
pub const MAX_FEATURE_PAGES: u8 = 7;

/// Everything learned about one ECU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EcuReport {
    pub ecu: EcuSlot,
    /// Service 0x01 pages in ascending order; never contains an empty bitmap.
    pub pages: Vec<FeaturePage>,
    /// Service 0x09 supported info, `None` if the ECU did not answer.
    pub info: Option<FeatureBitmap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnumerationReport {
    pub ecus: Vec<EcuReport>,
}

impl EnumerationReport {
    pub fn is_empty(&self) -> bool {
        self.ecus.is_empty()
    }
}

/// Discover ECUs and their supported features.
///
/// The broadcast phase listens for the full session timeout, keeping the
/// last bitmap each slot reported. Slots that answered with an empty bitmap
/// are skipped. There are no retries.
pub async fn enumerate(session: &ObdSession<'_>) -> CanResult<EnumerationReport> {
    let responders = broadcast_discovery(session).await?;
    if responders.is_empty() {
        info!("no ECUs found");
        return Ok(EnumerationReport::default());
    }

    let mut report = EnumerationReport::default();
    for (ecu, first_page) in responders {
        if first_page.is_empty() {
            debug!(%ecu, "ECU reported no supported PIDs");
            continue;
        }
        info!(%ecu, "found ECU");

        let pages = walk_pages(session, ecu, first_page).await?;
        let info = session
            .supported_info(Target::Ecu(ecu))
            .await?
            .map(|r| r.bitmap);

        report.ecus.push(EcuReport { ecu, pages, info });
    }

    Ok(report)
}

async fn broadcast_discovery(
    session: &ObdSession<'_>,
) -> CanResult<BTreeMap<EcuSlot, FeatureBitmap>> {
    let iface = session.interface();
    let target = Target::Broadcast;
    let request = ObdRequest::with_pid(SERVICE_CURRENT_DATA, 0x00);

    iface.set_filter(target.response_filter())?;
    drain_stale(iface).await?;
    session.send_request(target, &request).await?;
    info!(timeout_ms = session.timeout().as_millis() as u64, "waiting for ECUs to respond");

    let mut responders = BTreeMap::new();
    let deadline = Deadline::after(session.timeout());
    poll_until(iface, &deadline, |frame| {
        match parse_page_zero(&frame) {
            Some((ecu, bitmap)) => {
                debug!(%ecu, %bitmap, "ECU responded");
                responders.insert(ecu, bitmap);
            }
            None => debug!(%frame, "ignoring non-bitmap frame"),
        }
        Ok(Step::Continue)
    })
    .await?;

    Ok(responders)
}

/// `[len, 0x41, 0x00, b0, b1, b2, b3]` from a single frame.
fn parse_page_zero(frame: &CanFrame) -> Option<(EcuSlot, FeatureBitmap)> {
    let d = &frame.data;
    if frame.pci_type() != ISOTP_SF || (d[0] & 0x0F) < 6 {
        return None;
    }
    if d[1] & 0x3F != SERVICE_CURRENT_DATA || d[2] != 0x00 {
        return None;
    }
    let ecu = EcuSlot::from_response_id(frame.id)?;
    FeatureBitmap::from_be_slice(&d[3..7]).map(|b| (ecu, b))
}

/// Follow the next-page bit from page 0x00 until it clears, a page comes back
/// empty or an ECU stops answering.
async fn walk_pages(
    session: &ObdSession<'_>,
    ecu: EcuSlot,
    first_page: FeatureBitmap,
) -> CanResult<Vec<FeaturePage>> {
    let mut pages = vec![FeaturePage {
        offset: 0,
        bitmap: first_page,
    }];
    let mut bitmap = first_page;

    for page in 1..MAX_FEATURE_PAGES {
        if !bitmap.has_next_page() {
            break;
        }

        let offset = page * FEATURE_PAGE_SIZE;
        bitmap = match session.supported_pids(ecu, offset).await? {
            Some(b) if !b.is_empty() => b,
            Some(_) => break,
            None => {
                debug!(%ecu, offset, "no answer for feature page");
                break;
            }
        };
        pages.push(FeaturePage { offset, bitmap });
    }

    Ok(pages)
}
