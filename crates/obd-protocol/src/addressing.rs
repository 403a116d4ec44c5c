//! OBD-II CAN addressing: functional broadcast, physical ECU slots and the
//! receive filters that go with them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Functional (broadcast) request CAN ID, heard by every ECU.
pub const OBD_BROADCAST_ID: u32 = 0x7DF;

/// Physical request CAN ID of ECU slot 0.
pub const OBD_REQUEST_ID_BASE: u32 = 0x7E0;

/// Physical response CAN ID of ECU slot 0. Responses are request + 8.
pub const OBD_RESPONSE_ID_BASE: u32 = OBD_REQUEST_ID_BASE + 8;

/// Number of addressable ECU slots (0x7E8–0x7EF).
pub const MAX_ECUS: u8 = 8;

/// Standard 11-bit identifier mask.
pub const CAN_SFF_MASK: u32 = 0x7FF;

/// One of the eight physical ECU address pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EcuSlot(u8);

impl EcuSlot {
    /// Slot index `0..MAX_ECUS`, `None` otherwise.
    pub fn new(index: u8) -> Option<Self> {
        (index < MAX_ECUS).then_some(Self(index))
    }

    /// Map a physical response ID (0x7E8–0x7EF) back to its slot.
    pub fn from_response_id(id: u32) -> Option<Self> {
        id.checked_sub(OBD_RESPONSE_ID_BASE)
            .and_then(|index| u8::try_from(index).ok())
            .and_then(Self::new)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// CAN ID the tester sends to for this ECU.
    pub fn request_id(self) -> u32 {
        OBD_REQUEST_ID_BASE + u32::from(self.0)
    }

    /// CAN ID this ECU answers on.
    pub fn response_id(self) -> u32 {
        OBD_RESPONSE_ID_BASE + u32::from(self.0)
    }

    /// Iterate all slots in ascending order.
    pub fn all() -> impl Iterator<Item = EcuSlot> {
        (0..MAX_ECUS).map(Self)
    }
}

impl fmt::Display for EcuSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (0x{:03x}/0x{:03x})",
            self.0,
            self.request_id(),
            self.response_id()
        )
    }
}

/// Receive filter in SocketCAN terms: a frame passes when
/// `frame_id & mask == id & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFilter {
    pub id: u32,
    pub mask: u32,
}

impl IdFilter {
    /// Accept exactly one standard identifier.
    pub fn exact(id: u32) -> Self {
        Self {
            id,
            mask: CAN_SFF_MASK,
        }
    }

    pub fn matches(&self, frame_id: u32) -> bool {
        frame_id & self.mask == self.id & self.mask
    }
}

/// Who a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Functional addressing; every ECU may answer.
    #[default]
    Broadcast,
    /// Physical addressing of a single ECU.
    Ecu(EcuSlot),
}

impl Target {
    pub fn request_id(self) -> u32 {
        match self {
            Target::Broadcast => OBD_BROADCAST_ID,
            Target::Ecu(slot) => slot.request_id(),
        }
    }

    /// Filter admitting the responses this target can produce.
    pub fn response_filter(self) -> IdFilter {
        match self {
            // 0x7E8 with the low three bits masked off spans 0x7E8–0x7EF
            Target::Broadcast => IdFilter {
                id: OBD_RESPONSE_ID_BASE,
                mask: CAN_SFF_MASK & !0x07,
            },
            Target::Ecu(slot) => IdFilter::exact(slot.response_id()),
        }
    }
}

impl From<EcuSlot> for Target {
    fn from(slot: EcuSlot) -> Self {
        Target::Ecu(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids() {
        let slot = EcuSlot::new(3).unwrap();
        assert_eq!(slot.request_id(), 0x7E3);
        assert_eq!(slot.response_id(), 0x7EB);
        assert!(EcuSlot::new(8).is_none());
    }

    #[test]
    fn slot_from_response_id() {
        assert_eq!(EcuSlot::from_response_id(0x7E8), EcuSlot::new(0));
        assert_eq!(EcuSlot::from_response_id(0x7EF), EcuSlot::new(7));
        assert_eq!(EcuSlot::from_response_id(0x7F0), None);
        assert_eq!(EcuSlot::from_response_id(0x7DF), None);
    }

    #[test]
    fn broadcast_filter_spans_response_range() {
        let filter = Target::Broadcast.response_filter();
        assert_eq!(filter.id, 0x7E8);
        assert_eq!(filter.mask, 0x7F8);
        assert!((0x7E8..=0x7EF).all(|id| filter.matches(id)));
        assert!(!filter.matches(0x7E7));
        assert!(!filter.matches(0x7F0));
        assert!(!filter.matches(0x7DF));
    }

    #[test]
    fn targeted_filter_is_exact() {
        let target = Target::Ecu(EcuSlot::new(3).unwrap());
        assert_eq!(target.request_id(), 0x7E3);
        let filter = target.response_filter();
        assert_eq!(filter, IdFilter::exact(0x7EB));
        assert!(filter.matches(0x7EB));
        assert!(!filter.matches(0x7EA));
    }

    #[test]
    fn slot_display() {
        assert_eq!(EcuSlot::new(1).unwrap().to_string(), "1 (0x7e1/0x7e9)");
    }
}
