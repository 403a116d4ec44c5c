//! ISO 15765-2 transport and OBD-II session layer.
//!
//! Frames travel through a [`CanInterface`]; [`isotp`] turns them into
//! logical messages, [`session`] maps OBD-II services onto that transport and
//! [`enumerate`] discovers the ECUs on the bus.

pub mod enumerate;
pub mod error;
pub mod interface;
pub mod isotp;
pub mod mock;
pub mod pid;
pub mod poll;
pub mod session;
pub mod types;

pub use enumerate::{EcuReport, EnumerationReport, enumerate};
pub use error::{CanError, CanResult};
pub use interface::CanInterface;
#[cfg(target_os = "linux")]
pub use interface::SocketCanInterface;
pub use mock::MockCanInterface;
pub use session::{DEFAULT_TIMEOUT, DtcReport, InfoReport, ObdResponse, ObdSession};
pub use types::CanFrame;
