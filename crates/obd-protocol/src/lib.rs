pub mod addressing;
pub mod dtc;
pub mod features;
pub mod service;

pub use addressing::*;
pub use dtc::*;
pub use features::*;
pub use service::*;
