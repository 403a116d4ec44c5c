//! Raw SocketCAN OBD-II tool, library crate.
//!
//! The binary is a thin shell over these modules so the command dispatch can
//! be driven against a mock bus from `obd-e2e-tests`.

pub mod commands;
pub mod config;
pub mod output;
