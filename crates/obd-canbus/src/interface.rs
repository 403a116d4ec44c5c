//! CAN bus interface abstraction.
//!
//! `CanInterface` trait with `send_frame`/`recv_frame` and receive filtering.
//! Two impls:
//! - `SocketCanInterface`: Linux-only, wraps `socketcan::CanSocket`
//! - `MockCanInterface`: all platforms, scripted responses (in `mock.rs`)

use async_trait::async_trait;
use std::time::Duration;

use obd_protocol::IdFilter;

use crate::error::CanResult;
use crate::types::CanFrame;

/// Trait for CAN bus interface implementations.
#[async_trait]
pub trait CanInterface: Send + Sync {
    /// Send a CAN frame.
    async fn send_frame(&self, frame: &CanFrame) -> CanResult<()>;

    /// Receive a CAN frame, blocking up to `timeout`. An empty bus yields
    /// `CanError::Timeout`.
    async fn recv_frame(&self, timeout: Duration) -> CanResult<CanFrame>;

    /// Replace the receive filter; only matching frames are delivered.
    fn set_filter(&self, filter: IdFilter) -> CanResult<()>;

    /// Remove the receive filter and accept every frame.
    fn clear_filter(&self) -> CanResult<()>;
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use socket::SocketCanInterface;

#[cfg(target_os = "linux")]
mod socket {
    use std::io;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use socketcan::{CanFilter, CanSocket, EmbeddedFrame, Frame, Socket, SocketOptions, StandardId};
    use tracing::{debug, trace};

    use obd_protocol::IdFilter;

    use super::CanInterface;
    use crate::error::{CanError, CanResult};
    use crate::types::CanFrame;

    /// Raw SocketCAN interface for Linux hosts (`can0`, `vcan0`, ...).
    pub struct SocketCanInterface {
        interface_name: String,
        socket: Arc<CanSocket>,
    }

    impl SocketCanInterface {
        /// Open and bind a raw CAN socket on `interface_name`.
        pub fn open(interface_name: &str) -> CanResult<Self> {
            let socket = CanSocket::open(interface_name).map_err(|e| {
                CanError::Interface(format!("failed to open {interface_name}: {e}"))
            })?;
            debug!(interface = interface_name, "CAN socket bound");

            Ok(Self {
                interface_name: interface_name.to_string(),
                socket: Arc::new(socket),
            })
        }

        pub fn interface_name(&self) -> &str {
            &self.interface_name
        }
    }

    /// Frames ignored in one `recv_frame` call before it reports a timeout.
    const MAX_SKIPPED_FRAMES: usize = 256;

    /// 11-bit data frames only; 29-bit, remote and error frames are not part
    /// of OBD-II on CAN.
    fn obd_frame(raw: &socketcan::CanFrame) -> Option<CanFrame> {
        if EmbeddedFrame::is_extended(raw) || !EmbeddedFrame::is_data_frame(raw) {
            return None;
        }
        Some(CanFrame::new(raw.raw_id(), EmbeddedFrame::data(raw)))
    }

    fn is_timeout(e: &io::Error) -> bool {
        matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    }

    #[async_trait]
    impl CanInterface for SocketCanInterface {
        async fn send_frame(&self, frame: &CanFrame) -> CanResult<()> {
            let id = u16::try_from(frame.id)
                .ok()
                .and_then(StandardId::new)
                .ok_or_else(|| {
                    CanError::Interface(format!("0x{:X} is not an 11-bit CAN ID", frame.id))
                })?;
            let raw = socketcan::CanFrame::new(id, &frame.data).ok_or_else(|| {
                CanError::Interface("payload does not fit a classic CAN frame".into())
            })?;

            trace!(%frame, "tx");
            self.socket
                .write_frame(&raw)
                .map_err(|e| CanError::Interface(format!("send on {}: {e}", self.interface_name)))
        }

        async fn recv_frame(&self, timeout: Duration) -> CanResult<CanFrame> {
            let deadline = Instant::now().checked_add(timeout);

            for _ in 0..MAX_SKIPPED_FRAMES {
                let wait =
                    deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
                let socket = Arc::clone(&self.socket);
                let result = tokio::task::spawn_blocking(move || socket.read_frame_timeout(wait))
                    .await
                    .map_err(|e| CanError::Interface(format!("receive task failed: {e}")))?;

                match result {
                    Ok(raw) => match obd_frame(&raw) {
                        Some(frame) => {
                            trace!(%frame, "rx");
                            return Ok(frame);
                        }
                        None => trace!(id = raw.raw_id(), "skipping non-OBD frame"),
                    },
                    Err(e) if is_timeout(&e) => return Err(CanError::timeout(timeout)),
                    Err(e) => {
                        return Err(CanError::Interface(format!(
                            "receive on {}: {e}",
                            self.interface_name
                        )));
                    }
                }
            }

            Err(CanError::timeout(timeout))
        }

        fn set_filter(&self, filter: IdFilter) -> CanResult<()> {
            self.socket
                .set_filters(&[CanFilter::new(filter.id, filter.mask)])
                .map_err(|e| CanError::Interface(format!("set filter: {e}")))
        }

        fn clear_filter(&self) -> CanResult<()> {
            self.socket
                .set_filter_accept_all()
                .map_err(|e| CanError::Interface(format!("clear filter: {e}")))
        }
    }

}
