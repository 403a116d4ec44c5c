//! Deadline-bounded receive loop.
//!
//! Every OBD-II exchange waits on the bus through [`poll_until`]: frames are
//! handed to a step function until it reports [`Step::Done`] or the
//! [`Deadline`] expires. Deadlines use the tokio clock, so tests can pause
//! and advance time instead of sleeping.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{CanError, CanResult};
use crate::interface::CanInterface;
use crate::types::CanFrame;

/// Longest single receive wait; bounds how late an expired deadline is noticed.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on frames discarded by [`drain_stale`] on a busy bus.
const MAX_DRAIN_FRAMES: usize = 256;

/// Stand-in expiry for timeouts too large to add to the clock (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Monotonic point in time after which a receive loop gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now. Timeouts past the clock's range are
    /// clamped instead of overflowing.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(timeout.min(FAR_FUTURE))
            .unwrap_or(now);
        Self { expires_at }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// What the receive loop does after handing a frame to the step function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep listening.
    Continue,
    /// Send this frame (e.g. flow control), then keep listening.
    Reply(CanFrame),
    /// Stop listening; the caller has what it needs.
    Done,
}

/// Receive frames until `step` returns [`Step::Done`] or `deadline` expires.
///
/// Returns `true` when the step function finished and `false` when the
/// deadline ran out first. Receive timeouts are not errors here; any other
/// interface error is propagated.
pub async fn poll_until<F>(
    iface: &dyn CanInterface,
    deadline: &Deadline,
    mut step: F,
) -> CanResult<bool>
where
    F: FnMut(CanFrame) -> CanResult<Step>,
{
    while !deadline.is_expired() {
        let wait = deadline.remaining().min(POLL_INTERVAL);

        match iface.recv_frame(wait).await {
            Ok(frame) => match step(frame)? {
                Step::Continue => {}
                Step::Reply(reply) => iface.send_frame(&reply).await?,
                Step::Done => return Ok(true),
            },
            Err(CanError::Timeout { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(false)
}

/// Discard frames already queued on the socket so responses to an earlier
/// request cannot be mistaken for responses to the next one.
pub async fn drain_stale(iface: &dyn CanInterface) -> CanResult<usize> {
    let mut drained = 0;
    while drained < MAX_DRAIN_FRAMES {
        match iface.recv_frame(Duration::ZERO).await {
            Ok(frame) => {
                debug!(%frame, "drained stale frame");
                drained += 1;
            }
            Err(CanError::Timeout { .. }) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(drained)
}
