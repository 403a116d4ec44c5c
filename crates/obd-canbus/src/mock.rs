//! Mock CAN interface for testing.
//!
//! Supports scripted response queues and frame recording. All tests use this
//! instead of real CAN hardware so the suite runs in CI on any platform.
//!
//! Two kinds of scripted traffic:
//! - `queue_response` puts frames on the bus right away (stale traffic, or
//!   frames read directly by the ISO-TP layer);
//! - `queue_reply` scripts what the ECUs answer: each batch is released onto
//!   the bus when the next OBD-II request (a single frame) is sent.
//!
//! Receive filters behave like the kernel's: frames that do not match the
//! active filter are silently discarded. An empty bus waits out the receive
//! timeout on the tokio clock, so paused-clock tests finish instantly.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use obd_protocol::IdFilter;

use crate::error::{CanError, CanResult};
use crate::interface::CanInterface;
use crate::types::{CanFrame, ISOTP_SF};

/// Mock CAN interface with scripted responses and frame recording.
pub struct MockCanInterface {
    /// Frames currently waiting to be received (FIFO order).
    bus: Mutex<VecDeque<CanFrame>>,
    /// Reply batches released one per outbound request.
    replies: Mutex<VecDeque<Vec<CanFrame>>>,
    /// All frames passed to `send_frame` (for test assertions).
    sent_frames: Mutex<Vec<CanFrame>>,
    /// Every filter change, `None` for accept-all.
    filter_history: Mutex<Vec<Option<IdFilter>>>,
    active_filter: Mutex<Option<IdFilter>>,
    /// When set, `send_frame` fails with this message.
    send_error: Mutex<Option<String>>,
}

impl MockCanInterface {
    /// Create a new mock with no queued responses.
    pub fn new() -> Self {
        Self {
            bus: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            sent_frames: Mutex::new(Vec::new()),
            filter_history: Mutex::new(Vec::new()),
            active_filter: Mutex::new(None),
            send_error: Mutex::new(None),
        }
    }

    /// Create a mock pre-loaded with frames already on the bus.
    pub fn with_responses(responses: Vec<CanFrame>) -> Self {
        let mock = Self::new();
        mock.bus.lock().unwrap().extend(responses);
        mock
    }

    /// Put a frame on the bus immediately.
    pub fn queue_response(&self, frame: CanFrame) {
        self.bus.lock().unwrap().push_back(frame);
    }

    /// Script the frames sent in answer to the next unanswered request.
    /// An empty batch models an ECU that stays silent.
    pub fn queue_reply(&self, frames: Vec<CanFrame>) {
        self.replies.lock().unwrap().push_back(frames);
    }

    /// Make every following `send_frame` fail.
    pub fn fail_sends(&self, message: impl Into<String>) {
        *self.send_error.lock().unwrap() = Some(message.into());
    }

    /// Get copies of all frames that were sent.
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent_frames.lock().unwrap().clone()
    }

    /// Get the last sent frame, if any.
    pub fn last_sent(&self) -> Option<CanFrame> {
        self.sent_frames.lock().unwrap().last().copied()
    }

    /// Every filter installed so far, oldest first.
    pub fn filter_history(&self) -> Vec<Option<IdFilter>> {
        self.filter_history.lock().unwrap().clone()
    }

    /// Frames still waiting on the bus.
    pub fn pending(&self) -> usize {
        self.bus.lock().unwrap().len()
    }
}

impl Default for MockCanInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanInterface for MockCanInterface {
    async fn send_frame(&self, frame: &CanFrame) -> CanResult<()> {
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            return Err(CanError::Interface(message));
        }

        self.sent_frames.lock().unwrap().push(*frame);

        // Flow control and other transport frames do not trigger an answer.
        if frame.pci_type() == ISOTP_SF {
            if let Some(batch) = self.replies.lock().unwrap().pop_front() {
                self.bus.lock().unwrap().extend(batch);
            }
        }
        Ok(())
    }

    async fn recv_frame(&self, timeout: Duration) -> CanResult<CanFrame> {
        let filter = *self.active_filter.lock().unwrap();
        let next = {
            let mut bus = self.bus.lock().unwrap();
            let mut found = None;
            while let Some(frame) = bus.pop_front() {
                if filter.is_none_or(|f| f.matches(frame.id)) {
                    found = Some(frame);
                    break;
                }
            }
            found
        };

        match next {
            Some(frame) => Ok(frame),
            None => {
                tokio::time::sleep(timeout).await;
                Err(CanError::timeout(timeout))
            }
        }
    }

    fn set_filter(&self, filter: IdFilter) -> CanResult<()> {
        *self.active_filter.lock().unwrap() = Some(filter);
        self.filter_history.lock().unwrap().push(Some(filter));
        Ok(())
    }

    fn clear_filter(&self) -> CanResult<()> {
        *self.active_filter.lock().unwrap() = None;
        self.filter_history.lock().unwrap().push(None);
        Ok(())
    }
}
