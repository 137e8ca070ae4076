//! Video transport seam
//!
//! The vehicle pushes camera frames over a request/reply transport: every
//! received frame must be acknowledged before the next one is sent. The node
//! treats frames as opaque.

use crate::error::Result;
use std::time::Duration;

/// Acknowledgement sent after each frame
pub const FRAME_ACK: &[u8] = b"OK";

/// One opaque camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Name of the sending camera
    pub device: String,
    /// Encoded image bytes
    pub data: Vec<u8>,
}

/// Pull-based frame source
pub trait VideoSource: Send {
    /// Wait for the next frame
    ///
    /// `Ok(None)` means no frame arrived within the source's own timeout.
    /// Implementations may block; the relay loop cannot interrupt them.
    fn recv_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Acknowledge the last frame
    fn send_reply(&mut self, reply: &[u8]) -> Result<()>;
}

/// Source with no transport behind it; each receive just waits `poll`
pub struct IdleVideoSource {
    poll: Duration,
}

impl IdleVideoSource {
    pub fn new(poll: Duration) -> Self {
        Self { poll }
    }
}

impl VideoSource for IdleVideoSource {
    fn recv_frame(&mut self) -> Result<Option<VideoFrame>> {
        std::thread::sleep(self.poll);
        Ok(None)
    }

    fn send_reply(&mut self, _reply: &[u8]) -> Result<()> {
        Ok(())
    }
}
