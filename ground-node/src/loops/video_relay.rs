//! Video relay loop: receive a frame, acknowledge it, repeat.

use crate::run_state::RunFlag;
use crate::video::{FRAME_ACK, VideoSource};
use log::{debug, error};

pub struct VideoRelay {
    flag: RunFlag,
    source: Box<dyn VideoSource>,
    verbose: bool,
}

impl VideoRelay {
    pub fn new(flag: RunFlag, source: Box<dyn VideoSource>, verbose: bool) -> Self {
        Self {
            flag,
            source,
            verbose,
        }
    }

    /// Run until the flag clears or the transport fails; returns frames relayed
    pub fn run(mut self) -> u64 {
        let mut frames = 0u64;
        while self.flag.is_running() {
            match self.source.recv_frame() {
                Ok(Some(frame)) => {
                    frames += 1;
                    if self.verbose {
                        debug!("Frame from {}: {} bytes", frame.device, frame.data.len());
                    }
                    if let Err(e) = self.source.send_reply(FRAME_ACK) {
                        error!("Video acknowledgement failed: {}", e);
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Video stream error: {}", e);
                    break;
                }
            }
        }
        debug!("Stopped VideoStream");
        frames
    }
}
