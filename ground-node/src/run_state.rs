//! Run-state coordination for the Ground Node loops
//!
//! Every long-running loop owns one flag in a shared [`RunState`]. Loops read
//! their own flag through a [`RunFlag`] handle; the shutdown path clears all
//! flags at once with [`RunState::stop_all`].
//!
//! ```text
//! ┌──────────────┐  stop_all()   ┌──────────────────────────────────┐
//! │ Ctrl-C / 'q' │──────────────▶│ RunState                         │
//! │ stop code    │               │  streamVideo    receiveData      │
//! └──────────────┘               │  sendData       updateSettings   │
//!                                └──────────────────────────────────┘
//!                                   ▲ is_running() per loop tick
//! ```
//!
//! Cancellation is cooperative. A loop blocked inside a read observes the
//! flag change once that read returns, which is why socket and input reads
//! use bounded timeouts.

use log::debug;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on a single sleep slice in [`RunFlag::sleep`]
const SLEEP_TICK: Duration = Duration::from_millis(50);

/// The independent loops of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopName {
    /// Video relay loop
    StreamVideo,
    /// Telemetry ingest loop
    ReceiveData,
    /// Command dispatch loop
    SendData,
    /// Settings-sync sub-loop
    UpdateSettings,
}

impl LoopName {
    /// All loops, in flag order
    pub const ALL: [LoopName; 4] = [
        LoopName::StreamVideo,
        LoopName::ReceiveData,
        LoopName::SendData,
        LoopName::UpdateSettings,
    ];

    fn index(self) -> usize {
        match self {
            LoopName::StreamVideo => 0,
            LoopName::ReceiveData => 1,
            LoopName::SendData => 2,
            LoopName::UpdateSettings => 3,
        }
    }

    /// Name as used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            LoopName::StreamVideo => "streamVideo",
            LoopName::ReceiveData => "receiveData",
            LoopName::SendData => "sendData",
            LoopName::UpdateSettings => "updateSettings",
        }
    }
}

impl fmt::Display for LoopName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide set of "continue running" flags, one per loop
#[derive(Debug)]
pub struct RunState {
    flags: [AtomicBool; 4],
}

impl RunState {
    /// Create a run-state with every loop enabled
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            flags: [
                AtomicBool::new(true),
                AtomicBool::new(true),
                AtomicBool::new(true),
                AtomicBool::new(true),
            ],
        })
    }

    /// Check whether a loop should keep running
    pub fn is_running(&self, name: LoopName) -> bool {
        self.flags[name.index()].load(Ordering::SeqCst)
    }

    /// Clear a single loop's flag
    pub fn stop(&self, name: LoopName) {
        self.flags[name.index()].store(false, Ordering::SeqCst);
    }

    /// Clear every loop's flag
    pub fn stop_all(&self) {
        for flag in &self.flags {
            flag.store(false, Ordering::SeqCst);
        }
        debug!("Stopping threads");
    }

    /// True once every flag has been cleared
    pub fn all_stopped(&self) -> bool {
        LoopName::ALL.iter().all(|&name| !self.is_running(name))
    }

    /// Handle bound to one loop's flag
    pub fn flag(self: &Arc<Self>, name: LoopName) -> RunFlag {
        RunFlag {
            state: Arc::clone(self),
            name,
        }
    }
}

/// A loop's view of the shared run-state
#[derive(Debug, Clone)]
pub struct RunFlag {
    state: Arc<RunState>,
    name: LoopName,
}

impl RunFlag {
    /// Loop this flag belongs to
    pub fn name(&self) -> LoopName {
        self.name
    }

    /// Whether the owning loop should continue
    pub fn is_running(&self) -> bool {
        self.state.is_running(self.name)
    }

    /// Shared run-state, for loops that may trigger global shutdown
    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// Sleep for `duration`, waking early if the flag is cleared.
    ///
    /// Returns `true` if the full duration elapsed while still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_TICK));
        }
    }
}
