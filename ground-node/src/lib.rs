//! Ground Node - operator-side half of a teleoperation link
//!
//! ## Channels
//!
//! - **Sensor (TCP, default port 8080)**: telemetry frames from the Water Node
//! - **Control (TCP, default port 8079)**: motor commands, connection notices
//!   and settings to the Water Node
//! - **Video**: request/reply frame transport behind [`video::VideoSource`]
//!
//! Every TCP channel accepts exactly one peer and carries `<{json}>` frames
//! (see [`protocol::codec`]). Each loop runs on its own thread and stops
//! cooperatively through [`run_state::RunState`].

pub mod channel;
pub mod config;
pub mod error;
pub mod input;
pub mod loops;
pub mod node;
pub mod protocol;
pub mod run_state;
pub mod settings;
pub mod trigger;
pub mod video;

// Re-export commonly used types
pub use config::GroundConfig;
pub use error::{Error, Result};
pub use node::{Collaborators, GroundNode, NodeReport, RunningNode};
pub use protocol::Message;
pub use run_state::{LoopName, RunFlag, RunState};
