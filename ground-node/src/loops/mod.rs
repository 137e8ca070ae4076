//! Long-running I/O loops, one thread each
//!
//! - `TelemetryIngest`: sensor channel → frame decode → latency stats
//! - `CommandDispatch`: gamepad → thrust vector → control channel
//! - `SettingsSync`: settings changes, runs beside `CommandDispatch`
//! - `VideoRelay`: pulls frames from the video transport

mod dispatch;
mod settings_sync;
mod telemetry;
mod video_relay;

pub use dispatch::{CommandDispatch, DispatchState, DispatchStats, DispatchTiming};
pub use settings_sync::SettingsSync;
pub use telemetry::{IngestState, TelemetryIngest, TelemetryStats};
pub use video_relay::VideoRelay;

use crate::channel::SocketTimeouts;
use crate::config::GroundConfig;
use crossbeam_channel::Sender;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;

/// Where and how a loop opens its channel
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    /// Channel name for logs ("Sensor", "Motor")
    pub name: &'static str,
    pub host: String,
    pub port: u16,
    /// Back-off before the bind retry
    pub retry_delay: Duration,
    /// Socket read and write timeouts
    pub timeouts: SocketTimeouts,
}

impl ChannelSpec {
    /// Sensor channel from config
    pub fn sensor(config: &GroundConfig) -> Self {
        Self {
            name: "Sensor",
            host: config.network.host.clone(),
            port: config.network.sensor_port,
            retry_delay: config.timing.bind_retry_delay(),
            timeouts: config.network.socket_timeouts(),
        }
    }

    /// Control channel from config
    pub fn control(config: &GroundConfig) -> Self {
        Self {
            name: "Motor",
            host: config.network.host.clone(),
            port: config.network.control_port,
            retry_delay: config.timing.bind_retry_delay(),
            timeouts: config.network.socket_timeouts(),
        }
    }
}

/// Report the bound address to whoever is waiting for it
fn notify_listening(notifier: Option<&Sender<SocketAddr>>, addr: SocketAddr) {
    if let Some(tx) = notifier
        && tx.send(addr).is_err()
    {
        debug!("Listening notification for {} dropped", addr);
    }
}
