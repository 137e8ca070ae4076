//! Configuration for the Ground Node
//!
//! Loaded from a TOML file. Every section and key is optional; missing values
//! fall back to the defaults below.
//!
//! ```toml
//! [network]
//! host = "127.0.0.1"
//! sensor_port = 8080
//! control_port = 8079
//!
//! [timing]
//! bind_retry_delay_secs = 10.0
//!
//! [settings]
//! numCams = 4
//! drive = "holonomic"
//!
//! [logging]
//! level = "info"
//! verbose = false
//! ```

use crate::channel::SocketTimeouts;
use crate::error::Result;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default sensor channel port (`SNSR_PORT`)
pub const SNSR_PORT: u16 = 8080;

/// Default control channel port (`CNTLR_PORT`)
pub const CNTLR_PORT: u16 = 8079;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GroundConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listening endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address both channels bind to
    pub host: String,
    /// Sensor telemetry channel port
    pub sensor_port: u16,
    /// Motor control channel port
    pub control_port: u16,
    /// Socket read timeout, bounds how long a loop goes without checking its flag
    pub read_timeout_ms: u64,
    /// Socket write timeout; a peer that stops reading for longer is dropped
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            sensor_port: SNSR_PORT,
            control_port: CNTLR_PORT,
            read_timeout_ms: 500,
            write_timeout_ms: 2000,
        }
    }
}

/// Fixed delays used by the loops
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Back-off before the single bind retry
    pub bind_retry_delay_secs: f64,
    /// Interval between controller-presence polls
    pub controller_poll_secs: f64,
    /// Settings-sync poll interval
    pub settings_interval_secs: f64,
    /// Pause between sending "closing" and stopping all loops
    pub closing_grace_secs: f64,
    /// Grace period for the video loop at shutdown
    pub video_join_timeout_secs: f64,
    /// Timeout of a single input-device read
    pub input_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bind_retry_delay_secs: 10.0,
            controller_poll_secs: 5.0,
            settings_interval_secs: 2.0,
            closing_grace_secs: 2.0,
            video_join_timeout_secs: 5.0,
            input_poll_ms: 100,
        }
    }
}

/// Control channel behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Input event code that ends the session
    pub stop_code: u16,
    /// How many times the "closing" notice is sent
    pub closing_repetitions: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            // BTN_START on common gamepads
            stop_code: 315,
            closing_repetitions: 2,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log every frame sent and received
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

impl TimingConfig {
    pub fn bind_retry_delay(&self) -> Duration {
        secs(self.bind_retry_delay_secs)
    }

    pub fn controller_poll(&self) -> Duration {
        secs(self.controller_poll_secs)
    }

    pub fn settings_interval(&self) -> Duration {
        secs(self.settings_interval_secs)
    }

    pub fn closing_grace(&self) -> Duration {
        secs(self.closing_grace_secs)
    }

    pub fn video_join_timeout(&self) -> Duration {
        secs(self.video_join_timeout_secs)
    }

    pub fn input_poll(&self) -> Duration {
        Duration::from_millis(self.input_poll_ms)
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }

    pub fn socket_timeouts(&self) -> SocketTimeouts {
        SocketTimeouts {
            read: self.read_timeout(),
            write: self.write_timeout(),
        }
    }
}

impl GroundConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use ground_node::config::GroundConfig;
    ///
    /// let config = GroundConfig::from_file("ground-node.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
