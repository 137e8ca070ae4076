//! Editable node settings and the change hook used by the settings-sync loop

use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Settings that shape data processing on both nodes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Number of cameras streamed by the vehicle
    #[serde(rename = "numCams")]
    pub num_cams: u32,
    /// Drive model used for thrust mixing (e.g. "holonomic")
    pub drive: String,
    /// Number of thrusters
    #[serde(rename = "numMotors")]
    pub num_motors: usize,
    /// Per-motor direction multiplier (1 or -1)
    #[serde(rename = "flipMotors")]
    pub flip_motors: Vec<i8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_cams: 4,
            drive: "holonomic".to_string(),
            num_motors: 6,
            flip_motors: vec![1; 6],
        }
    }
}

/// A single settings edit
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum SettingChange {
    #[serde(rename = "numCams")]
    NumCams(u32),
    #[serde(rename = "drive")]
    Drive(String),
    #[serde(rename = "numMotors")]
    NumMotors(usize),
    #[serde(rename = "flipMotors")]
    FlipMotors(Vec<i8>),
}

impl SettingChange {
    /// Whether the vehicle must also learn about this change
    ///
    /// Camera count only affects the ground side; motor layout and drive
    /// model are needed by the vehicle.
    pub fn targets_water_node(&self) -> bool {
        !matches!(self, SettingChange::NumCams(_))
    }

    /// Render the change for the `data` field of a `settings` message
    ///
    /// The data field is a quoted string, so JSON double quotes become single
    /// quotes.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?.replace('"', "'"))
    }
}

/// Shared, thread-safe settings
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    /// Create a store seeded with `settings`
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    /// Apply one change
    pub fn apply(&self, change: &SettingChange) {
        let mut settings = self.inner.write();
        match change {
            SettingChange::NumCams(n) => settings.num_cams = *n,
            SettingChange::Drive(mode) => settings.drive = mode.clone(),
            SettingChange::NumMotors(n) => {
                settings.num_motors = *n;
                settings.flip_motors.resize(*n, 1);
            }
            SettingChange::FlipMotors(mask) => settings.flip_motors = mask.clone(),
        }
    }
}
