//! Settings-sync sub-loop
//!
//! Runs on its own thread beside the command dispatch loop and shares its
//! control connection. Each tick waits up to one interval for a
//! [`SettingChange`]; with nothing queued the tick is a no-op. Changes are
//! applied locally, and those the vehicle needs are forwarded as `settings`
//! messages.

use crate::channel::SharedWriter;
use crate::error::Result;
use crate::protocol::message::{NO_METADATA, data_type};
use crate::run_state::RunFlag;
use crate::settings::{SettingChange, SettingsStore};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};
use std::time::Duration;

pub struct SettingsSync {
    flag: RunFlag,
    writer: SharedWriter,
    store: SettingsStore,
    changes: Receiver<SettingChange>,
    interval: Duration,
    verbose: bool,
}

impl SettingsSync {
    pub fn new(
        flag: RunFlag,
        writer: SharedWriter,
        store: SettingsStore,
        changes: Receiver<SettingChange>,
        interval: Duration,
        verbose: bool,
    ) -> Self {
        Self {
            flag,
            writer,
            store,
            changes,
            interval,
            verbose,
        }
    }

    pub fn run(self) {
        while self.flag.is_running() {
            match self.changes.recv_timeout(self.interval) {
                Ok(change) => {
                    if let Err(e) = self.apply(&change) {
                        error!("Failed to forward settings change {:?}: {}", change, e);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.flag.sleep(self.interval);
                }
            }
        }
        debug!("Stopped updateSettings");
    }

    fn apply(&self, change: &SettingChange) -> Result<()> {
        self.store.apply(change);
        info!("Applied settings change: {:?}", change);

        if change.targets_water_node() {
            let wire = change.to_wire()?;
            let sent = self
                .writer
                .send(data_type::SETTINGS, &wire, NO_METADATA, 1)?;
            if self.verbose {
                debug!("Sending: {}", sent);
            }
        }
        Ok(())
    }
}
