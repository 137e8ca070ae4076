//! Command dispatch loop
//!
//! ```text
//! Binding ─▶ Listening ─▶ Connected ─▶ AwaitingInput ─▶ Sending ─▶ Stopping ─▶ Stopped
//!                             │             │  ▲            │
//!                             │             └──┘ no pad,    ├─ event     ─▶ motorSpds
//!                             │             wait & re-poll  └─ stop code ─▶ connInfo "closing" ×N,
//!                             └─ spawns SettingsSync                         grace, stop_all()
//! ```
//!
//! No batching or rate limiting: one `motorSpds` frame per input event.
//! Teardown joins the settings-sync thread before the loop reports stopped.

use super::settings_sync::SettingsSync;
use super::{ChannelSpec, notify_listening};
use crate::channel::{ChannelServer, SharedWriter};
use crate::config::ControlConfig;
use crate::error::{Error, Result};
use crate::input::{ControllerProvider, Gamepad, ThrustMixer};
use crate::protocol::message::{CLOSING, NO_METADATA, data_type, format_thrust};
use crate::run_state::{LoopName, RunFlag};
use crate::settings::{SettingChange, SettingsStore};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Binding,
    Listening,
    Connected,
    AwaitingInput,
    Sending,
    Stopping,
    Stopped,
}

/// Fixed waits of the dispatch loop and its sub-loop
#[derive(Debug, Clone)]
pub struct DispatchTiming {
    /// Wait between controller-presence polls
    pub controller_poll: Duration,
    /// Timeout of one input read
    pub input_poll: Duration,
    /// Pause after the closing notice before global shutdown
    pub closing_grace: Duration,
    /// Settings-sync tick
    pub settings_interval: Duration,
}

/// What the loop sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// `motorSpds` frames sent
    pub motor_frames: u64,
    /// `connInfo` "closing" frames sent
    pub closing_frames: u64,
}

/// Sends motor commands to the Water Node
pub struct CommandDispatch {
    spec: ChannelSpec,
    flag: RunFlag,
    timing: DispatchTiming,
    control: ControlConfig,
    provider: Box<dyn ControllerProvider>,
    mixer: Box<dyn ThrustMixer>,
    settings: SettingsStore,
    changes: Option<Receiver<SettingChange>>,
    verbose: bool,
    state: DispatchState,
    stats: DispatchStats,
    listening: Option<Sender<SocketAddr>>,
}

impl CommandDispatch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: ChannelSpec,
        flag: RunFlag,
        timing: DispatchTiming,
        control: ControlConfig,
        provider: Box<dyn ControllerProvider>,
        mixer: Box<dyn ThrustMixer>,
        settings: SettingsStore,
        changes: Receiver<SettingChange>,
        verbose: bool,
    ) -> Self {
        Self {
            spec,
            flag,
            timing,
            control,
            provider,
            mixer,
            settings,
            changes: Some(changes),
            verbose,
            state: DispatchState::Binding,
            stats: DispatchStats::default(),
            listening: None,
        }
    }

    /// Send the bound address on `tx` once listening
    pub fn notify_listening(mut self, tx: Sender<SocketAddr>) -> Self {
        self.listening = Some(tx);
        self
    }

    fn transition(&mut self, next: DispatchState) {
        debug!("{} dispatch: {:?} -> {:?}", self.spec.name, self.state, next);
        self.state = next;
    }

    /// Run to completion and return what was sent
    pub fn run(mut self) -> DispatchStats {
        if let Err(e) = self.serve() {
            error!(
                "Send exception occurred on {} channel (port {}): {}",
                self.spec.name, self.spec.port, e
            );
        }
        self.transition(DispatchState::Stopped);
        debug!("Stopped sendData");
        self.stats
    }

    fn serve(&mut self) -> Result<()> {
        let server = ChannelServer::open(
            self.spec.name,
            &self.spec.host,
            self.spec.port,
            self.spec.retry_delay,
        )?;
        notify_listening(self.listening.as_ref(), server.local_addr());
        self.transition(DispatchState::Listening);

        let Some(conn) = server.accept_once(&self.flag, self.spec.timeouts)? else {
            return Ok(());
        };
        self.transition(DispatchState::Connected);

        let writer = conn.writer()?;
        let sync = self.spawn_settings_sync(writer.clone())?;

        let result = self.dispatch(&writer);

        self.transition(DispatchState::Stopping);
        // The sub-loop shares this connection, so it stops with this loop.
        self.flag.state().stop(LoopName::UpdateSettings);
        if sync.join().is_err() {
            error!("Settings sync thread panicked");
        }
        conn.close();
        result
    }

    fn spawn_settings_sync(&mut self, writer: SharedWriter) -> Result<JoinHandle<()>> {
        let changes = self
            .changes
            .take()
            .ok_or_else(|| Error::Other("settings channel already consumed".into()))?;
        let sync = SettingsSync::new(
            self.flag.state().flag(LoopName::UpdateSettings),
            writer,
            self.settings.clone(),
            changes,
            self.timing.settings_interval,
            self.verbose,
        );
        thread::Builder::new()
            .name("update-settings".to_string())
            .spawn(move || sync.run())
            .map_err(|source| Error::ThreadSpawn {
                name: "update-settings",
                source,
            })
    }

    /// Poll for a controller until one appears or the loop is stopped
    fn await_controller(&mut self) -> Option<Box<dyn Gamepad>> {
        self.transition(DispatchState::AwaitingInput);
        loop {
            if !self.flag.is_running() {
                return None;
            }
            if let Some(pad) = self.provider.identify() {
                info!("Controller connected: {}", pad.name());
                return Some(pad);
            }
            warn!(
                "No controller found, retrying in {:?}",
                self.timing.controller_poll
            );
            self.flag.sleep(self.timing.controller_poll);
        }
    }

    fn dispatch(&mut self, writer: &SharedWriter) -> Result<()> {
        let Some(mut gamepad) = self.await_controller() else {
            return Ok(());
        };
        self.transition(DispatchState::Sending);

        while self.flag.is_running() {
            let Some(event) = gamepad.read_event(self.timing.input_poll)? else {
                continue;
            };

            if event.is_stop(self.control.stop_code) {
                let reps = self.control.closing_repetitions;
                let sent = writer.send(data_type::CONN_INFO, CLOSING, NO_METADATA, reps)?;
                self.stats.closing_frames += reps as u64;
                debug!("{}", sent);
                info!("Stop input received, closing connection");

                thread::sleep(self.timing.closing_grace);
                self.flag.state().stop_all();
                break;
            }

            self.mixer.process_event(&event);
            let speeds = self.mixer.thrust(&self.settings.snapshot());
            let sent = writer.send(
                data_type::MOTOR_SPEEDS,
                &format_thrust(&speeds),
                NO_METADATA,
                1,
            )?;
            self.stats.motor_frames += 1;
            if self.verbose {
                debug!("Sending: {}", sent);
            }
        }
        Ok(())
    }
}
