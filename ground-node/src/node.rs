//! Ground Node orchestration
//!
//! Starts the video, telemetry and dispatch threads from one place and runs
//! the shutdown ordering:
//!
//! 1. join telemetry ingest
//! 2. join command dispatch (which has joined settings-sync)
//! 3. give the video relay a bounded grace period, then detach it
//!
//! Loop failures never reach the orchestrator as errors; it only observes
//! thread completion.

use crate::config::GroundConfig;
use crate::error::{Error, Result};
use crate::input::{ControllerProvider, ThrustMixer};
use crate::loops::{
    ChannelSpec, CommandDispatch, DispatchStats, DispatchTiming, TelemetryIngest, TelemetryStats,
    VideoRelay,
};
use crate::run_state::{LoopName, RunState};
use crate::settings::{SettingChange, SettingsStore};
use crate::video::VideoSource;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// External collaborators plugged into the node
pub struct Collaborators {
    pub controllers: Box<dyn ControllerProvider>,
    pub mixer: Box<dyn ThrustMixer>,
    pub video: Box<dyn VideoSource>,
}

/// Sender for settings changes, consumed by the settings-sync loop
#[derive(Clone)]
pub struct SettingsHandle {
    tx: Sender<SettingChange>,
}

impl SettingsHandle {
    /// Queue a change; returns false once the node has shut down
    pub fn submit(&self, change: SettingChange) -> bool {
        self.tx.send(change).is_ok()
    }
}

/// A configured node that has not started yet
pub struct GroundNode {
    config: GroundConfig,
    run_state: Arc<RunState>,
    settings: SettingsStore,
    changes_tx: Sender<SettingChange>,
    changes_rx: Receiver<SettingChange>,
}

impl GroundNode {
    pub fn new(config: GroundConfig) -> Self {
        let settings = SettingsStore::new(config.settings.clone());
        let (changes_tx, changes_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            run_state: RunState::new(),
            settings,
            changes_tx,
            changes_rx,
        }
    }

    /// Shared run-state, for installing shutdown triggers
    pub fn run_state(&self) -> Arc<RunState> {
        Arc::clone(&self.run_state)
    }

    pub fn settings(&self) -> SettingsStore {
        self.settings.clone()
    }

    pub fn settings_handle(&self) -> SettingsHandle {
        SettingsHandle {
            tx: self.changes_tx.clone(),
        }
    }

    /// Spawn every loop
    pub fn start(self, collaborators: Collaborators) -> Result<RunningNode> {
        let config = &self.config;
        let verbose = config.logging.verbose;

        info!("Starting Ground Node");

        let (video_done_tx, video_done_rx) = crossbeam_channel::bounded(1);
        let relay = VideoRelay::new(
            self.run_state.flag(LoopName::StreamVideo),
            collaborators.video,
            verbose,
        );
        let video = spawn("stream-video", move || {
            let frames = relay.run();
            // Receiver may already be gone after the grace period
            let _ = video_done_tx.send(frames);
        })?;

        let (sensor_tx, sensor_addr) = crossbeam_channel::bounded(1);
        let ingest = TelemetryIngest::new(
            ChannelSpec::sensor(config),
            self.run_state.flag(LoopName::ReceiveData),
            verbose,
        )
        .notify_listening(sensor_tx);
        let telemetry = spawn("receive-data", move || ingest.run())?;

        let (control_tx, control_addr) = crossbeam_channel::bounded(1);
        let timing = DispatchTiming {
            controller_poll: config.timing.controller_poll(),
            input_poll: config.timing.input_poll(),
            closing_grace: config.timing.closing_grace(),
            settings_interval: config.timing.settings_interval(),
        };
        let dispatch = CommandDispatch::new(
            ChannelSpec::control(config),
            self.run_state.flag(LoopName::SendData),
            timing,
            config.control.clone(),
            collaborators.controllers,
            collaborators.mixer,
            self.settings.clone(),
            self.changes_rx,
            verbose,
        )
        .notify_listening(control_tx);
        let dispatch = spawn("send-data", move || dispatch.run())?;

        debug!("Started all threads");

        Ok(RunningNode {
            run_state: self.run_state,
            telemetry,
            dispatch,
            video,
            video_done: video_done_rx,
            video_join_timeout: config.timing.video_join_timeout(),
            sensor_addr,
            control_addr,
        })
    }
}

fn spawn<T, F>(name: &'static str, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| Error::ThreadSpawn { name, source })
}

/// Outcome of a finished node; `None` where a thread panicked or was detached
#[derive(Debug, Default)]
pub struct NodeReport {
    pub telemetry: Option<TelemetryStats>,
    pub dispatch: Option<DispatchStats>,
    pub video_frames: Option<u64>,
}

/// Handles to the running loops
pub struct RunningNode {
    run_state: Arc<RunState>,
    telemetry: JoinHandle<TelemetryStats>,
    dispatch: JoinHandle<DispatchStats>,
    video: JoinHandle<()>,
    video_done: Receiver<u64>,
    video_join_timeout: Duration,
    sensor_addr: Receiver<SocketAddr>,
    control_addr: Receiver<SocketAddr>,
}

impl RunningNode {
    pub fn run_state(&self) -> Arc<RunState> {
        Arc::clone(&self.run_state)
    }

    /// Bound sensor address, once the telemetry loop is listening
    pub fn sensor_addr(&self, timeout: Duration) -> Option<SocketAddr> {
        self.sensor_addr.recv_timeout(timeout).ok()
    }

    /// Bound control address, once the dispatch loop is listening
    pub fn control_addr(&self, timeout: Duration) -> Option<SocketAddr> {
        self.control_addr.recv_timeout(timeout).ok()
    }

    /// Block until the loops stop, in shutdown order
    pub fn wait(self) -> NodeReport {
        let mut report = NodeReport::default();

        match self.telemetry.join() {
            Ok(stats) => report.telemetry = Some(stats),
            Err(_) => error!("Telemetry thread panicked"),
        }
        match self.dispatch.join() {
            Ok(stats) => report.dispatch = Some(stats),
            Err(_) => error!("Dispatch thread panicked"),
        }

        match self.video_done.recv_timeout(self.video_join_timeout) {
            Ok(frames) => {
                report.video_frames = Some(frames);
                if self.video.join().is_err() {
                    error!("Video thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => warn!(
                "Video stream did not stop within {:?}, detaching",
                self.video_join_timeout
            ),
            Err(RecvTimeoutError::Disconnected) => error!("Video thread panicked"),
        }

        debug!("Stopped all threads");
        info!("Shutting down Ground Node");
        report
    }
}
