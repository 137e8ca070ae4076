//! Telemetry ingest loop
//!
//! ```text
//! Binding ──open──▶ Listening ──accept──▶ Connected ──flag cleared / socket fault──▶ Stopping ──▶ Stopped
//! ```
//!
//! Malformed frames are counted and skipped; only a connection fault ends the
//! loop early, and it ends only this loop.

use super::{ChannelSpec, notify_listening};
use crate::channel::ChannelServer;
use crate::error::Result;
use crate::protocol::codec::FrameReader;
use crate::protocol::message::{Message, now_secs};
use crate::run_state::RunFlag;
use crossbeam_channel::Sender;
use log::{debug, error, info};
use std::fmt;
use std::io::Read;
use std::net::SocketAddr;

/// Lifecycle of the ingest loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Binding,
    Listening,
    Connected,
    Stopping,
    Stopped,
}

/// Counters and transit latency derived from received frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryStats {
    /// Frames parsed successfully
    pub frames: u64,
    /// Frames discarded as unparseable
    pub malformed: u64,
    /// Latency of the most recent frame (seconds)
    pub last_latency: Option<f64>,
    /// Largest latency seen (seconds)
    pub max_latency: Option<f64>,
    total_latency: f64,
}

impl TelemetryStats {
    fn record(&mut self, latency: f64) {
        self.frames += 1;
        self.total_latency += latency;
        self.last_latency = Some(latency);
        self.max_latency = Some(self.max_latency.map_or(latency, |max| max.max(latency)));
    }

    /// Mean latency over all parsed frames
    pub fn mean_latency(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.total_latency / self.frames as f64)
    }
}

impl fmt::Display for TelemetryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frames={} malformed={}", self.frames, self.malformed)?;
        if let (Some(mean), Some(max)) = (self.mean_latency(), self.max_latency) {
            write!(f, " latency mean={:.4}s max={:.4}s", mean, max)?;
        }
        Ok(())
    }
}

/// Receives sensor frames from the Water Node
pub struct TelemetryIngest {
    spec: ChannelSpec,
    flag: RunFlag,
    verbose: bool,
    state: IngestState,
    stats: TelemetryStats,
    listening: Option<Sender<SocketAddr>>,
}

impl TelemetryIngest {
    pub fn new(spec: ChannelSpec, flag: RunFlag, verbose: bool) -> Self {
        Self {
            spec,
            flag,
            verbose,
            state: IngestState::Binding,
            stats: TelemetryStats::default(),
            listening: None,
        }
    }

    /// Send the bound address on `tx` once listening
    pub fn notify_listening(mut self, tx: Sender<SocketAddr>) -> Self {
        self.listening = Some(tx);
        self
    }

    fn transition(&mut self, next: IngestState) {
        debug!("{} ingest: {:?} -> {:?}", self.spec.name, self.state, next);
        self.state = next;
    }

    /// Run to completion and return the collected stats
    pub fn run(mut self) -> TelemetryStats {
        if let Err(e) = self.serve() {
            error!(
                "Receive exception occurred on {} channel (port {}): {}",
                self.spec.name, self.spec.port, e
            );
        }
        self.transition(IngestState::Stopped);
        info!("{} telemetry: {}", self.spec.name, self.stats);
        debug!("Stopped recvData");
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
        self.transition(IngestState::Listening);

        let Some(conn) = server.accept_once(&self.flag, self.spec.timeouts)? else {
            return Ok(());
        };
        self.transition(IngestState::Connected);

        let mut reader = conn.frame_reader()?;
        let result = self.ingest(&mut reader);

        self.transition(IngestState::Stopping);
        conn.close();
        result
    }

    fn ingest<R: Read>(&mut self, reader: &mut FrameReader<R>) -> Result<()> {
        while self.flag.is_running() {
            match reader.read_frame() {
                Ok(Some(body)) => self.handle_frame(&body),
                Ok(None) => {}
                Err(e) if e.is_connection_fault() => return Err(e),
                Err(e) => {
                    self.stats.malformed += 1;
                    debug!("{}", e);
                }
            }
        }
        Ok(())
    }

    fn handle_frame(&mut self, body: &str) {
        match Message::parse(body) {
            Ok(msg) => {
                let latency = msg.latency_at(now_secs());
                self.stats.record(latency);
                if msg.is_closing() {
                    info!("Water Node announced it is closing the {} channel", self.spec.name);
                }
                if self.verbose {
                    debug!("Raw receive: {}", body);
                    debug!("TtS: {}", latency);
                }
            }
            Err(e) => {
                self.stats.malformed += 1;
                debug!("{}", e);
            }
        }
    }
}
