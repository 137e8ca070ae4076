//! Single-peer TCP channel server
//!
//! Each channel is a one-shot rendezvous with the Water Node:
//!
//! ```text
//! open() ──bind──▶ [fail] ──sleep(retry_delay)──▶ bind ──▶ [fail] ──▶ Error::Bind
//!    │                                               │
//!    └────────────────────── ok ─────────────────────┘
//!                              │
//!                      accept_once() ── first peer ──▶ Connection
//!                              │         (listener dropped, later peers refused)
//!                              └── run flag cleared ──▶ None
//! ```
//!
//! The accept is polled in non-blocking mode so a shutdown request during the
//! wait for a peer is observed. Accepted streams are switched back to
//! blocking mode with read and write timeouts, so neither a silent peer nor
//! one that stops reading can pin a loop past a stop request.

use crate::error::{Error, Result};
use crate::protocol::codec::{FrameReader, send_message};
use crate::run_state::RunFlag;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sleep between non-blocking accept attempts
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Per-connection socket timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTimeouts {
    /// Bounds how long a read waits before the loop re-checks its flag
    pub read: Duration,
    /// Bounds how long a frame write may block on a peer that is not reading
    pub write: Duration,
}

/// A bound listening endpoint waiting for its single peer
pub struct ChannelServer {
    name: &'static str,
    listener: TcpListener,
    local_addr: SocketAddr,
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Other(format!("No address for {}:{}", host, port)))
}

impl ChannelServer {
    /// Bind `host:port`, retrying once after `retry_delay`
    ///
    /// A failure on the retry is fatal for the channel.
    pub fn open(name: &'static str, host: &str, port: u16, retry_delay: Duration) -> Result<Self> {
        let addr = resolve(host, port)?;

        let listener = match TcpListener::bind(addr) {
            Ok(listener) => listener,
            Err(e) => {
                info!("Port {} is already in use ({})", port, e);
                thread::sleep(retry_delay);
                TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?
            }
        };

        let local_addr = listener.local_addr()?;
        debug!("{} channel bound to {}", name, local_addr);

        Ok(Self {
            name,
            listener,
            local_addr,
        })
    }

    /// Address actually bound (useful when port 0 was requested)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Channel name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for exactly one peer
    ///
    /// Returns `None` if `flag` is cleared before a peer connects. The
    /// listener is closed on return either way.
    pub fn accept_once(self, flag: &RunFlag, timeouts: SocketTimeouts) -> Result<Option<Connection>> {
        self.listener.set_nonblocking(true)?;

        while flag.is_running() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("{} socket connected by {}", self.name, peer);
                    return Connection::new(stream, peer, timeouts).map(Some);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        debug!("{} channel stopped before a peer connected", self.name);
        Ok(None)
    }
}

/// The accepted peer connection of a channel
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, timeouts: SocketTimeouts) -> Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(timeouts.read))?;
        stream.set_write_timeout(Some(timeouts.write))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }
        Ok(Self { stream, peer })
    }

    /// Buffered frame reader over a clone of the stream
    pub fn frame_reader(&self) -> Result<FrameReader<TcpStream>> {
        Ok(FrameReader::new(self.stream.try_clone()?))
    }

    /// Writer that can be shared between threads
    pub fn writer(&self) -> Result<SharedWriter> {
        Ok(SharedWriter {
            stream: Arc::new(Mutex::new(self.stream.try_clone()?)),
        })
    }

    /// Shut the socket down in both directions
    pub fn close(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both)
            && e.kind() != ErrorKind::NotConnected
        {
            debug!("Shutdown of connection to {} failed: {}", self.peer, e);
        }
    }
}

/// Frame writer shared by the loops writing to one connection
///
/// The lock is held for a whole `send`, so frames from different threads
/// never interleave.
#[derive(Clone)]
pub struct SharedWriter {
    stream: Arc<Mutex<TcpStream>>,
}

impl SharedWriter {
    /// Encode and send one message `repetitions` times
    ///
    /// A write that exceeds the socket write timeout is reported as
    /// [`Error::WriteTimeout`]; part of a frame may already be on the wire,
    /// so the connection is unusable afterwards.
    pub fn send(
        &self,
        data_type: &str,
        data: &str,
        metadata: &str,
        repetitions: usize,
    ) -> Result<String> {
        let mut stream = self.stream.lock();
        send_message(&mut *stream, data_type, data, metadata, repetitions).map_err(|e| match e {
            Error::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Error::WriteTimeout
            }
            other => other,
        })
    }
}
