//! Test utilities for Ground Node integration tests.
//!
//! Provides a fast-timing config on ephemeral ports and a scripted Water Node
//! peer.

#![allow(dead_code)]

use ground_node::protocol::{FrameReader, Message, encode_fields};
use ground_node::{GroundConfig, RunningNode};
use std::io::Write;
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// How long a test waits for anything before giving up.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Config with ephemeral ports and short waits.
pub fn fast_config() -> GroundConfig {
    let mut config = GroundConfig::default();
    config.network.sensor_port = 0;
    config.network.control_port = 0;
    config.network.read_timeout_ms = 20;
    config.network.write_timeout_ms = 100;
    config.timing.bind_retry_delay_secs = 0.05;
    config.timing.controller_poll_secs = 0.05;
    config.timing.settings_interval_secs = 0.05;
    config.timing.closing_grace_secs = 0.05;
    config.timing.video_join_timeout_secs = 1.0;
    config.timing.input_poll_ms = 10;
    config.logging.verbose = true;
    config
}

/// A connected Water Node peer.
pub struct Peer {
    stream: TcpStream,
    reader: FrameReader<TcpStream>,
}

impl Peer {
    pub fn connect_sensor(node: &RunningNode) -> Self {
        let addr = node.sensor_addr(DEADLINE).expect("sensor channel listening");
        Self::connect(addr)
    }

    pub fn connect_control(node: &RunningNode) -> Self {
        let addr = node.control_addr(DEADLINE).expect("control channel listening");
        Self::connect(addr)
    }

    fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to node");
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let reader = FrameReader::new(stream.try_clone().unwrap());
        Self { stream, reader }
    }

    /// Send one frame.
    pub fn send(&mut self, data_type: &str, data: &str) {
        let frame = encode_fields(data_type, data, "None").unwrap();
        self.stream.write_all(&frame).unwrap();
    }

    /// Send raw bytes.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    /// Next message, or `None` if nothing arrives before the deadline or the
    /// node closes the connection.
    pub fn recv(&mut self) -> Option<Message> {
        let start = Instant::now();
        while start.elapsed() < DEADLINE {
            match self.reader.read_frame() {
                Ok(Some(body)) => return Some(Message::parse(&body).expect("valid frame")),
                Ok(None) => {}
                Err(_) => return None,
            }
        }
        None
    }

    /// Next message with the given `dataType`, skipping others.
    pub fn recv_type(&mut self, data_type: &str) -> Option<Message> {
        while let Some(msg) = self.recv() {
            if msg.data_type == data_type {
                return Some(msg);
            }
        }
        None
    }

    /// Drain messages until the node closes the connection.
    pub fn recv_until_closed(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(msg) = self.recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Wait for `condition`, polling.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}
