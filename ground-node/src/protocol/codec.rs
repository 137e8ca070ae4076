//! Delimiter-based frame codec
//!
//! # Wire Format
//!
//! Every message on the control and sensor channels is one frame:
//!
//! ```text
//! ┌─────┬──────────────────────────────────────────────────────────────┬─────┐
//! │ '<' │ {"dataType":"..","data":"..","timestamp":<f64>,"metadata":".."} │ '>' │
//! └─────┴──────────────────────────────────────────────────────────────┴─────┘
//! ```
//!
//! - Bytes before the first `<` are discarded.
//! - The body is everything up to the next `>`, both delimiters excluded.
//! - The timestamp is taken when the frame is encoded.
//! - Maximum body size: [`MAX_FRAME_SIZE`].
//!
//! # Limitation
//!
//! There is no escaping. A field containing `<` or `>` would corrupt the
//! framing, so [`encode`] refuses such messages with
//! [`Error::DelimiterInPayload`]. Motor vectors and short tags never contain
//! them.

use crate::error::{Error, Result};
use crate::protocol::message::{Message, now_secs};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

/// Frame start delimiter
pub const START_MARKER: u8 = b'<';

/// Frame end delimiter
pub const END_MARKER: u8 = b'>';

/// Largest accepted frame body (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Read chunk size for [`FrameReader`]
const READ_CHUNK: usize = 4096;

/// Pause before retrying a read that reported `WouldBlock`
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Serialized view of a message, stamped at encode time
#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "dataType")]
    data_type: &'a str,
    data: &'a str,
    timestamp: f64,
    metadata: &'a str,
}

fn check_field(field: &'static str, value: &str) -> Result<()> {
    if value.bytes().any(|b| b == START_MARKER || b == END_MARKER) {
        return Err(Error::DelimiterInPayload { field });
    }
    Ok(())
}

/// Encode fields into a frame, stamping it with the current time
pub fn encode_fields(data_type: &str, data: &str, metadata: &str) -> Result<Vec<u8>> {
    check_field("dataType", data_type)?;
    check_field("data", data)?;
    check_field("metadata", metadata)?;

    let wire = WireMessage {
        data_type,
        data,
        timestamp: now_secs(),
        metadata,
    };

    let mut frame = Vec::with_capacity(data.len() + 96);
    frame.push(START_MARKER);
    serde_json::to_writer(&mut frame, &wire)?;
    frame.push(END_MARKER);
    Ok(frame)
}

/// Encode a message into a frame
///
/// The message's own timestamp is replaced by the encode time, so every
/// frame carries its send time.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    encode_fields(&message.data_type, &message.data, &message.metadata)
}

/// Encode and write a frame `repetitions` times
///
/// Each repetition is encoded separately and carries its own timestamp.
/// Returns the text of the last frame written, for logging.
pub fn send_message<W: Write>(
    writer: &mut W,
    data_type: &str,
    data: &str,
    metadata: &str,
    repetitions: usize,
) -> Result<String> {
    let mut last = Vec::new();
    for _ in 0..repetitions {
        last = encode_fields(data_type, data, metadata)?;
        writer.write_all(&last)?;
    }
    writer.flush()?;
    Ok(String::from_utf8_lossy(&last).into_owned())
}

/// Byte-wise frame scanner shared by [`decode`] and [`FrameReader`]
#[derive(Debug, Default)]
pub struct FrameScanner {
    in_progress: bool,
    body: Vec<u8>,
}

impl FrameScanner {
    /// Create an idle scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a start delimiter has been seen without its end delimiter
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Feed one byte; returns the body once the end delimiter arrives
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        if !self.in_progress {
            if byte == START_MARKER {
                self.in_progress = true;
            }
            return Ok(None);
        }

        if byte == END_MARKER {
            self.in_progress = false;
            return Ok(Some(std::mem::take(&mut self.body)));
        }

        if self.body.len() >= MAX_FRAME_SIZE {
            let len = self.body.len();
            self.reset();
            return Err(Error::FrameTooLarge(len + 1));
        }
        self.body.push(byte);
        Ok(None)
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.in_progress = false;
        self.body.clear();
    }
}

fn body_to_text(body: Vec<u8>) -> Result<String> {
    String::from_utf8(body).map_err(|e| Error::InvalidFrame(format!("body is not UTF-8: {}", e)))
}

/// Read exactly one frame from `conn`, one byte at a time
///
/// Blocks until a complete frame has arrived and consumes nothing past its
/// end delimiter, so back-to-back frames are returned one per call. Works on
/// blocking, timed and non-blocking streams: read timeouts are waited
/// through, and a non-blocking stream is re-polled after a short back-off.
/// Returns [`Error::Disconnected`] when the peer closes the stream.
pub fn decode<R: Read + ?Sized>(conn: &mut R) -> Result<String> {
    let mut scanner = FrameScanner::new();
    let mut byte = [0u8; 1];
    loop {
        match conn.read(&mut byte) {
            Ok(0) => return Err(Error::Disconnected),
            Ok(_) => {
                if let Some(body) = scanner.push(byte[0])? {
                    return body_to_text(body);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                thread::sleep(WOULD_BLOCK_BACKOFF);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Buffered frame reader for loops that must re-poll a run flag
///
/// Reads in chunks and keeps both the partial frame and any bytes past the
/// last returned frame, so a read timeout never loses data.
pub struct FrameReader<R> {
    reader: R,
    scanner: FrameScanner,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scanner: FrameScanner::new(),
            buf: vec![0; READ_CHUNK],
            pos: 0,
            len: 0,
        }
    }

    /// Read the next frame body
    ///
    /// - `Ok(Some(body))`: a complete frame
    /// - `Ok(None)`: the read timed out before a frame completed
    /// - `Err(Disconnected)`: the peer closed the stream
    pub fn read_frame(&mut self) -> Result<Option<String>> {
        loop {
            while self.pos < self.len {
                let byte = self.buf[self.pos];
                self.pos += 1;
                if let Some(body) = self.scanner.push(byte)? {
                    return body_to_text(body).map(Some);
                }
            }

            match self.reader.read(&mut self.buf) {
                Ok(0) => return Err(Error::Disconnected),
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Whether a partial frame is buffered
    pub fn has_partial_frame(&self) -> bool {
        self.scanner.in_progress()
    }
}
