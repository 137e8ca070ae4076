//! Framed message protocol for the control and sensor channels

pub mod codec;
pub mod message;

pub use codec::{FrameReader, decode, encode, encode_fields, send_message};
pub use message::{CLOSING, Message, NO_METADATA, data_type, format_thrust, now_secs};
