//! Socket pump tasks: read, write, keepalive.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;

use tokio_tungstenite::tungstenite;

use hilolink_protocol::Frame;

/// Encodes a protocol frame as a WebSocket text message.
pub(crate) fn frame_message(frame: &Frame) -> tungstenite::Message {
    let text = String::from_utf8_lossy(&frame.encode()).into_owned();
    tungstenite::Message::Text(text.into())
}
