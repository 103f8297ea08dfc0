//! Frame encoding and separator-delimited stream decoding.

use serde_json::{Value, json};
use thiserror::Error;

use crate::constants::{MAX_FRAME_BYTES, MessageKind, PROTOCOL_NAME, PROTOCOL_VERSION,
    RECORD_SEPARATOR};

/// Errors raised while decoding the frame stream.
///
/// A `ProtocolError` drops the offending frame; the connection itself is
/// only torn down after several consecutive failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON in frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown frame type {0}")]
    UnknownType(u64),

    #[error("unterminated frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },
}

/// First frame sent by the client after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_owned(),
            version: PROTOCOL_VERSION,
        }
    }
}

/// Server reply to the handshake request.
///
/// An empty JSON object means success; a non-empty `error` fails the
/// connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeResponse {
    pub error: Option<String>,
}

/// A named remote call, used both for subscriptions (client → hub) and
/// pushed updates (hub → client). Pushed invocations usually carry no id.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: String,
    pub arguments: Vec<Value>,
    pub invocation_id: Option<String>,
}

/// Terminal reply to an invocation the client issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub invocation_id: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    Invocation(Invocation),
    Completion(Completion),
    Ping,
    Close { error: Option<String> },
}

impl Frame {
    /// Encodes the frame as one JSON object plus the record separator.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            Self::HandshakeRequest(h) => json!({
                "protocol": h.protocol,
                "version": h.version,
            }),
            Self::HandshakeResponse(h) => match &h.error {
                Some(e) => json!({ "error": e }),
                None => json!({}),
            },
            Self::Invocation(inv) => {
                let mut obj = json!({
                    "type": MessageKind::Invocation.code(),
                    "target": inv.target,
                    "arguments": inv.arguments,
                });
                if let Some(id) = &inv.invocation_id
                    && let Some(map) = obj.as_object_mut()
                {
                    map.insert("invocationId".into(), Value::String(id.clone()));
                }
                obj
            }
            Self::Completion(c) => {
                let mut obj = json!({
                    "type": MessageKind::Completion.code(),
                    "invocationId": c.invocation_id,
                });
                if let Some(map) = obj.as_object_mut() {
                    if let Some(result) = &c.result {
                        map.insert("result".into(), result.clone());
                    }
                    if let Some(error) = &c.error {
                        map.insert("error".into(), Value::String(error.clone()));
                    }
                }
                obj
            }
            Self::Ping => json!({ "type": MessageKind::Ping.code() }),
            Self::Close { error } => match error {
                Some(e) => json!({ "type": MessageKind::Close.code(), "error": e }),
                None => json!({ "type": MessageKind::Close.code() }),
            },
        };

        let mut bytes = value.to_string().into_bytes();
        bytes.push(RECORD_SEPARATOR);
        bytes
    }

    /// Decodes one frame from the JSON bytes between separators.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        let Some(code) = obj.get("type").and_then(Value::as_u64) else {
            // Frames without a `type` are the handshake exchange. An empty
            // object (or bare `error`) is the server's handshake response.
            if obj.contains_key("protocol") {
                return Ok(Self::HandshakeRequest(HandshakeRequest {
                    protocol: obj
                        .get("protocol")
                        .and_then(Value::as_str)
                        .unwrap_or(PROTOCOL_NAME)
                        .to_owned(),
                    version: obj
                        .get("version")
                        .and_then(Value::as_u64)
                        .unwrap_or(u64::from(PROTOCOL_VERSION)) as u32,
                }));
            }
            return Ok(Self::HandshakeResponse(HandshakeResponse {
                error: obj.get("error").and_then(Value::as_str).map(str::to_owned),
            }));
        };

        match MessageKind::from_code(code) {
            Some(MessageKind::Invocation) => Ok(Self::Invocation(Invocation {
                target: obj
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingField("target"))?
                    .to_owned(),
                arguments: obj
                    .get("arguments")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                invocation_id: obj
                    .get("invocationId")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            })),
            Some(MessageKind::Completion) => Ok(Self::Completion(Completion {
                invocation_id: obj
                    .get("invocationId")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::MissingField("invocationId"))?
                    .to_owned(),
                result: obj.get("result").cloned(),
                error: obj.get("error").and_then(Value::as_str).map(str::to_owned),
            })),
            Some(MessageKind::Ping) => Ok(Self::Ping),
            Some(MessageKind::Close) => Ok(Self::Close {
                error: obj.get("error").and_then(Value::as_str).map(str::to_owned),
            }),
            // Stream frames are valid SignalR but unused by this protocol.
            Some(_) | None => Err(ProtocolError::UnknownType(code)),
        }
    }
}

/// Reassembles frames from a byte stream split at arbitrary boundaries.
///
/// Socket reads may deliver a partial frame or several frames stacked in
/// one message; the decoder buffers bytes and yields one frame per record
/// separator. The buffer is bounded: an unterminated stream larger than
/// the limit is a [`ProtocolError::FrameTooLarge`].
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    limit: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Appends freshly read bytes to the reassembly buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Yields the next complete frame, if one is buffered.
    ///
    /// A decode failure consumes the offending chunk, so subsequent frames
    /// in the buffer remain reachable.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == RECORD_SEPARATOR) else {
                if self.buf.len() > self.limit {
                    self.buf.clear();
                    return Err(ProtocolError::FrameTooLarge { limit: self.limit });
                }
                return Ok(None);
            };

            let chunk: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            if chunk.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Frame::decode(&chunk).map(Some);
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
