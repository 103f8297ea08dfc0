//! Protocol constants shared by both hub connections.

use std::time::Duration;

/// Protocol name sent in the handshake request.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake request.
pub const PROTOCOL_VERSION: u32 = 1;

/// Every frame on the wire is one JSON object followed by this byte.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Upper bound on buffered bytes while waiting for a record separator.
///
/// Protects against a malformed or unterminated stream growing the
/// reassembly buffer without bound.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Number of consecutive undecodable frames after which the connection
/// is considered broken and torn down for a reconnect.
pub const MAX_CONSECUTIVE_MALFORMED: u32 = 5;

/// Interval between client-side keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// If no frame at all (pings included) arrives within this window, the
/// connection is considered dead.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// SignalR message type codes carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Invocation,
    StreamItem,
    Completion,
    StreamInvocation,
    CancelInvocation,
    Ping,
    Close,
}

impl MessageKind {
    /// Maps a wire `type` code to a known message kind.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Invocation),
            2 => Some(Self::StreamItem),
            3 => Some(Self::Completion),
            4 => Some(Self::StreamInvocation),
            5 => Some(Self::CancelInvocation),
            6 => Some(Self::Ping),
            7 => Some(Self::Close),
            _ => None,
        }
    }

    /// The wire `type` code for this kind.
    pub fn code(self) -> u64 {
        match self {
            Self::Invocation => 1,
            Self::StreamItem => 2,
            Self::Completion => 3,
            Self::StreamInvocation => 4,
            Self::CancelInvocation => 5,
            Self::Ping => 6,
            Self::Close => 7,
        }
    }
}
