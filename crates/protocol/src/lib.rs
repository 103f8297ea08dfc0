//! Wire protocol for the Hilo real-time hubs.
//!
//! Both hubs (DeviceHub, ChallengeHub) speak the SignalR JSON hub protocol:
//! every frame is a single JSON object terminated by the ASCII record
//! separator (0x1E), in both directions.

pub mod constants;
pub mod frame;
pub mod targets;

pub use constants::{MessageKind, PROTOCOL_NAME, PROTOCOL_VERSION, RECORD_SEPARATOR};
pub use frame::{
    Completion, Frame, FrameDecoder, HandshakeRequest, HandshakeResponse, Invocation,
    ProtocolError,
};
