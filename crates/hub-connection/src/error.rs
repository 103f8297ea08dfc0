//! Errors from the hub connection layer.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use hilolink_protocol::ProtocolError;

/// Anything that can break a connection attempt or a live connection.
///
/// Every variant except auth failures (which travel as
/// [`hilolink_auth::AuthError`]) is retried by the reconnect loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("negotiate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("negotiate response missing field `{0}`")]
    NegotiateMissing(&'static str),

    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("bearer token is not a valid header value")]
    InvalidAuthHeader,

    #[error("hub rejected handshake: {0}")]
    HandshakeRejected(String),

    #[error("handshake did not complete")]
    HandshakeIncomplete,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("connection closed")]
    Closed,
}
