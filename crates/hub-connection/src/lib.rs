//! Persistent hub connections.
//!
//! Each hub gets one [`HubConnection`] that negotiates a socket URL over
//! REST, opens the WebSocket, performs the protocol handshake, issues
//! subscriptions, and keeps the connection alive with keepalive pings
//! and an inactivity watchdog, reconnecting with exponential backoff
//! when it drops.

mod connection;
mod error;
mod negotiate;
mod pumps;
mod session;
mod socket;
mod types;

pub use connection::HubConnection;
pub use error::ConnectionError;
pub use negotiate::{NegotiatedSocket, Negotiator, RestNegotiator};
pub use session::HubSession;
pub use socket::HubSocket;
pub use types::{ConnectionState, HubEvent, HubKind, ReconnectConfig, SubscriptionTarget};
