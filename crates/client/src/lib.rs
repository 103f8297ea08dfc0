//! High-level Hilo client.
//!
//! Ties the crates together: the token manager feeds both hub
//! connections, their pushed invocations are routed into the device and
//! challenge-event registries, and consumers observe state through
//! registry subscriptions or the forwarded event stream.

mod client;
mod config;

pub use client::Client;
pub use config::{ClientConfig, ReconnectSettings};

pub use hilolink_auth::{AuthError, Token, TokenKind, TokenManager, TokenSource};
pub use hilolink_hub_connection::{ConnectionState, HubEvent, HubKind, ReconnectConfig};
pub use hilolink_registry::{
    Attribute, AttributeValue, ChallengeEvent, Device, DeviceRegistry, EventKey, EventRegistry,
};
