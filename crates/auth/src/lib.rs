//! Bearer token lifecycle for the Hilo cloud.
//!
//! Three tokens with independent expiries authorize the REST API and the
//! two hub connections. [`TokenManager`] caches them, refreshes inside a
//! safety margin, and collapses concurrent refreshes into one.

mod manager;
mod token;

pub use manager::{AuthError, TokenManager, TokenSource};
pub use token::{EXPIRY_MARGIN, Token, TokenKind};
