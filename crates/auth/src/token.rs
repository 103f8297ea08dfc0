//! Token kinds and expiry bookkeeping.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// A token is refreshed once it is within this margin of its expiry.
pub const EXPIRY_MARGIN: Duration = Duration::seconds(60);

/// The three independent bearer tokens the client holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// REST API access token from the bootstrap authorization exchange.
    Access,
    /// Bearer for the device hub socket upgrade.
    DeviceHub,
    /// Bearer for the challenge hub socket upgrade.
    ChallengeHub,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [Self::Access, Self::DeviceHub, Self::ChallengeHub];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Access => 0,
            Self::DeviceHub => 1,
            Self::ChallengeHub => 2,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Access => "access",
            Self::DeviceHub => "device-hub",
            Self::ChallengeHub => "challenge-hub",
        })
    }
}

/// An opaque bearer token with its expiry.
///
/// The value lives only in process memory and is deliberately excluded
/// from the `Debug` output so it cannot end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the token can still be used, leaving `margin` of headroom
    /// before the actual expiry.
    pub fn is_usable(&self, margin: Duration) -> bool {
        Utc::now() < self.expires_at - margin
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
