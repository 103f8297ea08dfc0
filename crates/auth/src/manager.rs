//! Token caching with single-flight refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::token::{EXPIRY_MARGIN, Token, TokenKind};

/// Errors from the token layer.
///
/// The manager does not retry internally; callers decide retry policy.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("refresh of {kind} token failed: {reason}")]
    RefreshFailed { kind: TokenKind, reason: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// The external exchange that produces a fresh token of a given kind.
///
/// The bootstrap credential flow behind it is an external collaborator;
/// implementations only promise to return a token with a real expiry.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, kind: TokenKind) -> Result<Token, AuthError>;
}

/// Owns the three bearer tokens and refreshes them before expiry.
///
/// `get` suspends the caller while a refresh is in flight; concurrent
/// callers for the same kind share one refresh instead of issuing
/// duplicates. A generation counter lets `invalidate_all` abandon a
/// half-finished refresh without publishing its result.
pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    margin: Duration,
    tokens: RwLock<HashMap<TokenKind, Token>>,
    refresh_locks: [Mutex<()>; 3],
    generation: AtomicU64,
}

impl TokenManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self::with_margin(source, EXPIRY_MARGIN)
    }

    pub fn with_margin(source: Arc<dyn TokenSource>, margin: Duration) -> Self {
        Self {
            source,
            margin,
            tokens: RwLock::new(HashMap::new()),
            refresh_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            generation: AtomicU64::new(0),
        }
    }

    /// Returns a usable token of the given kind, refreshing it through
    /// the source when it is absent or inside the expiry margin.
    pub async fn get(&self, kind: TokenKind) -> Result<Token, AuthError> {
        if let Some(token) = self.cached(kind).await {
            return Ok(token);
        }

        let _refresh = self.refresh_locks[kind.index()].lock().await;

        // Another caller may have finished the refresh while we waited.
        if let Some(token) = self.cached(kind).await {
            return Ok(token);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        debug!(kind = %kind, "refreshing token");
        let token = self.source.fetch(kind).await?;

        if self.generation.load(Ordering::SeqCst) == generation {
            self.tokens.write().await.insert(kind, token.clone());
        } else {
            warn!(kind = %kind, "token cache invalidated mid-refresh, discarding result");
        }
        Ok(token)
    }

    /// Drops one cached token, forcing a refresh on the next `get`.
    pub async fn invalidate(&self, kind: TokenKind) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().await.remove(&kind);
    }

    /// Drops every cached token and abandons any in-flight refresh result.
    pub async fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().await.clear();
    }

    async fn cached(&self, kind: TokenKind) -> Option<Token> {
        self.tokens
            .read()
            .await
            .get(&kind)
            .filter(|t| t.is_usable(self.margin))
            .cloned()
    }
}
