//! Per-hub run loop: token, negotiate, connect, subscribe, reconnect.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hilolink_auth::{AuthError, TokenManager};

use crate::error::ConnectionError;
use crate::negotiate::Negotiator;
use crate::session::HubSession;
use crate::socket::HubSocket;
use crate::types::{ConnectionState, HubEvent, HubKind, ReconnectConfig, SubscriptionTarget};

/// Seam between the run loop and the actual socket dial, so tests can
/// substitute scripted transports.
#[async_trait]
pub(crate) trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        hub: HubKind,
        ws_url: &str,
        bearer: &str,
        events_tx: mpsc::Sender<HubEvent>,
    ) -> Result<HubSocket, ConnectionError>;
}

struct TlsConnector;

#[async_trait]
impl SocketConnector for TlsConnector {
    async fn connect(
        &self,
        hub: HubKind,
        ws_url: &str,
        bearer: &str,
        events_tx: mpsc::Sender<HubEvent>,
    ) -> Result<HubSocket, ConnectionError> {
        HubSocket::connect(hub, ws_url, bearer, events_tx).await
    }
}

enum ConnectFailure {
    Auth(AuthError),
    Socket(ConnectionError),
}

/// One hub's persistent connection.
///
/// `run` keeps the hub connected until shutdown: each attempt obtains a
/// fresh token, negotiates a socket URL, handshakes, and re-issues every
/// subscription under a fresh session. Failures back off exponentially;
/// a connection that stayed up past the stability threshold resets the
/// backoff. Repeated token refresh failures are fatal.
pub struct HubConnection {
    hub: HubKind,
    tokens: Arc<TokenManager>,
    negotiator: Arc<dyn Negotiator>,
    connector: Arc<dyn SocketConnector>,
    subscriptions: Vec<SubscriptionTarget>,
    config: ReconnectConfig,
    events_tx: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
}

impl HubConnection {
    pub fn new(
        hub: HubKind,
        tokens: Arc<TokenManager>,
        negotiator: Arc<dyn Negotiator>,
        subscriptions: Vec<SubscriptionTarget>,
        config: ReconnectConfig,
        events_tx: mpsc::Sender<HubEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            tokens,
            negotiator,
            connector: Arc::new(TlsConnector),
            subscriptions,
            config,
            events_tx,
            cancel,
        }
    }

    #[cfg(test)]
    fn with_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drives the connection until shutdown or a fatal auth failure.
    pub async fn run(self) {
        let mut attempt: u32 = 0;
        let mut auth_failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if attempt > 0 {
                let delay = self.config.delay_for_attempt(attempt);
                self.emit_state(ConnectionState::Reconnecting { attempt }).await;
                let _ = self
                    .events_tx
                    .send(HubEvent::Reconnecting {
                        hub: self.hub,
                        attempt,
                        next_retry_secs: delay.as_secs_f64(),
                    })
                    .await;
                info!(
                    hub = %self.hub,
                    attempt,
                    delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                    "reconnecting"
                );

                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.connect_once().await {
                Ok(socket) => {
                    auth_failures = 0;
                    self.emit_state(ConnectionState::Connected).await;
                    info!(hub = %self.hub, "connected");

                    let connected_at = tokio::time::Instant::now();
                    let closed = socket.closed();
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            socket.close().await;
                            break;
                        }
                        _ = closed.cancelled() => {}
                    }

                    warn!(hub = %self.hub, "connection lost");
                    self.emit_state(ConnectionState::Disconnected).await;
                    attempt = if connected_at.elapsed() >= self.config.stability_threshold {
                        1
                    } else {
                        attempt.saturating_add(1)
                    };
                }
                Err(ConnectFailure::Auth(e)) => {
                    auth_failures += 1;
                    warn!(hub = %self.hub, auth_failures, "token refresh failed: {e}");
                    self.tokens.invalidate(self.hub.token_kind()).await;
                    if auth_failures >= self.config.auth_retry_limit {
                        let _ = self
                            .events_tx
                            .send(HubEvent::Fatal {
                                hub: self.hub,
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                }
                Err(ConnectFailure::Socket(e)) => {
                    auth_failures = 0;
                    warn!(hub = %self.hub, attempt, "connection attempt failed: {e}");
                    attempt = attempt.saturating_add(1);
                }
            }
        }

        self.emit_state(ConnectionState::Disconnected).await;
        debug!(hub = %self.hub, "run loop exited");
    }

    async fn connect_once(&self) -> Result<HubSocket, ConnectFailure> {
        self.emit_state(ConnectionState::Negotiating).await;
        let token = self
            .tokens
            .get(self.hub.token_kind())
            .await
            .map_err(ConnectFailure::Auth)?;

        let negotiated = match self.negotiator.negotiate(self.hub, &token.value).await {
            Ok(n) => n,
            Err(e) => {
                // A 401 means the hub token went stale server-side.
                if let ConnectionError::Http(ref err) = e
                    && err.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                {
                    debug!(hub = %self.hub, "negotiate unauthorized, invalidating token");
                    self.tokens.invalidate(self.hub.token_kind()).await;
                }
                return Err(ConnectFailure::Socket(e));
            }
        };

        self.emit_state(ConnectionState::HandshakeSent).await;
        let socket = self
            .connector
            .connect(self.hub, &negotiated.ws_url, &token.value, self.events_tx.clone())
            .await
            .map_err(ConnectFailure::Socket)?;

        // Fresh session per establishment; ids restart at 1.
        let mut session = HubSession::new();
        for subscription in &self.subscriptions {
            let id = session.next_invocation_id();
            debug!(
                hub = %self.hub,
                target = subscription.target,
                invocation_id = %id,
                "subscribing"
            );
            let _completion = socket
                .invoke(subscription.target, subscription.arguments(), id)
                .await
                .map_err(ConnectFailure::Socket)?;
        }

        Ok(socket)
    }

    async fn emit_state(&self, state: ConnectionState) {
        let _ = self
            .events_tx
            .send(HubEvent::StateChanged {
                hub: self.hub,
                state,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use chrono::Utc;
    use futures_util::{StreamExt, sink, stream};
    use tokio_tungstenite::tungstenite;

    use hilolink_auth::{Token, TokenKind, TokenSource};
    use hilolink_protocol::{Frame, HandshakeResponse};

    use crate::negotiate::NegotiatedSocket;
    use crate::pumps::frame_message;

    use super::*;

    struct StaticTokens;

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn fetch(&self, kind: TokenKind) -> Result<Token, AuthError> {
            Ok(Token::new(
                format!("{kind}-token"),
                Utc::now() + chrono::Duration::hours(1),
            ))
        }
    }

    struct FailingTokens;

    #[async_trait]
    impl TokenSource for FailingTokens {
        async fn fetch(&self, kind: TokenKind) -> Result<Token, AuthError> {
            Err(AuthError::RefreshFailed {
                kind,
                reason: "credentials rejected".into(),
            })
        }
    }

    struct FakeNegotiator;

    #[async_trait]
    impl Negotiator for FakeNegotiator {
        async fn negotiate(
            &self,
            _hub: HubKind,
            _bearer: &str,
        ) -> Result<NegotiatedSocket, ConnectionError> {
            Ok(NegotiatedSocket {
                ws_url: "wss://hub.test/client?hub=x&id=c1&access_token=t".into(),
                access_token: "t".into(),
            })
        }
    }

    /// Connector whose connections hand the hub a scripted inbound
    /// stream and capture everything the client writes.
    struct ScriptedConnector {
        /// `true` scripts stay open after the handshake, `false` ones end
        /// the stream right away (simulating a dropped socket).
        scripts: StdMutex<Vec<bool>>,
        written: Arc<StdMutex<Vec<mpsc::Receiver<tungstenite::Message>>>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<bool>) -> Self {
            Self {
                scripts: StdMutex::new(scripts),
                written: Arc::new(StdMutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl SocketConnector for ScriptedConnector {
        async fn connect(
            &self,
            hub: HubKind,
            _ws_url: &str,
            _bearer: &str,
            events_tx: mpsc::Sender<HubEvent>,
        ) -> Result<HubSocket, ConnectionError> {
            let hold_open = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    return Err(ConnectionError::Closed);
                }
                scripts.remove(0)
            };

            let (tx, rx) = mpsc::channel::<tungstenite::Message>(64);
            self.written.lock().unwrap().push(rx);
            let sink = Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
                let _ = tx.send(msg).await;
                Ok::<_, tungstenite::Error>(tx)
            }));

            let handshake: Result<tungstenite::Message, tungstenite::Error> =
                Ok(frame_message(&Frame::HandshakeResponse(HandshakeResponse::default())));
            let read: std::pin::Pin<
                Box<
                    dyn futures_util::Stream<
                            Item = Result<tungstenite::Message, tungstenite::Error>,
                        > + Send,
                >,
            > = if hold_open {
                Box::pin(stream::iter(vec![handshake]).chain(stream::pending()))
            } else {
                Box::pin(stream::iter(vec![handshake]))
            };

            HubSocket::establish(hub, sink, read, events_tx).await
        }
    }

    fn connection(
        source: Arc<dyn TokenSource>,
        connector: Arc<dyn SocketConnector>,
        subscriptions: Vec<SubscriptionTarget>,
        events_tx: mpsc::Sender<HubEvent>,
        cancel: CancellationToken,
    ) -> HubConnection {
        let config = ReconnectConfig {
            auth_retry_limit: 3,
            ..ReconnectConfig::default()
        };
        HubConnection::new(
            HubKind::ChallengeHub,
            Arc::new(TokenManager::new(source)),
            Arc::new(FakeNegotiator),
            subscriptions,
            config,
            events_tx,
            cancel,
        )
        .with_connector(connector)
    }

    async fn subscription_frames(rx: &mut mpsc::Receiver<tungstenite::Message>) -> Vec<serde_json::Value> {
        // Skip the handshake request, then collect the two subscriptions.
        let mut frames = Vec::new();
        while frames.len() < 2 {
            let msg = rx.recv().await.unwrap();
            if let tungstenite::Message::Text(text) = msg {
                let value: serde_json::Value =
                    serde_json::from_str(text.as_str().trim_end_matches('\u{1e}')).unwrap();
                if value.get("type").and_then(serde_json::Value::as_u64) == Some(1) {
                    frames.push(value);
                }
            }
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_reissues_subscriptions_with_fresh_ids() {
        let connector = Arc::new(ScriptedConnector::new(vec![false, true]));
        let written = connector.written.clone();
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let subs = vec![
            SubscriptionTarget::event_ch(4242, 7),
            SubscriptionTarget::event_flex(4242, 8),
        ];
        let conn = connection(
            Arc::new(StaticTokens),
            connector,
            subs,
            events_tx,
            cancel.clone(),
        );
        let handle = conn.spawn();

        // Wait until the loop reports Connected for the second time.
        let mut connected = 0;
        while connected < 2 {
            match events_rx.recv().await.unwrap() {
                HubEvent::StateChanged {
                    state: ConnectionState::Connected,
                    ..
                } => connected += 1,
                _ => {}
            }
        }

        let mut receivers = {
            let mut guard = written.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        assert_eq!(receivers.len(), 2);

        let first = subscription_frames(&mut receivers[0]).await;
        assert_eq!(first[0]["target"], "SubscribeToEventCH");
        assert_eq!(first[0]["invocationId"], "1");
        assert_eq!(first[1]["target"], "SubscribeToEventFlex");
        assert_eq!(first[1]["invocationId"], "2");

        // The second connection got a fresh session, so ids restart.
        let second = subscription_frames(&mut receivers[1]).await;
        assert_eq!(second[0]["invocationId"], "1");
        assert_eq!(second[1]["invocationId"], "2");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_auth_failures_are_fatal() {
        let connector = Arc::new(ScriptedConnector::new(vec![]));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let conn = connection(
            Arc::new(FailingTokens),
            connector,
            vec![SubscriptionTarget::location(4242)],
            events_tx,
            cancel,
        );
        conn.run().await;

        let mut saw_fatal = false;
        while let Ok(event) = events_rx.try_recv() {
            if let HubEvent::Fatal { hub, reason } = event {
                assert_eq!(hub, HubKind::ChallengeHub);
                assert!(reason.contains("credentials rejected"));
                saw_fatal = true;
            }
        }
        assert!(saw_fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_a_pending_backoff() {
        // No scripts: every connect attempt fails, so the loop sits in
        // backoff sleeps until cancelled.
        let connector = Arc::new(ScriptedConnector::new(vec![]));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let conn = connection(
            Arc::new(StaticTokens),
            connector,
            vec![],
            events_tx,
            cancel.clone(),
        );
        let handle = conn.spawn();

        // Let it reach the first backoff.
        loop {
            if let Some(HubEvent::Reconnecting { .. }) = events_rx.recv().await {
                break;
            }
        }
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run loop should exit promptly")
            .expect("no panic");
    }

    #[tokio::test(start_paused = true)]
    async fn socket_failures_back_off_and_emit_reconnecting() {
        let connector = Arc::new(ScriptedConnector::new(vec![]));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let conn = connection(
            Arc::new(StaticTokens),
            connector,
            vec![],
            events_tx,
            cancel.clone(),
        );
        let handle = conn.spawn();

        let mut attempts = Vec::new();
        while attempts.len() < 3 {
            if let Some(HubEvent::Reconnecting { attempt, .. }) = events_rx.recv().await {
                attempts.push(attempt);
            }
        }
        assert_eq!(attempts, vec![1, 2, 3]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
