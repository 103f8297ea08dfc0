//! One live WebSocket to a hub, with its pump tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hilolink_protocol::{Completion, Frame, FrameDecoder, HandshakeRequest, Invocation};

use crate::error::ConnectionError;
use crate::pumps::frame_message;
use crate::types::{HubEvent, HubKind};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Invocations awaiting a completion, keyed by invocation id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Completion>>>>;

/// A connected, handshaken hub socket.
///
/// Owns the read, write and keepalive pump tasks. When the hub drops us
/// (close frame, socket error, inactivity) the read pump cancels the
/// `closed` token, which the run loop watches to trigger a reconnect.
#[derive(Debug)]
pub struct HubSocket {
    hub: HubKind,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    cancel: CancellationToken,
    closed: CancellationToken,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
    ping_handle: JoinHandle<()>,
}

impl HubSocket {
    /// Opens the WebSocket with the hub bearer token on the upgrade
    /// request and performs the protocol handshake.
    pub async fn connect(
        hub: HubKind,
        ws_url: &str,
        bearer: &str,
        events_tx: mpsc::Sender<HubEvent>,
    ) -> Result<Self, ConnectionError> {
        let mut request = ws_url.into_client_request()?;
        let auth = tungstenite::http::HeaderValue::from_str(&format!("Bearer {bearer}"))
            .map_err(|_| ConnectionError::InvalidAuthHeader)?;
        request
            .headers_mut()
            .insert(tungstenite::http::header::AUTHORIZATION, auth);

        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (write, read) = stream.split();
        Self::establish(hub, write, read, events_tx).await
    }

    /// Handshakes over an already-open transport and spawns the pumps.
    ///
    /// Generic over the transport halves so tests can drive it with
    /// scripted streams.
    pub(crate) async fn establish<W, R>(
        hub: HubKind,
        mut write: W,
        mut read: R,
        events_tx: mpsc::Sender<HubEvent>,
    ) -> Result<Self, ConnectionError>
    where
        W: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin + Send + 'static,
        R: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>>
            + Unpin
            + Send
            + 'static,
    {
        write
            .send(frame_message(&Frame::HandshakeRequest(
                HandshakeRequest::default(),
            )))
            .await?;

        // The decoder survives the handshake so frames the hub stacked
        // behind the response are not lost.
        let mut decoder = FrameDecoder::new();
        tokio::time::timeout(HANDSHAKE_TIMEOUT, await_handshake(&mut read, &mut decoder))
            .await
            .map_err(|_| ConnectionError::HandshakeIncomplete)??;
        debug!(hub = %hub, "handshake accepted");

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(hub, write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            let closed = closed.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, decoder, hub, pending, events_tx, write_tx, cancel, closed,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        Ok(Self {
            hub,
            write_tx,
            pending,
            cancel,
            closed,
            read_handle,
            write_handle,
            ping_handle,
        })
    }

    /// Sends an invocation and registers interest in its completion.
    ///
    /// The returned receiver may be dropped; an unclaimed completion is
    /// simply discarded by the read pump.
    pub async fn invoke(
        &self,
        target: &str,
        arguments: Vec<Value>,
        invocation_id: String,
    ) -> Result<oneshot::Receiver<Completion>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(invocation_id.clone(), tx);

        let frame = Frame::Invocation(Invocation {
            target: target.to_owned(),
            arguments,
            invocation_id: Some(invocation_id.clone()),
        });
        if self.write_tx.send(frame_message(&frame)).await.is_err() {
            self.pending.lock().await.remove(&invocation_id);
            return Err(ConnectionError::Closed);
        }
        Ok(rx)
    }

    /// Token cancelled when the connection dies for any reason.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn hub(&self) -> HubKind {
        self.hub
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self
            .write_tx
            .send(tungstenite::Message::Close(None))
            .await;
    }
}

impl Drop for HubSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.read_handle.abort();
        self.write_handle.abort();
        self.ping_handle.abort();
    }
}

/// Waits for the handshake response, failing on a handshake error or on
/// anything else arriving first.
async fn await_handshake<R>(read: &mut R, decoder: &mut FrameDecoder) -> Result<(), ConnectionError>
where
    R: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::HandshakeResponse(response) => {
                    return match response.error {
                        Some(error) => Err(ConnectionError::HandshakeRejected(error)),
                        None => Ok(()),
                    };
                }
                other => {
                    return Err(ConnectionError::HandshakeRejected(format!(
                        "unexpected frame before handshake response: {other:?}"
                    )));
                }
            }
        }

        match read.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => decoder.extend(text.as_str().as_bytes()),
            Some(Ok(tungstenite::Message::Binary(data))) => decoder.extend(&data),
            Some(Ok(tungstenite::Message::Close(_))) | None => return Err(ConnectionError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
