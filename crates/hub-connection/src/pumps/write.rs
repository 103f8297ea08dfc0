//! Write pump, the single owner of the socket's sink half.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::HubKind;

/// Forwards queued frames to the hub until cancelled or the queue
/// closes, then signs off with a WebSocket close so the hub drops the
/// connection cleanly instead of waiting out its own timeout.
pub(crate) async fn write_pump<S>(
    hub: HubKind,
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        if let Err(e) = write.send(msg).await {
            warn!(hub = %hub, "websocket write failed: {e}");
            break;
        }
    }

    debug!(hub = %hub, "write pump closing");
    let _ = write.send(tungstenite::Message::Close(None)).await;
}
