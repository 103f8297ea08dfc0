//! Keepalive pump sending protocol-level pings.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use hilolink_protocol::Frame;
use hilolink_protocol::constants::PING_INTERVAL;

use super::frame_message;

/// Sends a `{"type":6}` frame every [`PING_INTERVAL`] so the hub keeps
/// the connection alive.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if write_tx.send(frame_message(&Frame::Ping)).await.is_err() {
                    break;
                }
            }
        }
    }
}
