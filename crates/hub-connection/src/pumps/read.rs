//! Read pump, the single owner of the socket's stream half.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hilolink_protocol::constants::{INACTIVITY_TIMEOUT, MAX_CONSECUTIVE_MALFORMED};
use hilolink_protocol::{Frame, FrameDecoder};

use crate::socket::PendingMap;
use crate::types::{HubEvent, HubKind};

use super::frame_message;

/// Reads WebSocket messages, reassembles protocol frames, and dispatches
/// them.
///
/// The hub goes quiet when the backend drops us without a close frame,
/// so an inactivity deadline doubles as a watchdog: any frame (pings
/// included) resets it, and silence past [`INACTIVITY_TIMEOUT`] tears the
/// connection down for a reconnect. When the pump exits for any reason it
/// cancels `closed`, which the run loop watches.
pub(crate) async fn read_pump<S>(
    mut read: S,
    mut decoder: FrameDecoder,
    hub: HubKind,
    pending: PendingMap,
    events_tx: mpsc::Sender<HubEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    closed: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let inactivity = tokio::time::sleep(INACTIVITY_TIMEOUT);
    tokio::pin!(inactivity);
    let mut malformed: u32 = 0;

    'outer: loop {
        // Dispatch everything already buffered before waiting on the
        // socket. The handshake may leave frames the hub stacked behind
        // its response sitting in the decoder.
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    malformed = 0;
                    if !handle_frame(hub, frame, &pending, &events_tx, &write_tx).await {
                        break 'outer;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    malformed += 1;
                    warn!(hub = %hub, malformed, "dropping undecodable frame: {e}");
                    if malformed >= MAX_CONSECUTIVE_MALFORMED {
                        warn!(hub = %hub, "too many malformed frames, closing");
                        break 'outer;
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut inactivity => {
                warn!(hub = %hub, "no frames within inactivity window, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        inactivity
                            .as_mut()
                            .reset(tokio::time::Instant::now() + INACTIVITY_TIMEOUT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                decoder.extend(text.as_str().as_bytes());
                            }
                            tungstenite::Message::Binary(data) => {
                                decoder.extend(&data);
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!(hub = %hub, "websocket ping");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {}
                            tungstenite::Message::Close(frame) => {
                                debug!(hub = %hub, ?frame, "websocket close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!(hub = %hub, "websocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!(hub = %hub, "websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
}

/// Dispatches one decoded frame. Returns `false` when the connection
/// should be torn down.
async fn handle_frame(
    hub: HubKind,
    frame: Frame,
    pending: &PendingMap,
    events_tx: &mpsc::Sender<HubEvent>,
    write_tx: &mpsc::Sender<tungstenite::Message>,
) -> bool {
    match frame {
        Frame::Ping => {
            // The hub expects a ping echoed back.
            trace!(hub = %hub, "protocol ping");
            let _ = write_tx.send(frame_message(&Frame::Ping)).await;
            true
        }
        Frame::Invocation(inv) => {
            trace!(hub = %hub, target = %inv.target, "push invocation");
            let _ = events_tx
                .send(HubEvent::Invocation {
                    hub,
                    target: inv.target,
                    arguments: inv.arguments,
                })
                .await;
            true
        }
        Frame::Completion(completion) => {
            let mut map = pending.lock().await;
            match map.remove(&completion.invocation_id) {
                Some(tx) => {
                    let _ = tx.send(completion);
                }
                None => {
                    debug!(
                        hub = %hub,
                        invocation_id = %completion.invocation_id,
                        "completion for unknown invocation"
                    );
                }
            }
            true
        }
        Frame::Close { error } => {
            info!(hub = %hub, ?error, "hub sent close frame");
            false
        }
        Frame::HandshakeRequest(_) | Frame::HandshakeResponse(_) => {
            debug!(hub = %hub, "unexpected handshake frame after handshake");
            true
        }
    }
}
