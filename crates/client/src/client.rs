//! The top-level client: two hub connections, routing, registries.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hilolink_auth::{TokenManager, TokenSource};
use hilolink_hub_connection::{
    HubConnection, HubEvent, HubKind, Negotiator, RestNegotiator, SubscriptionTarget,
};
use hilolink_registry::{DeviceRegistry, EventRegistry};
use hilolink_router::{EventRouter, challenge_hub_router, device_hub_router};

use crate::config::ClientConfig;

/// A running Hilo client.
///
/// Owns both hub connections and the dispatch task that routes pushed
/// invocations into the registries. External consumers watch state via
/// the registries (snapshot or subscription) or the forwarded
/// [`HubEvent`] stream from [`Client::take_events`].
pub struct Client {
    devices: Arc<Mutex<DeviceRegistry>>,
    challenge_events: Arc<Mutex<EventRegistry>>,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<HubEvent>>>,
    cancel: CancellationToken,
    device_handle: JoinHandle<()>,
    challenge_handle: JoinHandle<()>,
    dispatch_handle: JoinHandle<()>,
}

impl Client {
    /// Wires everything up and starts both hub connections.
    pub fn connect(config: ClientConfig, source: Arc<dyn TokenSource>) -> Self {
        let tokens = Arc::new(TokenManager::new(source));
        let negotiator: Arc<dyn Negotiator> =
            Arc::new(RestNegotiator::new(config.api_base_url.clone()));
        let reconnect = config.reconnect.to_config();

        let devices = Arc::new(Mutex::new(DeviceRegistry::new()));
        let challenge_events = Arc::new(Mutex::new(EventRegistry::new()));
        let device_router = device_hub_router(devices.clone());
        let challenge_router = challenge_hub_router(challenge_events.clone(), config.location_id);

        let (hub_events_tx, hub_events_rx) = mpsc::channel(256);
        let (forward_tx, forward_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let device_subscriptions = vec![
            SubscriptionTarget::location(config.location_id),
            SubscriptionTarget::devices_attributes(config.location_id),
        ];
        let mut challenge_subscriptions = Vec::new();
        for &event_id in &config.ch_event_ids {
            challenge_subscriptions.push(SubscriptionTarget::event_ch(config.location_id, event_id));
        }
        for &event_id in &config.flex_event_ids {
            challenge_subscriptions.push(SubscriptionTarget::event_flex(
                config.location_id,
                event_id,
            ));
        }

        let device_handle = HubConnection::new(
            HubKind::DeviceHub,
            tokens.clone(),
            negotiator.clone(),
            device_subscriptions,
            reconnect.clone(),
            hub_events_tx.clone(),
            cancel.clone(),
        )
        .spawn();

        let challenge_handle = HubConnection::new(
            HubKind::ChallengeHub,
            tokens,
            negotiator,
            challenge_subscriptions,
            reconnect,
            hub_events_tx,
            cancel.clone(),
        )
        .spawn();

        let dispatch_handle = tokio::spawn(dispatch_loop(
            hub_events_rx,
            device_router,
            challenge_router,
            forward_tx,
        ));

        info!(location_id = config.location_id, "client started");

        Self {
            devices,
            challenge_events,
            events_rx: tokio::sync::Mutex::new(Some(forward_rx)),
            cancel,
            device_handle,
            challenge_handle,
            dispatch_handle,
        }
    }

    /// Takes the forwarded event stream. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<HubEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Canonical device state.
    pub fn devices(&self) -> Arc<Mutex<DeviceRegistry>> {
        self.devices.clone()
    }

    /// Canonical challenge-event state.
    pub fn challenge_events(&self) -> Arc<Mutex<EventRegistry>> {
        self.challenge_events.clone()
    }

    /// Stops both connections and waits for the tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.device_handle.await;
        let _ = self.challenge_handle.await;
        let _ = self.dispatch_handle.await;
        info!("client stopped");
    }
}

/// Routes hub invocations through the per-hub routers and forwards every
/// event to the external stream.
///
/// Forwarding never blocks routing; if the external consumer falls
/// behind, events are dropped for them while the registries stay
/// current.
async fn dispatch_loop(
    mut hub_events_rx: mpsc::Receiver<HubEvent>,
    device_router: EventRouter,
    challenge_router: EventRouter,
    forward_tx: mpsc::Sender<HubEvent>,
) {
    while let Some(event) = hub_events_rx.recv().await {
        if let HubEvent::Invocation {
            hub,
            target,
            arguments,
        } = &event
        {
            let router = match hub {
                HubKind::DeviceHub => &device_router,
                HubKind::ChallengeHub => &challenge_router,
            };
            router.dispatch(target, arguments);
        }

        if forward_tx.try_send(event).is_err() {
            debug!("event consumer behind, dropping forwarded event");
        }
    }
    debug!("dispatch loop ended");
}
