//! Challenge event registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::attributes::AttributeMap;
use crate::value::AttributeValue;

/// Identity of a challenge event: the location it belongs to plus the
/// server-assigned event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub location_id: i64,
    pub event_id: i64,
}

impl EventKey {
    pub fn new(location_id: i64, event_id: i64) -> Self {
        Self {
            location_id,
            event_id,
        }
    }
}

/// One challenge event and its reconciled detail fields.
///
/// Event details (phase, timestamps, consumption figures) arrive as
/// loosely-typed JSON and are kept under the same forward-merge rule as
/// device attributes.
#[derive(Debug, Clone)]
pub struct ChallengeEvent {
    pub key: EventKey,
    pub attributes: AttributeMap,
}

impl ChallengeEvent {
    fn new(key: EventKey) -> Self {
        Self {
            key,
            attributes: AttributeMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).map(|a| &a.value)
    }

    /// The event's current phase as reported by the hub.
    pub fn progress(&self) -> Option<&str> {
        self.attribute("progress").and_then(AttributeValue::as_str)
    }
}

type EventSubscriber = Box<dyn Fn(&ChallengeEvent) + Send>;

/// Canonical challenge-event state, keyed by `(location, event)`.
///
/// Shares the device registry's contract: lazy creation on first
/// mention, synchronous ordered subscribers, one notification per update
/// that changed something.
#[derive(Default)]
pub struct EventRegistry {
    events: HashMap<EventKey, ChallengeEvent>,
    subscribers: Vec<EventSubscriber>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&ChallengeEvent) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Merges one detail field into the keyed event, creating the event
    /// on first mention. Returns whether the stored value changed.
    pub fn apply_update(
        &mut self,
        key: EventKey,
        field: &str,
        value: AttributeValue,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let event = self.events.entry(key).or_insert_with(|| {
            debug!(
                location_id = key.location_id,
                event_id = key.event_id,
                "creating challenge event from first update"
            );
            ChallengeEvent::new(key)
        });

        let changed = event.attributes.merge(field, value, timestamp);
        if changed {
            let snapshot = event.clone();
            for subscriber in &self.subscribers {
                subscriber(&snapshot);
            }
        }
        changed
    }

    /// Returns a snapshot of one event.
    pub fn get(&self, key: EventKey) -> Option<ChallengeEvent> {
        self.events.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChallengeEvent> {
        self.events.values()
    }
}
