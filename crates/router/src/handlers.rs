//! Concrete handlers for the hub push targets.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use hilolink_protocol::targets;
use hilolink_registry::{AttributeValue, DeviceRegistry, EventKey, EventRegistry};

use crate::router::EventRouter;

/// Builds the router for a device hub connection.
pub fn device_hub_router(devices: Arc<Mutex<DeviceRegistry>>) -> EventRouter {
    let mut router = EventRouter::new();
    router.register(
        targets::DEVICE_LIST_INITIAL_VALUES,
        device_list_handler(devices.clone()),
    );
    router.register(
        targets::DEVICE_LIST_UPDATED_VALUES,
        device_list_handler(devices.clone()),
    );
    router.register(
        targets::DEVICES_VALUES_RECEIVED,
        device_values_handler(devices),
    );
    router.register(targets::HEARTBEAT, |arguments: &[Value]| {
        info!(timestamp = ?arguments.first(), "hub heartbeat");
    });
    router
}

/// Builds the router for a challenge hub connection.
///
/// CH and Flex targets carry the same detail shape, so all four map to
/// one handler; events land under the connection's location id.
pub fn challenge_hub_router(
    events: Arc<Mutex<EventRegistry>>,
    location_id: i64,
) -> EventRouter {
    let mut router = EventRouter::new();
    for target in [
        targets::EVENT_CH_INITIAL_VALUES,
        targets::EVENT_CH_UPDATED_VALUES,
        targets::EVENT_FLEX_INITIAL_VALUES,
        targets::EVENT_FLEX_UPDATED_VALUES,
    ] {
        router.register(target, event_details_handler(events.clone(), location_id));
    }
    router
}

/// Handles `DeviceList*ValuesReceived`: each argument is an array of
/// device objects `{id, deviceType?, attributes: {name: value |
/// {value, timeStampUTC}}}`.
fn device_list_handler(devices: Arc<Mutex<DeviceRegistry>>) -> impl Fn(&[Value]) + Send {
    move |arguments| {
        let received_at = Utc::now();
        let Ok(mut registry) = devices.lock() else {
            error!("device registry lock poisoned, dropping device list");
            return;
        };
        for entry in arguments.iter().flat_map(flatten_argument) {
            apply_device_entry(&mut registry, entry, received_at);
        }
    }
}

fn apply_device_entry(registry: &mut DeviceRegistry, entry: &Value, received_at: DateTime<Utc>) {
    let Some(id) = entry.get("id").and_then(value_to_id) else {
        warn!(?entry, "device entry without id");
        return;
    };

    if let Some(device_type) = entry.get("deviceType").and_then(Value::as_str) {
        registry.set_device_type(&id, device_type);
    }

    let Some(attributes) = entry.get("attributes").and_then(Value::as_object) else {
        return;
    };
    for (name, raw) in attributes {
        // Attributes come either bare or wrapped with their own timestamp.
        let (value, timestamp) = match raw.as_object() {
            Some(wrapped) if wrapped.contains_key("value") => (
                &wrapped["value"],
                parse_timestamp(wrapped.get("timeStampUTC"), received_at),
            ),
            _ => (raw, received_at),
        };
        registry.apply_update(&id, name, AttributeValue::coerce(value), timestamp);
    }
}

/// Handles `DevicesValuesReceived`: per-attribute readings
/// `{deviceId, attribute, value, timeStampUTC}`.
fn device_values_handler(devices: Arc<Mutex<DeviceRegistry>>) -> impl Fn(&[Value]) + Send {
    move |arguments| {
        let received_at = Utc::now();
        let Ok(mut registry) = devices.lock() else {
            error!("device registry lock poisoned, dropping readings");
            return;
        };
        for reading in arguments.iter().flat_map(flatten_argument) {
            let (Some(id), Some(attribute)) = (
                reading.get("deviceId").and_then(value_to_id),
                reading.get("attribute").and_then(Value::as_str),
            ) else {
                warn!(?reading, "reading without deviceId or attribute");
                continue;
            };
            let value = reading.get("value").unwrap_or(&Value::Null);
            let timestamp = parse_timestamp(reading.get("timeStampUTC"), received_at);
            registry.apply_update(&id, attribute, AttributeValue::coerce(value), timestamp);
        }
    }
}

/// Handles challenge event detail pushes by flattening the detail object
/// into the event registry. The nested `phases` and `consumption` maps
/// are flattened one level so their fields merge individually.
fn event_details_handler(
    events: Arc<Mutex<EventRegistry>>,
    location_id: i64,
) -> impl Fn(&[Value]) + Send {
    move |arguments| {
        let received_at = Utc::now();
        let Ok(mut registry) = events.lock() else {
            error!("event registry lock poisoned, dropping event details");
            return;
        };
        for details in arguments.iter().flat_map(flatten_argument) {
            let Some(event_id) = details.get("id").and_then(Value::as_i64) else {
                warn!(?details, "event details without id");
                continue;
            };
            let key = EventKey::new(location_id, event_id);
            let Some(fields) = details.as_object() else {
                continue;
            };
            for (name, value) in fields {
                if name == "id" {
                    continue;
                }
                match (name.as_str(), value.as_object()) {
                    ("phases" | "consumption", Some(nested)) => {
                        for (inner, v) in nested {
                            registry.apply_update(
                                key,
                                inner,
                                AttributeValue::coerce(v),
                                received_at,
                            );
                        }
                    }
                    _ => {
                        registry.apply_update(
                            key,
                            name,
                            AttributeValue::coerce(value),
                            received_at,
                        );
                    }
                }
            }
        }
    }
}

/// Arguments arrive either as one array of entries or as bare entries.
fn flatten_argument(argument: &Value) -> Vec<&Value> {
    match argument.as_array() {
        Some(entries) => entries.iter().collect(),
        None => vec![argument],
    }
}

/// Device ids show up both as JSON strings and as bare numbers.
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(text) = value.and_then(Value::as_str) else {
        return fallback;
    };
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Some hub timestamps omit the offset.
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .unwrap_or(fallback)
}
