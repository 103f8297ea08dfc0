//! Device registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::attributes::AttributeMap;
use crate::value::AttributeValue;

/// One known device and its reconciled attribute state.
#[derive(Debug, Clone, Default)]
pub struct Device {
    pub id: String,
    pub device_type: Option<String>,
    pub attributes: AttributeMap,
}

impl Device {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).map(|a| &a.value)
    }
}

type DeviceSubscriber = Box<dyn Fn(&Device) + Send>;

/// Canonical device state, keyed by device id.
///
/// Devices are created lazily the first time an update names them, so a
/// value frame arriving before the initial snapshot is never dropped.
/// Subscribers run synchronously, in registration order, once per update
/// that actually changed a device.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
    subscribers: Vec<DeviceSubscriber>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&Device) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Merges one attribute update into the named device, creating it if
    /// this is the first time the id appears. Returns whether the stored
    /// value changed.
    pub fn apply_update(
        &mut self,
        device_id: &str,
        attribute: &str,
        value: AttributeValue,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let device = self
            .devices
            .entry(device_id.to_owned())
            .or_insert_with(|| {
                debug!(device_id, "creating device from first update");
                Device::new(device_id)
            });

        let changed = device.attributes.merge(attribute, value, timestamp);
        if changed {
            let snapshot = device.clone();
            for subscriber in &self.subscribers {
                subscriber(&snapshot);
            }
        }
        changed
    }

    /// Records a device's declared type, creating the device if needed.
    /// Type changes alone do not notify subscribers.
    pub fn set_device_type(&mut self, device_id: &str, device_type: impl Into<String>) {
        self.devices
            .entry(device_id.to_owned())
            .or_insert_with(|| Device::new(device_id))
            .device_type = Some(device_type.into());
    }

    /// Returns a snapshot of one device.
    pub fn get(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Duration;

    use super::*;

    fn power(w: f64) -> AttributeValue {
        AttributeValue::Number(w)
    }

    #[test]
    fn update_creates_device_lazily() {
        let mut registry = DeviceRegistry::new();
        registry.apply_update("69420", "Power", power(1500.0), Utc::now());

        let device = registry.get("69420").unwrap();
        assert_eq!(device.attribute("Power"), Some(&power(1500.0)));
        assert_eq!(device.device_type, None);
    }

    #[test]
    fn changed_update_notifies_exactly_once() {
        let notifications = Arc::new(AtomicU32::new(0));
        let mut registry = DeviceRegistry::new();
        {
            let n = notifications.clone();
            registry.subscribe(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }

        let ts = Utc::now();
        registry.apply_update("69420", "Power", power(1500.0), ts);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        // Re-applying the same update changes nothing and stays silent.
        registry.apply_update("69420", "Power", power(1500.0), ts);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_update_does_not_notify() {
        let notifications = Arc::new(AtomicU32::new(0));
        let mut registry = DeviceRegistry::new();
        {
            let n = notifications.clone();
            registry.subscribe(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }

        let ts = Utc::now();
        registry.apply_update("1", "Power", power(1500.0), ts);
        registry.apply_update("1", "Power", power(900.0), ts - Duration::seconds(5));

        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get("1").unwrap().attribute("Power"), Some(&power(1500.0)));
    }

    #[test]
    fn apply_update_reports_whether_the_value_changed() {
        let mut registry = DeviceRegistry::new();
        let ts = Utc::now();

        assert!(registry.apply_update("1", "Power", power(1500.0), ts));
        assert!(!registry.apply_update("1", "Power", power(1500.0), ts));
        assert!(!registry.apply_update("1", "Power", power(900.0), ts - Duration::seconds(5)));
        assert!(registry.apply_update("1", "Power", power(900.0), ts + Duration::seconds(5)));
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = DeviceRegistry::new();
        for label in ["first", "second", "third"] {
            let order = order.clone();
            registry.subscribe(move |_| order.lock().unwrap().push(label));
        }

        registry.apply_update("1", "Power", power(1.0), Utc::now());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn subscriber_sees_updated_snapshot() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let mut registry = DeviceRegistry::new();
        {
            let seen = seen.clone();
            registry.subscribe(move |device: &Device| {
                *seen.lock().unwrap() = device.attribute("Power").cloned();
            });
        }

        registry.apply_update("1", "Power", power(750.0), Utc::now());
        assert_eq!(*seen.lock().unwrap(), Some(power(750.0)));
    }

    #[test]
    fn set_device_type_is_silent() {
        let notifications = Arc::new(AtomicU32::new(0));
        let mut registry = DeviceRegistry::new();
        {
            let n = notifications.clone();
            registry.subscribe(move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }

        registry.set_device_type("1", "Thermostat");
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
        assert_eq!(registry.get("1").unwrap().device_type.as_deref(), Some("Thermostat"));
    }
}
