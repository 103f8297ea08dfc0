//! Invocation target names for both hubs.
//!
//! The challenge hub carries two rate-program variants ("CH" and "Flex")
//! that share the same payload shape under different target names.

// Client → hub subscriptions.

/// Subscribes the device hub connection to a location's updates.
pub const SUBSCRIBE_TO_LOCATION: &str = "SubscribeToLocation";

/// Subscribes to per-attribute updates for a set of devices.
pub const SUBSCRIBE_DEVICES_ATTRIBUTES: &str = "SubscribeDevicesAttributes";

/// Subscribes the challenge hub connection to a CH-program event.
pub const SUBSCRIBE_TO_EVENT_CH: &str = "SubscribeToEventCH";

/// Subscribes the challenge hub connection to a Flex-program event.
pub const SUBSCRIBE_TO_EVENT_FLEX: &str = "SubscribeToEventFlex";

// Hub → client pushes (device hub).

/// Full device list snapshot, sent after subscribing.
pub const DEVICE_LIST_INITIAL_VALUES: &str = "DeviceListInitialValuesReceived";

/// Incremental device list changes.
pub const DEVICE_LIST_UPDATED_VALUES: &str = "DeviceListUpdatedValuesReceived";

/// Per-attribute device readings.
pub const DEVICES_VALUES_RECEIVED: &str = "DevicesValuesReceived";

/// Periodic server heartbeat carrying a timestamp argument.
pub const HEARTBEAT: &str = "Heartbeat";

// Hub → client pushes (challenge hub).

/// Full CH event details snapshot, sent after subscribing.
pub const EVENT_CH_INITIAL_VALUES: &str = "EventCHDetailsInitialValuesReceived";

/// Incremental CH event detail changes.
pub const EVENT_CH_UPDATED_VALUES: &str = "EventCHDetailsUpdatedValuesReceived";

/// Full Flex event details snapshot, sent after subscribing.
pub const EVENT_FLEX_INITIAL_VALUES: &str = "EventFlexDetailsInitialValuesReceived";

/// Incremental Flex event detail changes.
pub const EVENT_FLEX_UPDATED_VALUES: &str = "EventFlexDetailsUpdatedValuesReceived";
