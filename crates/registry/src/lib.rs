//! Canonical in-memory state for devices and challenge events.
//!
//! Hub pushes are partial: a frame carries one attribute here, a snapshot
//! there. Both registries reconcile them under a single forward-merge
//! rule — an update is applied only if it is not older than the stored
//! value — and notify subscribers of entities that actually changed.

mod attributes;
mod device;
mod event;
mod value;

pub use attributes::{Attribute, AttributeMap};
pub use device::{Device, DeviceRegistry};
pub use event::{ChallengeEvent, EventKey, EventRegistry};
pub use value::AttributeValue;
