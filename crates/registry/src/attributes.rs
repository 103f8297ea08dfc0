//! Timestamped attribute maps with forward-merge semantics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::value::AttributeValue;

/// One attribute slot: the current value and when it was last written.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub value: AttributeValue,
    pub last_updated: DateTime<Utc>,
}

/// Attribute storage shared by the device and event registries.
///
/// Unknown attribute names are stored rather than rejected.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    inner: HashMap<String, Attribute>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an update under the forward-merge rule: an update older
    /// than the stored timestamp is dropped; an equal-or-newer one wins.
    ///
    /// Returns whether the stored value actually changed, so callers can
    /// skip redundant notifications.
    pub fn merge(
        &mut self,
        name: &str,
        value: AttributeValue,
        timestamp: DateTime<Utc>,
    ) -> bool {
        match self.inner.get_mut(name) {
            Some(existing) => {
                if timestamp < existing.last_updated {
                    return false;
                }
                let changed = existing.value != value;
                existing.value = value;
                existing.last_updated = timestamp;
                changed
            }
            None => {
                self.inner.insert(
                    name.to_owned(),
                    Attribute {
                        value,
                        last_updated: timestamp,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.inner.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
