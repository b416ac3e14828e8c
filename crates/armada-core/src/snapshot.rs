//! Storage snapshots
//!
//! A snapshot is the ordered list of `(label, value)` pairs read from a
//! contract's declared storage layout. Snapshots are taken immediately before
//! and after an implementation swap and compared element-wise; they are never
//! persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered storage read of one contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    slots: Vec<(String, Value)>,
}

/// One position where two snapshots disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMismatch {
    /// Position in the layout
    pub index: usize,
    /// Label on the pre-upgrade side, if present
    pub label: Option<String>,
    /// Value before the upgrade
    pub before: Option<Value>,
    /// Value after the upgrade
    pub after: Option<Value>,
}

impl StorageSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot, keeping layout order.
    pub fn push(&mut self, label: impl Into<String>, value: Value) {
        self.slots.push((label.into(), value));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with_slot(mut self, label: impl Into<String>, value: Value) -> Self {
        self.push(label, value);
        self
    }

    /// Slots in layout order.
    pub fn slots(&self) -> &[(String, Value)] {
        &self.slots
    }

    /// Value of the first slot with `label`.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.slots
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the snapshot has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Element-wise comparison against a later read of the same layout.
    ///
    /// A slot counts as mismatched when its label or value differs, or when it
    /// exists on one side only.
    pub fn diff(&self, after: &StorageSnapshot) -> Vec<SlotMismatch> {
        let len = self.slots.len().max(after.slots.len());
        (0..len)
            .filter_map(|index| {
                let before = self.slots.get(index);
                let later = after.slots.get(index);
                if before == later {
                    return None;
                }
                Some(SlotMismatch {
                    index,
                    label: before.or(later).map(|(label, _)| label.clone()),
                    before: before.map(|(_, value)| value.clone()),
                    after: later.map(|(_, value)| value.clone()),
                })
            })
            .collect()
    }
}

impl FromIterator<(String, Value)> for StorageSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StorageSnapshot {
        StorageSnapshot::new()
            .with_slot("accessController", json!("0x01"))
            .with_slot("registry", json!("0x02"))
            .with_slot("totalSupply", json!(42))
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        assert!(sample().diff(&sample()).is_empty());
    }

    #[test]
    fn test_changed_value_is_reported() {
        let mut after = sample();
        after.slots[2].1 = json!(43);

        let diff = sample().diff(&after);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].index, 2);
        assert_eq!(diff[0].label.as_deref(), Some("totalSupply"));
        assert_eq!(diff[0].before, Some(json!(42)));
        assert_eq!(diff[0].after, Some(json!(43)));
    }

    #[test]
    fn test_length_change_is_reported() {
        let after = sample().with_slot("newSlot", json!(true));
        let diff = sample().diff(&after);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].before, None);
        assert_eq!(diff[0].label.as_deref(), Some("newSlot"));
    }
}
