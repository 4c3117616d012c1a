//! Serializable capture of the state stack.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current [`StackSnapshot`] layout version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One captured state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Name of the factory that rebuilds the state.
    pub factory: String,
    /// The state's display name at capture time.
    pub name: String,
    /// Blob produced by `ActiveState::serialize`.
    pub state: Value,
}

/// The whole stack, bottom to top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSnapshot {
    /// Layout version; restore rejects anything else.
    pub format_version: u32,
    /// Captured states, bottom first.
    pub entries: Vec<SnapshotEntry>,
}

impl StackSnapshot {
    /// Creates a snapshot in the current format.
    #[must_use]
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            entries,
        }
    }

    /// Returns the factory names in stack order.
    #[must_use]
    pub fn factories(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.factory.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_serializes_to_json() {
        let snapshot = StackSnapshot::new(vec![SnapshotEntry {
            factory: "world".to_owned(),
            name: "overworld".to_owned(),
            state: json!({ "x": 3 }),
        }]);

        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(
            value,
            json!({
                "format_version": 1,
                "entries": [{ "factory": "world", "name": "overworld", "state": { "x": 3 } }]
            })
        );
    }

    #[test]
    fn test_snapshot_deserializes_from_json() {
        let raw = json!({
            "format_version": 1,
            "entries": [
                { "factory": "world", "name": "overworld", "state": null },
                { "factory": "menu", "name": "pause", "state": {} }
            ]
        });

        let snapshot: StackSnapshot = serde_json::from_value(raw).unwrap();

        assert_eq!(snapshot.factories(), vec!["world", "menu"]);
    }
}
