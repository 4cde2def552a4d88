//! Change event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Collection;

/// Types of change events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RecordInserted,
    RecordUpdated,
    RecordDeleted,
    CollectionCleared,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
}

/// A committed change to the local replica, or a sync lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub collection: Collection,
    /// Affected record (if applicable)
    pub local_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Additional data
    pub data: Option<serde_json::Value>,
}

impl ChangeEvent {
    fn new(event_type: EventType, collection: Collection, local_id: Option<i64>) -> Self {
        Self {
            event_type,
            collection,
            local_id,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn inserted(collection: Collection, local_id: i64) -> Self {
        Self::new(EventType::RecordInserted, collection, Some(local_id))
    }

    pub fn updated(collection: Collection, local_id: i64) -> Self {
        Self::new(EventType::RecordUpdated, collection, Some(local_id))
    }

    pub fn deleted(collection: Collection, local_id: i64) -> Self {
        Self::new(EventType::RecordDeleted, collection, Some(local_id))
    }

    pub fn cleared(collection: Collection, removed: usize) -> Self {
        Self {
            data: Some(serde_json::json!({ "removed": removed })),
            ..Self::new(EventType::CollectionCleared, collection, None)
        }
    }

    pub fn sync_started(collection: Collection) -> Self {
        Self::new(EventType::SyncStarted, collection, None)
    }

    /// Create a sync completed event carrying the cycle counts
    pub fn sync_completed(collection: Collection, pushed: usize, pulled: usize) -> Self {
        Self {
            data: Some(serde_json::json!({
                "pushed": pushed,
                "pulled": pulled,
            })),
            ..Self::new(EventType::SyncCompleted, collection, None)
        }
    }

    pub fn sync_failed(collection: Collection, error: &str) -> Self {
        Self {
            data: Some(serde_json::json!({ "error": error })),
            ..Self::new(EventType::SyncFailed, collection, None)
        }
    }
}

/// Subscription filter for events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeFilter {
    /// Only events for these collections
    pub collections: Option<Vec<Collection>>,
    /// Only specific event types
    pub event_types: Option<Vec<EventType>>,
}

impl ChangeFilter {
    pub fn collection(collection: Collection) -> Self {
        Self {
            collections: Some(vec![collection]),
            event_types: None,
        }
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }

        if let Some(ref collections) = self.collections {
            if !collections.contains(&event.collection) {
                return false;
            }
        }

        true
    }
}
