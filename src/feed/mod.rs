//! Realtime change feed
//!
//! Row-level insert/update events pushed to subscribers that registered a
//! filter on a table (and optionally one column value). Delivery is
//! best-effort: a subscriber that falls behind the channel capacity skips
//! the missed events and is expected to re-fetch.
//!
//! ## Example event
//!
//! ```json
//! {
//!   "table": "notifications",
//!   "op": "insert",
//!   "timestamp": "2024-01-15T10:30:00Z",
//!   "record": { "id": "...", "user_id": "...", "kind": "message" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity
pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// One row change
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub op: ChangeOp,
    pub timestamp: String,
    pub record: serde_json::Value,

    /// Users allowed to receive this event. Empty means every signed-in user.
    #[serde(skip)]
    pub audience: Vec<String>,
}

impl ChangeEvent {
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.audience.is_empty() || self.audience.iter().any(|u| u == user_id)
    }

    /// String value of a top-level column in the record
    pub fn column(&self, name: &str) -> Option<&str> {
        self.record.get(name).and_then(|v| v.as_str())
    }
}

/// Subscription filter: a table plus an optional `column = value` match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ChangeFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: None,
            value: None,
        }
    }

    pub fn eq(table: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: Some(column.into()),
            value: Some(value.into()),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match (&self.column, &self.value) {
            (Some(column), Some(value)) => event.column(column) == Some(value.as_str()),
            (Some(column), None) => event.record.get(column).is_some(),
            _ => true,
        }
    }
}

/// Broadcast hub for row changes
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a row change to every current subscriber
    pub fn publish<T: Serialize>(
        &self,
        table: &str,
        op: ChangeOp,
        record: &T,
        audience: Vec<String>,
    ) {
        let record = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(e) => {
                warn!("Dropping {} change event: {}", table, e);
                return;
            }
        };

        let event = ChangeEvent {
            table: table.to_string(),
            op,
            timestamp: chrono::Utc::now().to_rfc3339(),
            record,
            audience,
        };

        // Ignore send errors (no subscribers)
        if self.sender.send(event).is_err() {
            debug!("No feed subscribers for {}", table);
        }
    }

    /// Subscribe with a set of filters; an event is delivered if any filter matches
    pub fn subscribe(&self, filters: Vec<ChangeFilter>) -> FeedSubscription {
        FeedSubscription {
            receiver: self.sender.subscribe(),
            filters,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Filtered receiver half of the feed
pub struct FeedSubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filters: Vec<ChangeFilter>,
}

impl FeedSubscription {
    pub fn filters(&self) -> &[ChangeFilter] {
        &self.filters
    }

    pub fn add_filter(&mut self, filter: ChangeFilter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    pub fn remove_filter(&mut self, filter: &ChangeFilter) {
        self.filters.retain(|f| f != filter);
    }

    /// Next matching event, or `None` once the feed is closed.
    /// Lagged events are skipped.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filters.iter().any(|f| f.matches(&event)) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Feed subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
