//! Conversation and message schemas

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for conversations
pub const CONVERSATION_COLLECTION: &str = "conversations";

/// Collection name for messages
pub const MESSAGE_COLLECTION: &str = "messages";

/// Conversation opened by an accepted connection request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: String,

    pub investor_id: String,

    pub entrepreneur_id: String,

    pub project_id: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.investor_id == user_id || self.entrepreneur_id == user_id
    }

    /// The other participant, if `user_id` is one of them
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if self.investor_id == user_id {
            Some(&self.entrepreneur_id)
        } else if self.entrepreneur_id == user_id {
            Some(&self.investor_id)
        } else {
            None
        }
    }
}

impl IntoIndexes for Conversation {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("conversation_id_unique".to_string())
                        .build(),
                ),
            ),
            // Exactly one conversation per accepted triple
            (
                doc! { "investor_id": 1, "entrepreneur_id": 1, "project_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("conversation_triple_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Chat message
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,

    pub conversation_id: String,

    pub sender_id: String,

    pub content: String,

    #[serde(default)]
    pub read: bool,

    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for Message {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("message_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "conversation_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("conversation_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterpart() {
        let c = Conversation {
            id: "c1".into(),
            investor_id: "inv".into(),
            entrepreneur_id: "ent".into(),
            project_id: "p1".into(),
            created_at: Utc::now(),
            last_message_at: None,
        };
        assert_eq!(c.counterpart_of("inv"), Some("ent"));
        assert_eq!(c.counterpart_of("ent"), Some("inv"));
        assert_eq!(c.counterpart_of("stranger"), None);
        assert!(!c.has_participant("stranger"));
    }
}
