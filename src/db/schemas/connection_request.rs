//! Connection request and project interest schemas
//!
//! Both are directed investor → entrepreneur records scoped to one project,
//! unique per (investor, project). The store enforces the uniqueness.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for connection requests
pub const CONNECTION_REQUEST_COLLECTION: &str = "connection_requests";

/// Collection name for project interests
pub const PROJECT_INTEREST_COLLECTION: &str = "project_interests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }
}

/// Connection request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectionRequest {
    pub id: String,

    pub investor_id: String,

    pub entrepreneur_id: String,

    pub project_id: String,

    #[serde(default)]
    pub status: RequestStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl IntoIndexes for ConnectionRequest {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("connection_request_id_unique".to_string())
                        .build(),
                ),
            ),
            // One request per investor and project
            (
                doc! { "investor_id": 1, "project_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("investor_project_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "entrepreneur_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("entrepreneur_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Investment intent on a project. Does not open a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectInterest {
    pub id: String,

    pub investor_id: String,

    pub entrepreneur_id: String,

    pub project_id: String,

    pub amount: f64,

    pub currency: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for ProjectInterest {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("project_interest_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "investor_id": 1, "project_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("interest_investor_project_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Which side of a directed record the caller is on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyFilter {
    Investor(String),
    Entrepreneur(String),
}

impl PartyFilter {
    pub fn matches(&self, investor_id: &str, entrepreneur_id: &str) -> bool {
        match self {
            PartyFilter::Investor(id) => id == investor_id,
            PartyFilter::Entrepreneur(id) => id == entrepreneur_id,
        }
    }

    pub fn to_document(&self) -> Document {
        match self {
            PartyFilter::Investor(id) => doc! { "investor_id": id },
            PartyFilter::Entrepreneur(id) => doc! { "entrepreneur_id": id },
        }
    }
}
