//! Subscription and payment transaction schemas

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::premium::PlanType;

/// Collection name for subscriptions
pub const SUBSCRIPTION_COLLECTION: &str = "subscriptions";

/// Collection name for payment transactions
pub const TRANSACTION_COLLECTION: &str = "transactions";

/// Subscription lifecycle status. Only `Active` grants premium access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Expired,
    Cancelled,
}

/// Subscription document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: String,

    pub user_id: String,

    pub plan_type: PlanType,

    pub status: SubscriptionStatus,

    pub start_date: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    pub amount: f64,

    pub currency: String,

    /// Payment gateway reference that paid for this period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

impl Subscription {
    /// Whether this row is active but past its end date
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date.is_some_and(|end| end < now)
    }
}

impl IntoIndexes for Subscription {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("subscription_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_status_index".to_string())
                        .build(),
                ),
            ),
            // One subscription per payment; rows without a reference are exempt
            (
                doc! { "payment_reference": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("payment_reference_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Payment transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

/// Payment transaction document
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    pub id: String,

    pub user_id: String,

    /// Gateway reference (unique)
    pub reference: String,

    pub amount: f64,

    pub currency: String,

    pub plan_type: PlanType,

    pub status: TransactionStatus,

    pub created_at: DateTime<Utc>,
}

impl IntoIndexes for Transaction {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("transaction_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "reference": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("reference_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
