//! Database layer for Growest Connect
//!
//! The row store is an external collaborator. Everything the service needs
//! from it is expressed by the [`Store`] trait, with a MongoDB implementation
//! for deployments and an in-memory one for dev mode and tests.

pub mod memory;
pub mod mongo;
pub mod schemas;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};
pub use schemas::*;

use crate::kyc::KycStatus;
use crate::types::Result;

/// Generate a new row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of an insert against a table with unique constraints.
///
/// Transport failures stay in the surrounding `Result`; a unique-constraint
/// hit is a normal outcome callers branch on.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Created(T),
    Conflict,
}

impl<T> WriteOutcome<T> {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }

    pub fn created(self) -> Option<T> {
        match self {
            WriteOutcome::Created(v) => Some(v),
            WriteOutcome::Conflict => None,
        }
    }
}

/// Row store used by every service
#[async_trait]
pub trait Store: Send + Sync {
    // -- credentials --------------------------------------------------------

    async fn insert_credential(&self, credential: Credential) -> Result<WriteOutcome<Credential>>;

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>>;

    // -- profiles -----------------------------------------------------------

    async fn insert_profile(&self, profile: Profile) -> Result<WriteOutcome<Profile>>;

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>>;

    /// Apply a patch in one update call; returns the updated row
    async fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<Option<Profile>>;

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>>;

    // -- subscriptions ------------------------------------------------------

    /// Most recent row with `status = active`, if any
    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;

    /// Unique on `payment_reference` when present
    async fn insert_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<WriteOutcome<Subscription>>;

    /// Every subscription row of a user, newest first
    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>>;

    async fn set_subscription_status(&self, id: &str, status: SubscriptionStatus) -> Result<bool>;

    /// Active rows whose end date has passed
    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>>;

    // -- transactions -------------------------------------------------------

    async fn insert_transaction(&self, tx: Transaction) -> Result<WriteOutcome<Transaction>>;

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>>;

    async fn set_transaction_status(&self, reference: &str, status: TransactionStatus)
        -> Result<bool>;

    // -- projects -----------------------------------------------------------

    async fn insert_project(&self, project: Project) -> Result<Project>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>>;

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;

    // -- connection requests ------------------------------------------------

    async fn insert_connection_request(
        &self,
        request: ConnectionRequest,
    ) -> Result<WriteOutcome<ConnectionRequest>>;

    async fn get_connection_request(&self, id: &str) -> Result<Option<ConnectionRequest>>;

    /// Move a pending request to `status`. `None` when no request with this id
    /// is still pending, so only one caller ever answers a request.
    async fn answer_connection_request(
        &self,
        id: &str,
        status: RequestStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionRequest>>;

    async fn list_connection_requests(&self, party: &PartyFilter) -> Result<Vec<ConnectionRequest>>;

    // -- project interests --------------------------------------------------

    async fn insert_interest(&self, interest: ProjectInterest)
        -> Result<WriteOutcome<ProjectInterest>>;

    async fn list_interests(&self, party: &PartyFilter) -> Result<Vec<ProjectInterest>>;

    // -- conversations & messages ------------------------------------------

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<WriteOutcome<Conversation>>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    async fn find_conversation(
        &self,
        investor_id: &str,
        entrepreneur_id: &str,
        project_id: &str,
    ) -> Result<Option<Conversation>>;

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>>;

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn insert_message(&self, message: Message) -> Result<Message>;

    /// Messages of a conversation, oldest first
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Mark messages not sent by `reader_id` as read; returns the count
    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64>;

    // -- notifications ------------------------------------------------------

    async fn insert_notification(&self, notification: Notification) -> Result<Notification>;

    /// Newest first
    async fn list_notifications(&self, user_id: &str, unread_only: bool)
        -> Result<Vec<Notification>>;

    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool>;

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64>;
}

/// Profiles awaiting a KYC decision, oldest submission first
pub async fn kyc_review_queue(store: &dyn Store) -> Result<Vec<Profile>> {
    let mut queue = store
        .list_profiles(&ProfileFilter {
            role: None,
            kyc_status: Some(KycStatus::UnderReview),
        })
        .await?;
    queue.sort_by_key(|p| p.kyc_submitted_at);
    Ok(queue)
}
