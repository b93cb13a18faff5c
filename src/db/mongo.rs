//! MongoDB client, collection wrapper and store implementation

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::db::schemas::*;
use crate::db::{Store, WriteOutcome};
use crate::types::{ConnectError, Result};

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Whether a MongoDB error is a unique-constraint violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => {
            let error_str = err.to_string();
            error_str.contains("duplicate key") || error_str.contains("E11000")
        }
    }
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| ConnectError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;
        debug!("Collection '{}' ready", collection_name);

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| ConnectError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, reporting unique-index hits as `Conflict`
    pub async fn insert_one(&self, item: T) -> Result<WriteOutcome<T>> {
        match self.inner.insert_one(&item).await {
            Ok(_) => Ok(WriteOutcome::Created(item)),
            Err(e) if is_duplicate_key(&e) => Ok(WriteOutcome::Conflict),
            Err(e) => Err(ConnectError::Database(format!("Insert failed: {}", e))),
        }
    }

    /// Insert a document on a table without user-facing unique constraints
    pub async fn insert_plain(&self, item: T) -> Result<T> {
        match self.insert_one(item).await? {
            WriteOutcome::Created(item) => Ok(item),
            WriteOutcome::Conflict => Err(ConnectError::Database("Duplicate row id".into())),
        }
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| ConnectError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, optionally sorted
    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> Result<Vec<T>> {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = self
            .inner
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| ConnectError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| ConnectError::Database(format!("Error reading documents: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| ConnectError::Database(format!("Update failed: {}", e)))
    }

    /// Update many documents
    pub async fn update_many(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult> {
        self.inner
            .update_many(filter, update.into())
            .await
            .map_err(|e| ConnectError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document and return it after the update
    pub async fn find_one_and_set(&self, filter: Document, set: Document) -> Result<Option<T>> {
        self.inner
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(mongodb::options::ReturnDocument::After)
            .await
            .map_err(|e| ConnectError::Database(format!("Update failed: {}", e)))
    }
}

/// Store backed by MongoDB collections
#[derive(Clone)]
pub struct MongoStore {
    credentials: MongoCollection<Credential>,
    profiles: MongoCollection<Profile>,
    subscriptions: MongoCollection<Subscription>,
    transactions: MongoCollection<Transaction>,
    projects: MongoCollection<Project>,
    connection_requests: MongoCollection<ConnectionRequest>,
    interests: MongoCollection<ProjectInterest>,
    conversations: MongoCollection<Conversation>,
    messages: MongoCollection<Message>,
    notifications: MongoCollection<Notification>,
}

impl MongoStore {
    /// Open every collection and apply its indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            credentials: client.collection(CREDENTIAL_COLLECTION).await?,
            profiles: client.collection(PROFILE_COLLECTION).await?,
            subscriptions: client.collection(SUBSCRIPTION_COLLECTION).await?,
            transactions: client.collection(TRANSACTION_COLLECTION).await?,
            projects: client.collection(PROJECT_COLLECTION).await?,
            connection_requests: client.collection(CONNECTION_REQUEST_COLLECTION).await?,
            interests: client.collection(PROJECT_INTEREST_COLLECTION).await?,
            conversations: client.collection(CONVERSATION_COLLECTION).await?,
            messages: client.collection(MESSAGE_COLLECTION).await?,
            notifications: client.collection(NOTIFICATION_COLLECTION).await?,
        })
    }
}

fn newest_first() -> Option<Document> {
    Some(doc! { "created_at": -1 })
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_credential(&self, credential: Credential) -> Result<WriteOutcome<Credential>> {
        self.credentials.insert_one(credential).await
    }

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>> {
        self.credentials
            .find_one(doc! { "email": normalize_email(email) })
            .await
    }

    async fn insert_profile(&self, profile: Profile) -> Result<WriteOutcome<Profile>> {
        self.profiles.insert_one(profile).await
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.profiles.find_one(doc! { "id": id }).await
    }

    async fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<Option<Profile>> {
        let set = patch.to_set_document()?;
        self.profiles.find_one_and_set(doc! { "id": id }, set).await
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>> {
        self.profiles
            .find_many(filter.to_document()?, newest_first())
            .await
    }

    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let active = bson::to_bson(&SubscriptionStatus::Active)?;
        let rows = self
            .subscriptions
            .find_many(doc! { "user_id": user_id, "status": active }, None)
            .await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter(|s| !s.is_lapsed(now))
            .max_by_key(|s| s.start_date))
    }

    async fn insert_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<WriteOutcome<Subscription>> {
        self.subscriptions.insert_one(subscription).await
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let mut rows = self
            .subscriptions
            .find_many(doc! { "user_id": user_id }, None)
            .await?;
        rows.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(rows)
    }

    async fn set_subscription_status(&self, id: &str, status: SubscriptionStatus) -> Result<bool> {
        let result = self
            .subscriptions
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "status": bson::to_bson(&status)? } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        // Dates are stored as RFC 3339 strings; compare in process.
        let active = bson::to_bson(&SubscriptionStatus::Active)?;
        let rows = self
            .subscriptions
            .find_many(
                doc! { "status": active, "end_date": { "$exists": true } },
                None,
            )
            .await?;
        Ok(rows.into_iter().filter(|s| s.is_lapsed(now)).collect())
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<WriteOutcome<Transaction>> {
        self.transactions.insert_one(tx).await
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>> {
        self.transactions
            .find_one(doc! { "reference": reference })
            .await
    }

    async fn set_transaction_status(
        &self,
        reference: &str,
        status: TransactionStatus,
    ) -> Result<bool> {
        let result = self
            .transactions
            .update_one(
                doc! { "reference": reference },
                doc! { "$set": { "status": bson::to_bson(&status)? } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn insert_project(&self, project: Project) -> Result<Project> {
        self.projects.insert_plain(project).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.projects.find_one(doc! { "id": id }).await
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>> {
        let set = patch.to_set_document()?;
        self.projects.find_one_and_set(doc! { "id": id }, set).await
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        self.projects
            .find_many(filter.to_document()?, newest_first())
            .await
    }

    async fn insert_connection_request(
        &self,
        request: ConnectionRequest,
    ) -> Result<WriteOutcome<ConnectionRequest>> {
        self.connection_requests.insert_one(request).await
    }

    async fn get_connection_request(&self, id: &str) -> Result<Option<ConnectionRequest>> {
        self.connection_requests.find_one(doc! { "id": id }).await
    }

    async fn answer_connection_request(
        &self,
        id: &str,
        status: RequestStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionRequest>> {
        let pending = bson::to_bson(&RequestStatus::Pending)?;
        let set = doc! {
            "status": bson::to_bson(&status)?,
            "responded_at": bson::to_bson(&responded_at)?,
        };
        self.connection_requests
            .find_one_and_set(doc! { "id": id, "status": pending }, set)
            .await
    }

    async fn list_connection_requests(
        &self,
        party: &PartyFilter,
    ) -> Result<Vec<ConnectionRequest>> {
        self.connection_requests
            .find_many(party.to_document(), newest_first())
            .await
    }

    async fn insert_interest(
        &self,
        interest: ProjectInterest,
    ) -> Result<WriteOutcome<ProjectInterest>> {
        self.interests.insert_one(interest).await
    }

    async fn list_interests(&self, party: &PartyFilter) -> Result<Vec<ProjectInterest>> {
        self.interests
            .find_many(party.to_document(), newest_first())
            .await
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<WriteOutcome<Conversation>> {
        self.conversations.insert_one(conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.conversations.find_one(doc! { "id": id }).await
    }

    async fn find_conversation(
        &self,
        investor_id: &str,
        entrepreneur_id: &str,
        project_id: &str,
    ) -> Result<Option<Conversation>> {
        self.conversations
            .find_one(doc! {
                "investor_id": investor_id,
                "entrepreneur_id": entrepreneur_id,
                "project_id": project_id,
            })
            .await
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut rows = self
            .conversations
            .find_many(
                doc! { "$or": [ { "investor_id": user_id }, { "entrepreneur_id": user_id } ] },
                None,
            )
            .await?;
        // Most recent activity first; a conversation without messages counts from creation
        rows.sort_by(|a, b| {
            let a_at = a.last_message_at.unwrap_or(a.created_at);
            let b_at = b.last_message_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at)
        });
        Ok(rows)
    }

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conversations
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "last_message_at": bson::to_bson(&at)? } },
            )
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: Message) -> Result<Message> {
        self.messages.insert_plain(message).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.messages
            .find_many(
                doc! { "conversation_id": conversation_id },
                Some(doc! { "created_at": 1 }),
            )
            .await
    }

    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let result = self
            .messages
            .update_many(
                doc! {
                    "conversation_id": conversation_id,
                    "sender_id": { "$ne": reader_id },
                    "read": false,
                },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn insert_notification(&self, notification: Notification) -> Result<Notification> {
        self.notifications.insert_plain(notification).await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let mut filter = doc! { "user_id": user_id };
        if unread_only {
            filter.insert("read", false);
        }
        self.notifications.find_many(filter, newest_first()).await
    }

    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = self
            .notifications
            .update_one(
                doc! { "id": id, "user_id": user_id },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        let result = self
            .notifications
            .update_many(
                doc! { "user_id": user_id, "read": false },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance.
    // The same Store contract is exercised against MemoryStore.
}
