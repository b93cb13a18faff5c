//! In-memory row store
//!
//! Used in dev mode when MongoDB is unreachable, and by tests. Unique
//! constraints mirror the MongoDB indexes declared by each schema and are
//! checked atomically through `DashMap::entry`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::schemas::*;
use crate::db::{Store, WriteOutcome};
use crate::types::Result;

type PairKey = (String, String);
type TripleKey = (String, String, String);

/// Process-local store backed by concurrent maps
#[derive(Default)]
pub struct MemoryStore {
    credentials: DashMap<String, Credential>,
    profiles: DashMap<String, Profile>,
    subscriptions: DashMap<String, Subscription>,
    subscription_refs: DashMap<String, String>,
    transactions: DashMap<String, Transaction>,
    projects: DashMap<String, Project>,
    connection_requests: DashMap<String, ConnectionRequest>,
    connection_request_keys: DashMap<PairKey, String>,
    interests: DashMap<PairKey, ProjectInterest>,
    conversations: DashMap<String, Conversation>,
    conversation_keys: DashMap<TripleKey, String>,
    messages: DashMap<String, Message>,
    notifications: DashMap<String, Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations held (test helper)
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of subscription rows held (test helper)
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_credential(&self, credential: Credential) -> Result<WriteOutcome<Credential>> {
        match self.credentials.entry(credential.email.clone()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                Ok(WriteOutcome::Created(credential))
            }
        }
    }

    async fn find_credential(&self, email: &str) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .get(&normalize_email(email))
            .map(|c| c.clone()))
    }

    async fn insert_profile(&self, profile: Profile) -> Result<WriteOutcome<Profile>> {
        match self.profiles.entry(profile.id.clone()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(WriteOutcome::Created(profile))
            }
        }
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.profiles.get(id).map(|p| p.clone()))
    }

    async fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<Option<Profile>> {
        Ok(self.profiles.get_mut(id).map(|mut p| {
            p.apply(&patch);
            p.clone()
        }))
    }

    async fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>> {
        let mut rows: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|p| filter.matches(p.value()))
            .map(|p| p.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let now = Utc::now();
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| {
                s.user_id == user_id && s.status == SubscriptionStatus::Active && !s.is_lapsed(now)
            })
            .max_by_key(|s| s.start_date)
            .map(|s| s.clone()))
    }

    async fn insert_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<WriteOutcome<Subscription>> {
        if let Some(reference) = &subscription.payment_reference {
            match self.subscription_refs.entry(reference.clone()) {
                Entry::Occupied(_) => return Ok(WriteOutcome::Conflict),
                Entry::Vacant(slot) => {
                    slot.insert(subscription.id.clone());
                }
            }
        }
        self.subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(WriteOutcome::Created(subscription))
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let mut rows: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect();
        rows.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(rows)
    }

    async fn set_subscription_status(&self, id: &str, status: SubscriptionStatus) -> Result<bool> {
        Ok(self
            .subscriptions
            .get_mut(id)
            .map(|mut s| s.status = status)
            .is_some())
    }

    async fn lapsed_subscriptions(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.is_lapsed(now))
            .map(|s| s.clone())
            .collect())
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<WriteOutcome<Transaction>> {
        match self.transactions.entry(tx.reference.clone()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                Ok(WriteOutcome::Created(tx))
            }
        }
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>> {
        Ok(self.transactions.get(reference).map(|t| t.clone()))
    }

    async fn set_transaction_status(
        &self,
        reference: &str,
        status: TransactionStatus,
    ) -> Result<bool> {
        Ok(self
            .transactions
            .get_mut(reference)
            .map(|mut t| t.status = status)
            .is_some())
    }

    async fn insert_project(&self, project: Project) -> Result<Project> {
        self.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(id).map(|p| p.clone()))
    }

    async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>> {
        Ok(self.projects.get_mut(id).map(|mut p| {
            p.apply(&patch);
            p.clone()
        }))
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut rows: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| filter.matches(p.value()))
            .map(|p| p.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_connection_request(
        &self,
        request: ConnectionRequest,
    ) -> Result<WriteOutcome<ConnectionRequest>> {
        let key = (request.investor_id.clone(), request.project_id.clone());
        match self.connection_request_keys.entry(key) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(request.id.clone());
                self.connection_requests
                    .insert(request.id.clone(), request.clone());
                Ok(WriteOutcome::Created(request))
            }
        }
    }

    async fn get_connection_request(&self, id: &str) -> Result<Option<ConnectionRequest>> {
        Ok(self.connection_requests.get(id).map(|r| r.clone()))
    }

    async fn answer_connection_request(
        &self,
        id: &str,
        status: RequestStatus,
        responded_at: DateTime<Utc>,
    ) -> Result<Option<ConnectionRequest>> {
        let Some(mut request) = self.connection_requests.get_mut(id) else {
            return Ok(None);
        };
        if request.status != RequestStatus::Pending {
            return Ok(None);
        }
        request.status = status;
        request.responded_at = Some(responded_at);
        Ok(Some(request.clone()))
    }

    async fn list_connection_requests(
        &self,
        party: &PartyFilter,
    ) -> Result<Vec<ConnectionRequest>> {
        let mut rows: Vec<ConnectionRequest> = self
            .connection_requests
            .iter()
            .filter(|r| party.matches(&r.investor_id, &r.entrepreneur_id))
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_interest(
        &self,
        interest: ProjectInterest,
    ) -> Result<WriteOutcome<ProjectInterest>> {
        let key = (interest.investor_id.clone(), interest.project_id.clone());
        match self.interests.entry(key) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(interest.clone());
                Ok(WriteOutcome::Created(interest))
            }
        }
    }

    async fn list_interests(&self, party: &PartyFilter) -> Result<Vec<ProjectInterest>> {
        let mut rows: Vec<ProjectInterest> = self
            .interests
            .iter()
            .filter(|i| party.matches(&i.investor_id, &i.entrepreneur_id))
            .map(|i| i.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<WriteOutcome<Conversation>> {
        let key = (
            conversation.investor_id.clone(),
            conversation.entrepreneur_id.clone(),
            conversation.project_id.clone(),
        );
        match self.conversation_keys.entry(key) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                // Row first, so a key seen by find_conversation always resolves
                self.conversations
                    .insert(conversation.id.clone(), conversation.clone());
                slot.insert(conversation.id.clone());
                Ok(WriteOutcome::Created(conversation))
            }
        }
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.get(id).map(|c| c.clone()))
    }

    async fn find_conversation(
        &self,
        investor_id: &str,
        entrepreneur_id: &str,
        project_id: &str,
    ) -> Result<Option<Conversation>> {
        let key = (
            investor_id.to_string(),
            entrepreneur_id.to_string(),
            project_id.to_string(),
        );
        let id = match self.conversation_keys.get(&key) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        Ok(self.conversations.get(&id).map(|c| c.clone()))
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut rows: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.has_participant(user_id))
            .map(|c| c.clone())
            .collect();
        rows.sort_by(|a, b| {
            let a_at = a.last_message_at.unwrap_or(a.created_at);
            let b_at = b.last_message_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at)
        });
        Ok(rows)
    }

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut c) = self.conversations.get_mut(id) {
            c.last_message_at = Some(at);
        }
        Ok(())
    }

    async fn insert_message(&self, message: Message) -> Result<Message> {
        self.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut rows: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.clone())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn mark_messages_read(&self, conversation_id: &str, reader_id: &str) -> Result<u64> {
        let mut count = 0;
        for mut m in self.messages.iter_mut() {
            if m.conversation_id == conversation_id && m.sender_id != reader_id && !m.read {
                m.read = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_notification(&self, notification: Notification) -> Result<Notification> {
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .map(|n| n.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        match self.notifications.get_mut(id) {
            Some(mut n) if n.user_id == user_id => {
                n.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        let mut count = 0;
        for mut n in self.notifications.iter_mut() {
            if n.user_id == user_id && !n.read {
                n.read = true;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_id;

    fn request(investor: &str, project: &str) -> ConnectionRequest {
        ConnectionRequest {
            id: new_id(),
            investor_id: investor.into(),
            entrepreneur_id: "ent".into(),
            project_id: project.into(),
            status: RequestStatus::Pending,
            message: None,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    #[tokio::test]
    async fn test_connection_request_unique_per_investor_project() {
        let store = MemoryStore::new();
        let first = store
            .insert_connection_request(request("inv", "p1"))
            .await
            .unwrap();
        assert!(!first.is_conflict());

        let dup = store
            .insert_connection_request(request("inv", "p1"))
            .await
            .unwrap();
        assert!(dup.is_conflict());

        let other_project = store
            .insert_connection_request(request("inv", "p2"))
            .await
            .unwrap();
        assert!(!other_project.is_conflict());

        let mine = store
            .list_connection_requests(&PartyFilter::Investor("inv".into()))
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_connection_request_answered_once() {
        let store = MemoryStore::new();
        let pending = request("inv", "p1");
        store.insert_connection_request(pending.clone()).await.unwrap();

        let answered = store
            .answer_connection_request(&pending.id, RequestStatus::Accepted, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(answered.status, RequestStatus::Accepted);
        assert!(answered.responded_at.is_some());

        for status in [RequestStatus::Accepted, RequestStatus::Declined] {
            assert!(store
                .answer_connection_request(&pending.id, status, Utc::now())
                .await
                .unwrap()
                .is_none());
        }
        let current = store.get_connection_request(&pending.id).await.unwrap().unwrap();
        assert_eq!(current.status, RequestStatus::Accepted);
        assert!(store
            .answer_connection_request("missing", RequestStatus::Accepted, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_lapsed_subscription_is_not_active() {
        let store = MemoryStore::new();
        let start = Utc::now() - chrono::Duration::days(40);
        store
            .insert_subscription(Subscription {
                id: new_id(),
                user_id: "u1".into(),
                plan_type: crate::premium::PlanType::Capital,
                status: SubscriptionStatus::Active,
                start_date: start,
                end_date: Some(start + chrono::Duration::days(30)),
                amount: 15_000.0,
                currency: "XOF".into(),
                payment_reference: None,
            })
            .await
            .unwrap();

        assert!(store.active_subscription("u1").await.unwrap().is_none());
        assert_eq!(store.lapsed_subscriptions(Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_credentials_match_case_insensitively() {
        let store = MemoryStore::new();
        let cred = Credential::new("u1".into(), "Awa@Example.com", "hash".into());
        store.insert_credential(cred).await.unwrap();

        let found = store.find_credential("awa@example.COM").await.unwrap();
        assert_eq!(found.map(|c| c.user_id), Some("u1".to_string()));

        let dup = Credential::new("u2".into(), "awa@example.com", "hash".into());
        assert!(store.insert_credential(dup).await.unwrap().is_conflict());
    }

    #[tokio::test]
    async fn test_mark_messages_read_skips_own_messages() {
        let store = MemoryStore::new();
        for sender in ["a", "b", "b"] {
            store
                .insert_message(Message {
                    id: new_id(),
                    conversation_id: "c1".into(),
                    sender_id: sender.into(),
                    content: "hi".into(),
                    read: false,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.mark_messages_read("c1", "a").await.unwrap(), 2);
        assert_eq!(store.mark_messages_read("c1", "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notification_read_requires_owner() {
        let store = MemoryStore::new();
        let n = store
            .insert_notification(Notification::new(
                "u1",
                NotificationKind::Match,
                "t",
                "b",
            ))
            .await
            .unwrap();
        assert!(!store.mark_notification_read(&n.id, "u2").await.unwrap());
        assert!(store.mark_notification_read(&n.id, "u1").await.unwrap());
        assert!(store.list_notifications("u1", true).await.unwrap().is_empty());
    }
}
