//! Session resolution
//!
//! A [`Session`] is an immutable snapshot of who the caller is: identity,
//! profile row and active subscription. Every predicate fails closed while
//! the snapshot is loading or when no profile could be resolved.
//!
//! [`SessionContext`] owns the current snapshot for a long-lived client
//! (the realtime socket) and replaces it whenever the identity changes or
//! the change feed reports a write to the user's own profile or
//! subscription row.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::{Claims, Role};
use crate::db::{Profile, Store, Subscription, PROFILE_COLLECTION, SUBSCRIPTION_COLLECTION};
use crate::feed::{ChangeFeed, ChangeFilter};
use crate::kyc::KycStatus;
use crate::premium::{PlanType, PremiumStatus};

/// Authenticated identity from the session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
        }
    }
}

/// Immutable view of the caller's authorization state
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub subscription: Option<Subscription>,
    pub loading: bool,
}

impl Session {
    /// Snapshot published before the first lookup completes
    pub fn loading(identity: Option<Identity>) -> Self {
        Self {
            identity,
            loading: true,
            ..Default::default()
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn resolved(
        identity: Identity,
        profile: Option<Profile>,
        subscription: Option<Subscription>,
    ) -> Self {
        Self {
            identity: Some(identity),
            profile,
            subscription,
            loading: false,
        }
    }

    /// Profile, unless still loading
    pub fn profile(&self) -> Option<&Profile> {
        if self.loading {
            return None;
        }
        self.profile.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.profile().map(|p| p.id.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.profile().map(|p| p.role)
    }

    pub fn kyc_status(&self) -> Option<KycStatus> {
        self.profile().map(|p| p.kyc_status)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn is_entrepreneur(&self) -> bool {
        self.role() == Some(Role::Entrepreneur)
    }

    pub fn is_investor(&self) -> bool {
        self.role() == Some(Role::Investor)
    }

    pub fn is_kyc_approved(&self) -> bool {
        self.kyc_status() == Some(KycStatus::Approved)
    }

    pub fn can_upload_kyc_document(&self) -> bool {
        self.kyc_status()
            .is_some_and(|status| status.can_upload_document())
    }

    /// Premium state derived from the active subscription row
    pub fn premium(&self) -> PremiumStatus {
        if self.loading || self.profile.is_none() {
            return PremiumStatus::default();
        }
        PremiumStatus::from_subscription(self.subscription.as_ref())
    }

    pub fn premium_plan(&self) -> Option<PlanType> {
        self.premium().premium_plan
    }

    pub fn has_active_premium(&self) -> bool {
        self.premium().has_active_premium
    }

    /// Client-facing summary
    pub fn view(&self) -> SessionView<'_> {
        let premium = self.premium();
        SessionView {
            loading: self.loading,
            identity: self.identity.as_ref(),
            profile: self.profile(),
            role: self.role(),
            kyc_status: self.kyc_status(),
            is_admin: self.is_admin(),
            is_entrepreneur: self.is_entrepreneur(),
            is_investor: self.is_investor(),
            is_kyc_approved: self.is_kyc_approved(),
            can_upload_kyc_document: self.can_upload_kyc_document(),
            premium_plan: premium.premium_plan,
            has_active_premium: premium.has_active_premium,
        }
    }
}

/// Serialized form of a session returned by `/auth/me` and the realtime socket
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView<'a> {
    pub loading: bool,
    pub identity: Option<&'a Identity>,
    pub profile: Option<&'a Profile>,
    pub role: Option<Role>,
    pub kyc_status: Option<KycStatus>,
    pub is_admin: bool,
    pub is_entrepreneur: bool,
    pub is_investor: bool,
    pub is_kyc_approved: bool,
    pub can_upload_kyc_document: bool,
    pub premium_plan: Option<PlanType>,
    pub has_active_premium: bool,
}

/// Resolves sessions from the store
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn Store>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Load the profile and active subscription for an identity.
    ///
    /// Lookup failures are logged and produce a snapshot with no profile,
    /// which every gate treats as "no access".
    pub async fn resolve(&self, identity: Identity) -> Session {
        let profile = match self.store.get_profile(&identity.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %identity.user_id, "Profile lookup failed: {}", e);
                return Session::resolved(identity, None, None);
            }
        };

        if profile.is_none() {
            debug!(user_id = %identity.user_id, "No profile for identity");
            return Session::resolved(identity, None, None);
        }

        let subscription = match self.store.active_subscription(&identity.user_id).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(user_id = %identity.user_id, "Subscription lookup failed: {}", e);
                return Session::resolved(identity, None, None);
            }
        };

        Session::resolved(identity, profile, subscription)
    }
}

/// Owner of the current session snapshot for one client
pub struct SessionContext {
    resolver: SessionResolver,
    identity: RwLock<Option<Identity>>,
    generation: AtomicU64,
    sender: watch::Sender<Arc<Session>>,
}

impl SessionContext {
    /// New context in the loading state
    pub fn new(resolver: SessionResolver) -> Self {
        let (sender, _) = watch::channel(Arc::new(Session::loading(None)));
        Self {
            resolver,
            identity: RwLock::new(None),
            generation: AtomicU64::new(0),
            sender,
        }
    }

    pub fn current(&self) -> Arc<Session> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Session>> {
        self.sender.subscribe()
    }

    /// Switch identity (sign-in, sign-out or token refresh) and re-resolve
    pub async fn set_identity(&self, identity: Option<Identity>) {
        {
            let mut current = self.identity.write().await;
            if *current == identity && !self.current().loading {
                return;
            }
            *current = identity.clone();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.sender
            .send_replace(Arc::new(Session::loading(identity.clone())));
        self.resolve_and_publish(identity, generation).await;
    }

    /// Re-resolve the current identity
    pub async fn refresh(&self) {
        let identity = self.identity.read().await.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.resolve_and_publish(identity, generation).await;
    }

    async fn resolve_and_publish(&self, identity: Option<Identity>, generation: u64) {
        let session = match identity {
            Some(identity) => self.resolver.resolve(identity).await,
            None => Session::signed_out(),
        };

        // A newer identity change or refresh supersedes this result
        if self.generation.load(Ordering::SeqCst) == generation {
            self.sender.send_replace(Arc::new(session));
        }
    }

    /// Whether a change event concerns the current user's profile or subscription
    async fn concerns_current_user(&self, table: &str, record_user: Option<&str>) -> bool {
        let identity = self.identity.read().await;
        match (identity.as_ref(), record_user) {
            (Some(identity), Some(user)) => {
                (table == PROFILE_COLLECTION || table == SUBSCRIPTION_COLLECTION)
                    && identity.user_id == user
            }
            _ => false,
        }
    }

    /// Re-resolve whenever the feed reports a write to this user's rows
    pub fn watch_feed(self: Arc<Self>, feed: &ChangeFeed) -> JoinHandle<()> {
        let mut subscription = feed.subscribe(vec![
            ChangeFilter::table(PROFILE_COLLECTION),
            ChangeFilter::table(SUBSCRIPTION_COLLECTION),
        ]);

        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                let owner = if event.table == PROFILE_COLLECTION {
                    event.column("id")
                } else {
                    event.column("user_id")
                };
                if self.concerns_current_user(&event.table, owner).await {
                    debug!(table = %event.table, "Session row changed, refreshing");
                    self.refresh().await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserType;
    use crate::db::{MemoryStore, ProfilePatch, SubscriptionStatus};
    use crate::feed::ChangeOp;
    use chrono::Utc;

    fn identity(id: &str) -> Identity {
        Identity {
            user_id: id.into(),
            email: format!("{id}@example.com"),
        }
    }

    fn profile(id: &str, role: Role, kyc: KycStatus) -> Profile {
        let mut p = Profile::new(
            id.into(),
            format!("{id}@example.com"),
            "Test".into(),
            UserType::Investor,
        );
        p.role = role;
        p.kyc_status = kyc;
        p
    }

    fn subscription(user: &str, plan: PlanType, status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: crate::db::new_id(),
            user_id: user.into(),
            plan_type: plan,
            status,
            start_date: Utc::now(),
            end_date: None,
            amount: 0.0,
            currency: "XOF".into(),
            payment_reference: None,
        }
    }

    #[test]
    fn test_loading_fails_closed() {
        let mut session = Session::loading(Some(identity("u1")));
        session.profile = Some(profile("u1", Role::Admin, KycStatus::Approved));

        assert!(!session.is_admin());
        assert!(!session.is_kyc_approved());
        assert!(!session.has_active_premium());
        assert!(!session.can_upload_kyc_document());
    }

    #[test]
    fn test_kyc_approved_only_when_approved() {
        for status in [KycStatus::Pending, KycStatus::UnderReview, KycStatus::Rejected] {
            let s = Session::resolved(identity("u1"), Some(profile("u1", Role::Investor, status)), None);
            assert!(!s.is_kyc_approved());
        }
        let s = Session::resolved(
            identity("u1"),
            Some(profile("u1", Role::Investor, KycStatus::Approved)),
            None,
        );
        assert!(s.is_kyc_approved());
    }

    #[test]
    fn test_non_active_subscription_is_free_tier() {
        let s = Session::resolved(
            identity("u1"),
            Some(profile("u1", Role::Investor, KycStatus::Approved)),
            Some(subscription("u1", PlanType::ProPlus, SubscriptionStatus::Trial)),
        );
        assert!(!s.has_active_premium());
        assert_eq!(s.premium_plan(), None);
    }

    #[tokio::test]
    async fn test_resolver_missing_profile() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let session = SessionResolver::new(store).resolve(identity("ghost")).await;

        assert!(!session.loading);
        assert!(session.profile.is_none());
        assert!(!session.is_investor());
    }

    #[tokio::test]
    async fn test_resolver_reads_active_subscription() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert_profile(profile("u1", Role::Entrepreneur, KycStatus::Approved))
            .await
            .unwrap();
        store
            .insert_subscription(subscription("u1", PlanType::Capital, SubscriptionStatus::Active))
            .await
            .unwrap();

        let session = SessionResolver::new(store).resolve(identity("u1")).await;
        assert!(session.is_entrepreneur());
        assert_eq!(session.premium_plan(), Some(PlanType::Capital));
    }

    #[tokio::test]
    async fn test_context_starts_loading_and_replaces_snapshot() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert_profile(profile("u1", Role::Investor, KycStatus::Pending))
            .await
            .unwrap();

        let ctx = SessionContext::new(SessionResolver::new(store.clone()));
        assert!(ctx.current().loading);

        ctx.set_identity(Some(identity("u1"))).await;
        let before = ctx.current();
        assert!(before.is_investor());
        assert!(!before.is_kyc_approved());

        store
            .update_profile(
                "u1",
                ProfilePatch {
                    kyc_status: Some(KycStatus::Approved),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ctx.refresh().await;

        // The earlier snapshot is untouched
        assert!(!before.is_kyc_approved());
        assert!(ctx.current().is_kyc_approved());

        ctx.set_identity(None).await;
        assert!(ctx.current().profile.is_none());
    }

    #[tokio::test]
    async fn test_context_refreshes_on_own_profile_event() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert_profile(profile("u1", Role::Investor, KycStatus::Pending))
            .await
            .unwrap();
        let feed = ChangeFeed::new(16);

        let ctx = Arc::new(SessionContext::new(SessionResolver::new(store.clone())));
        ctx.set_identity(Some(identity("u1"))).await;
        let mut rx = ctx.subscribe();
        rx.borrow_and_update();
        let handle = ctx.clone().watch_feed(&feed);

        let updated = store
            .update_profile(
                "u1",
                ProfilePatch {
                    kyc_status: Some(KycStatus::Approved),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        feed.publish(PROFILE_COLLECTION, ChangeOp::Update, &updated, vec![]);

        rx.changed().await.unwrap();
        assert!(rx.borrow().is_kyc_approved());
        handle.abort();
    }
}
