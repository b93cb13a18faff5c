//! End-to-end connection workflow over the in-memory store
//!
//! Sign-up, KYC review, project creation, connection request, acceptance
//! and first message, checking the change feed along the way.

use bytes::Bytes;
use growest_connect::auth::{Identity, JwtValidator, Role, Session, UserType};
use growest_connect::db::{
    MemoryStore, Profile, Store, NOTIFICATION_COLLECTION, PROFILE_COLLECTION,
};
use growest_connect::feed::{ChangeEvent, ChangeFeed, ChangeFilter, FeedSubscription};
use growest_connect::functions::UnconfiguredFunctions;
use growest_connect::kyc::{KycDecision, KycStatus};
use growest_connect::services::accounts::{self, SignUpRequest};
use growest_connect::services::admin::{self, RoleChange};
use growest_connect::services::messaging::{self, NewMessage};
use growest_connect::services::projects::{self, NewProject};
use growest_connect::services::{kyc, notifications, BillingConfig, ServiceContext};
use growest_connect::storage::MemoryObjectStorage;
use growest_connect::workflow::{
    self, ConnectionDecision, InterestOutcome, NewConnectionRequest, NewInterest, SubmitOutcome,
};
use growest_connect::ConnectError;
use std::sync::Arc;
use std::time::Duration;

fn context() -> ServiceContext {
    ServiceContext {
        store: Arc::new(MemoryStore::new()),
        feed: ChangeFeed::new(256),
        storage: Arc::new(MemoryObjectStorage::default()),
        functions: Arc::new(UnconfiguredFunctions),
        billing: BillingConfig::default(),
    }
}

async fn session(ctx: &ServiceContext, user_id: &str) -> Session {
    let email = ctx
        .store
        .get_profile(user_id)
        .await
        .unwrap()
        .map(|p| p.email)
        .unwrap_or_default();
    ctx.sessions()
        .resolve(Identity {
            user_id: user_id.to_string(),
            email,
        })
        .await
}

async fn sign_up(ctx: &ServiceContext, jwt: &JwtValidator, name: &str, user_type: UserType) -> String {
    accounts::sign_up(
        ctx,
        jwt,
        SignUpRequest {
            email: format!("{}@example.com", name.to_lowercase()),
            password: "motdepasse-solide".into(),
            full_name: name.into(),
            user_type,
        },
    )
    .await
    .unwrap()
    .user_id
}

async fn admin(ctx: &ServiceContext) -> Session {
    let mut profile = Profile::new(
        "admin-1".into(),
        "admin@example.com".into(),
        "Admin".into(),
        UserType::Entrepreneur,
    );
    profile.role = Role::Admin;
    ctx.store.insert_profile(profile).await.unwrap();
    session(ctx, "admin-1").await
}

/// Collect every event already delivered to a subscription
async fn drain(subscription: &mut FeedSubscription) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(20), subscription.next()).await {
        events.push(event);
    }
    events
}

async fn approved(ctx: &ServiceContext, admin: &Session, user_id: &str) -> Session {
    let user = session(ctx, user_id).await;
    kyc::submit_document(ctx, &user, "piece-identite.pdf", Bytes::from_static(b"%PDF-1.7"))
        .await
        .unwrap();
    kyc::decide(ctx, admin, user_id, KycDecision::Approve).await.unwrap();
    session(ctx, user_id).await
}

#[tokio::test]
async fn test_request_accept_message_flow() {
    let ctx = context();
    let jwt = JwtValidator::new_dev();
    let mut notices = ctx.feed.subscribe(vec![ChangeFilter::table(NOTIFICATION_COLLECTION)]);

    let ent_id = sign_up(&ctx, &jwt, "Fatou", UserType::Entrepreneur).await;
    let inv_id = sign_up(&ctx, &jwt, "Kofi", UserType::Investor).await;
    let admin = admin(&ctx).await;

    // Investor without approved KYC is refused
    let inv = session(&ctx, &inv_id).await;
    assert_eq!(inv.role(), Some(Role::Investor));
    assert!(!inv.is_kyc_approved());
    let err = workflow::submit_request(
        &ctx,
        &inv,
        NewConnectionRequest {
            project_id: "nope".into(),
            message: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectError::Forbidden(_)));

    let ent = approved(&ctx, &admin, &ent_id).await;
    let inv = approved(&ctx, &admin, &inv_id).await;
    assert!(ent.is_kyc_approved() && inv.is_kyc_approved());

    let project = projects::create(
        &ctx,
        &ent,
        NewProject {
            title: "Ferme solaire de Thiès".into(),
            description: "Irrigation solaire pour maraîchers".into(),
            sector: "agritech".into(),
            location: Some("Thiès".into()),
            funding_goal: 25_000_000.0,
            publish: true,
        },
    )
    .await
    .unwrap();

    let request = NewConnectionRequest {
        project_id: project.id.clone(),
        message: Some("Bonjour, parlons de votre projet.".into()),
    };
    let created = match workflow::submit_request(&ctx, &inv, request.clone()).await.unwrap() {
        SubmitOutcome::Created(r) => r,
        SubmitOutcome::AlreadyRequested => panic!("first request reported as duplicate"),
    };
    assert_eq!(
        workflow::submit_request(&ctx, &inv, request).await.unwrap(),
        SubmitOutcome::AlreadyRequested
    );
    assert_eq!(workflow::list_requests(&ctx, &ent).await.unwrap().len(), 1);

    // Accepting twice yields one conversation
    let first = workflow::respond(&ctx, &ent, &created.id, ConnectionDecision::Accept)
        .await
        .unwrap();
    let second = workflow::respond(&ctx, &ent, &created.id, ConnectionDecision::Accept)
        .await
        .unwrap();
    let conversation = first.conversation.unwrap();
    assert_eq!(second.conversation.unwrap().id, conversation.id);
    assert_eq!(messaging::list_conversations(&ctx, &inv).await.unwrap().len(), 1);

    // Declining after acceptance is not a transition
    let err = workflow::respond(&ctx, &ent, &created.id, ConnectionDecision::Decline)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::InvalidTransition(_)));

    messaging::send_message(
        &ctx,
        &inv,
        &conversation.id,
        NewMessage {
            content: "Merci pour votre réponse !".into(),
        },
    )
    .await
    .unwrap();
    let thread = messaging::list_messages(&ctx, &ent, &conversation.id).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].sender_id, inv_id);

    // Each notification event is addressed to its recipient only
    let events = drain(&mut notices).await;
    assert!(!events.is_empty());
    for event in &events {
        let recipient = event.column("user_id").unwrap();
        assert!(event.is_visible_to(recipient));
        let other = if recipient == inv_id { &ent_id } else { &inv_id };
        assert!(!event.is_visible_to(other));
    }
    let inv_notices = notifications::list(&ctx, &inv, false).await.unwrap();
    assert!(inv_notices.iter().any(|n| n.title == "Demande acceptée"));
}

#[tokio::test]
async fn test_interest_sent_once() {
    let ctx = context();
    let jwt = JwtValidator::new_dev();
    let ent_id = sign_up(&ctx, &jwt, "Moussa", UserType::Entrepreneur).await;
    let inv_id = sign_up(&ctx, &jwt, "Ama", UserType::Investor).await;
    let admin = admin(&ctx).await;
    let ent = approved(&ctx, &admin, &ent_id).await;
    let inv = approved(&ctx, &admin, &inv_id).await;

    let project = projects::create(
        &ctx,
        &ent,
        NewProject {
            title: "Atelier textile".into(),
            description: "Confection de wax".into(),
            sector: "industrie".into(),
            location: None,
            funding_goal: 5_000_000.0,
            publish: true,
        },
    )
    .await
    .unwrap();

    let interest = NewInterest {
        project_id: project.id.clone(),
        amount: 1_000_000.0,
        currency: None,
        message: None,
    };
    assert!(matches!(
        workflow::submit_interest(&ctx, &inv, interest.clone()).await.unwrap(),
        InterestOutcome::Created(_)
    ));
    assert_eq!(
        workflow::submit_interest(&ctx, &inv, interest).await.unwrap(),
        InterestOutcome::AlreadySent
    );
    assert!(messaging::list_conversations(&ctx, &inv).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_draft_projects_accept_no_requests_or_interest() {
    let ctx = context();
    let jwt = JwtValidator::new_dev();
    let ent_id = sign_up(&ctx, &jwt, "Aminata", UserType::Entrepreneur).await;
    let inv_id = sign_up(&ctx, &jwt, "Yaw", UserType::Investor).await;
    let admin = admin(&ctx).await;
    let ent = approved(&ctx, &admin, &ent_id).await;
    let inv = approved(&ctx, &admin, &inv_id).await;

    let draft = projects::create(
        &ctx,
        &ent,
        NewProject {
            title: "Projet confidentiel".into(),
            description: "Pas encore publié".into(),
            sector: "fintech".into(),
            location: None,
            funding_goal: 10_000_000.0,
            publish: false,
        },
    )
    .await
    .unwrap();
    let before = ctx.store.list_notifications(&ent_id, false).await.unwrap().len();

    let err = workflow::submit_request(
        &ctx,
        &inv,
        NewConnectionRequest {
            project_id: draft.id.clone(),
            message: Some("Bonjour".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectError::NotFound(_)));

    let err = workflow::submit_interest(
        &ctx,
        &inv,
        NewInterest {
            project_id: draft.id.clone(),
            amount: 500_000.0,
            currency: None,
            message: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnectError::NotFound(_)));

    let after = ctx.store.list_notifications(&ent_id, false).await.unwrap();
    assert_eq!(after.len(), before);
    assert!(after.iter().all(|n| !n.body.contains("Projet confidentiel")));
}

#[tokio::test]
async fn test_users_cannot_rule_on_their_own_account() {
    let ctx = context();
    let jwt = JwtValidator::new_dev();
    let inv_id = sign_up(&ctx, &jwt, "Yao", UserType::Investor).await;
    let inv = session(&ctx, &inv_id).await;
    kyc::submit_document(&ctx, &inv, "passeport.png", Bytes::from_static(b"\x89PNG"))
        .await
        .unwrap();
    let inv = session(&ctx, &inv_id).await;
    assert_eq!(inv.kyc_status(), Some(KycStatus::UnderReview));
    assert!(!inv.can_upload_kyc_document());

    let err = kyc::decide(&ctx, &inv, &inv_id, KycDecision::Approve).await.unwrap_err();
    assert!(matches!(err, ConnectError::Forbidden(_)));

    let err = admin::set_role(&ctx, &inv, &inv_id, RoleChange { role: Role::Admin })
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::Forbidden(_)));

    let profile = ctx.store.get_profile(&inv_id).await.unwrap().unwrap();
    assert_eq!(profile.role, Role::Investor);
    assert_eq!(profile.kyc_status, KycStatus::UnderReview);
}

#[tokio::test]
async fn test_rejection_reopens_upload() {
    let ctx = context();
    let jwt = JwtValidator::new_dev();
    let mut profiles = ctx.feed.subscribe(vec![ChangeFilter::table(PROFILE_COLLECTION)]);
    let ent_id = sign_up(&ctx, &jwt, "Aicha", UserType::Entrepreneur).await;
    let admin = admin(&ctx).await;

    let ent = session(&ctx, &ent_id).await;
    kyc::submit_document(&ctx, &ent, "cni.jpg", Bytes::from_static(b"jpeg"))
        .await
        .unwrap();
    kyc::decide(
        &ctx,
        &admin,
        &ent_id,
        KycDecision::Reject {
            reason: "Document illisible".into(),
        },
    )
    .await
    .unwrap();

    let ent = session(&ctx, &ent_id).await;
    assert_eq!(ent.kyc_status(), Some(KycStatus::Rejected));
    assert!(ent.can_upload_kyc_document());
    assert_eq!(
        ent.profile().unwrap().kyc_rejected_reason.as_deref(),
        Some("Document illisible")
    );

    kyc::submit_document(&ctx, &ent, "cni-2.jpg", Bytes::from_static(b"jpeg2"))
        .await
        .unwrap();
    let ent = session(&ctx, &ent_id).await;
    assert_eq!(ent.kyc_status(), Some(KycStatus::UnderReview));

    // Profile updates are only visible to their owner
    let events = drain(&mut profiles).await;
    assert!(events
        .iter()
        .filter(|e| e.column("id") == Some(ent_id.as_str()))
        .all(|e| e.is_visible_to(&ent_id) && !e.is_visible_to("someone-else")));
}
