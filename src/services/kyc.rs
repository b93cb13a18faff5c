//! KYC submission and review

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::auth::{Role, Session};
use crate::db::{
    kyc_review_queue, Notification, NotificationKind, Profile, ProfilePatch, PROFILE_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::gate::AccessGate;
use crate::kyc::{transition, KycDecision, KycEvent, KycStatus};
use crate::services::notifications::notify_quietly;
use crate::services::{require_profile, ServiceContext};
use crate::storage::{upload_file, Bucket};
use crate::types::{ConnectError, Result};

/// KYC fields of the caller's profile
#[derive(Debug, Clone, Serialize)]
pub struct KycView {
    pub kyc_status: KycStatus,
    pub can_upload_document: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_rejected_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_verified_at: Option<DateTime<Utc>>,
}

impl From<&Profile> for KycView {
    fn from(profile: &Profile) -> Self {
        Self {
            kyc_status: profile.kyc_status,
            can_upload_document: profile.kyc_status.can_upload_document(),
            kyc_document_url: profile.kyc_document_url.clone(),
            kyc_rejected_reason: profile.kyc_rejected_reason.clone(),
            kyc_submitted_at: profile.kyc_submitted_at,
            kyc_verified_at: profile.kyc_verified_at,
        }
    }
}

pub fn status(session: &Session) -> Result<KycView> {
    Ok(KycView::from(require_profile(session)?))
}

fn publish_profile(ctx: &ServiceContext, profile: &Profile) {
    ctx.feed.publish(
        PROFILE_COLLECTION,
        ChangeOp::Update,
        profile,
        vec![profile.id.clone()],
    );
}

/// Upload a verification document and move the profile to `under_review`.
///
/// The upload and the profile update are two calls; a failure in between
/// leaves an unreferenced document in storage.
pub async fn submit_document(
    ctx: &ServiceContext,
    session: &Session,
    file_name: &str,
    content: Bytes,
) -> Result<Profile> {
    let profile = require_profile(session)?;
    let next = transition(profile.kyc_status, &KycEvent::DocumentSubmitted)?;

    let url = upload_file(
        ctx.storage.as_ref(),
        Bucket::KycDocuments,
        &profile.id,
        file_name,
        content,
    )
    .await?;

    let patch = ProfilePatch {
        kyc_status: Some(next),
        kyc_document_url: Some(url),
        kyc_submitted_at: Some(Utc::now()),
        ..Default::default()
    };
    let updated = ctx
        .store
        .update_profile(&profile.id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("profile {}", profile.id)))?;

    info!(user_id = %updated.id, "KYC document submitted");
    publish_profile(ctx, &updated);
    Ok(updated)
}

/// Admin ruling on a document under review
pub async fn decide(
    ctx: &ServiceContext,
    session: &Session,
    user_id: &str,
    decision: KycDecision,
) -> Result<Profile> {
    AccessGate::new().roles(&[Role::Admin]).check(session)?;

    let target = ctx
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("profile {}", user_id)))?;

    let next = transition(target.kyc_status, &KycEvent::Decided(decision.clone()))?;

    let patch = match &decision {
        KycDecision::Approve => ProfilePatch {
            kyc_status: Some(next),
            kyc_verified_at: Some(Utc::now()),
            is_verified: Some(true),
            ..Default::default()
        },
        KycDecision::Reject { reason } => ProfilePatch {
            kyc_status: Some(next),
            kyc_rejected_reason: Some(reason.trim().to_string()),
            is_verified: Some(false),
            ..Default::default()
        },
    };

    let updated = ctx
        .store
        .update_profile(user_id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("profile {}", user_id)))?;

    info!(user_id = %updated.id, status = %updated.kyc_status, "KYC decision recorded");
    publish_profile(ctx, &updated);

    let (title, body) = match &decision {
        KycDecision::Approve => (
            "Identité vérifiée",
            "Votre vérification KYC a été approuvée. Vous avez désormais accès à toutes les fonctionnalités."
                .to_string(),
        ),
        KycDecision::Reject { reason } => (
            "Vérification KYC refusée",
            format!("Votre document a été refusé : {}. Vous pouvez en soumettre un nouveau.", reason.trim()),
        ),
    };
    notify_quietly(
        ctx,
        Notification::new(user_id, NotificationKind::Kyc, title, body).with_link("/kyc"),
    )
    .await;

    Ok(updated)
}

/// Profiles awaiting review, oldest submission first
pub async fn review_queue(ctx: &ServiceContext, session: &Session) -> Result<Vec<Profile>> {
    AccessGate::new().roles(&[Role::Admin]).check(session)?;
    kyc_review_queue(ctx.store.as_ref()).await
}
