//! Profile display fields

use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use crate::auth::Session;
use crate::db::{Profile, ProfilePatch, PROFILE_COLLECTION};
use crate::feed::ChangeOp;
use crate::services::{optional_text, require_profile, required_text, ServiceContext};
use crate::storage::{upload_file, Bucket};
use crate::types::{ConnectError, Result};

/// Fields the owner may edit. Role and KYC fields are not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

pub fn get_own(session: &Session) -> Result<Profile> {
    require_profile(session).cloned()
}

async fn write(ctx: &ServiceContext, id: &str, patch: ProfilePatch) -> Result<Profile> {
    let updated = ctx
        .store
        .update_profile(id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("profile {}", id)))?;
    ctx.feed.publish(
        PROFILE_COLLECTION,
        ChangeOp::Update,
        &updated,
        vec![updated.id.clone()],
    );
    Ok(updated)
}

pub async fn update_own(ctx: &ServiceContext, session: &Session, update: ProfileUpdate) -> Result<Profile> {
    let profile = require_profile(session)?;

    let full_name = match update.full_name {
        Some(name) => Some(required_text("full_name", &name, 120)?),
        None => None,
    };
    let patch = ProfilePatch {
        full_name,
        company: optional_text("company", update.company, 120)?,
        bio: optional_text("bio", update.bio, 2000)?,
        location: optional_text("location", update.location, 120)?,
        ..Default::default()
    };

    if patch.is_empty() {
        return Ok(profile.clone());
    }

    write(ctx, &profile.id, patch).await
}

pub async fn upload_avatar(
    ctx: &ServiceContext,
    session: &Session,
    file_name: &str,
    content: Bytes,
) -> Result<Profile> {
    let profile = require_profile(session)?;
    let url = upload_file(ctx.storage.as_ref(), Bucket::Avatars, &profile.id, file_name, content).await?;
    info!(user_id = %profile.id, "Avatar updated");

    write(
        ctx,
        &profile.id,
        ProfilePatch {
            avatar_url: Some(url),
            ..Default::default()
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, user};

    #[tokio::test]
    async fn test_owner_cannot_touch_role_or_kyc() {
        let (ctx, _) = context();
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Pending).await;

        let update: ProfileUpdate = serde_json::from_str(
            r#"{"full_name":"Awa Diop","role":"admin","kyc_status":"approved"}"#,
        )
        .unwrap();
        let updated = update_own(&ctx, &inv, update).await.unwrap();

        assert_eq!(updated.full_name, "Awa Diop");
        assert_eq!(updated.role, Role::Investor);
        assert_eq!(updated.kyc_status, KycStatus::Pending);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (ctx, _) = context();
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Pending).await;
        let err = update_own(
            &ctx,
            &inv,
            ProfileUpdate {
                full_name: Some(" ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("full_name"));
    }

    #[tokio::test]
    async fn test_avatar_upload_sets_url() {
        let (ctx, _) = context();
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Pending).await;
        let updated = upload_avatar(&ctx, &ent, "me.webp", Bytes::from_static(b"webp"))
            .await
            .unwrap();
        assert!(updated
            .avatar_url
            .unwrap()
            .starts_with("memory://avatars/ent/"));
    }
}
