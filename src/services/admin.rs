//! User management for admins

use serde::Deserialize;
use tracing::info;

use crate::auth::{Role, Session};
use crate::db::{Profile, ProfileFilter, ProfilePatch, PROFILE_COLLECTION};
use crate::feed::ChangeOp;
use crate::gate::AccessGate;
use crate::kyc::KycDecision;
use crate::services::{kyc, require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

fn admin_gate() -> AccessGate {
    AccessGate::new().roles(&[Role::Admin])
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

pub async fn list_users(
    ctx: &ServiceContext,
    session: &Session,
    filter: ProfileFilter,
) -> Result<Vec<Profile>> {
    admin_gate().check(session)?;
    ctx.store.list_profiles(&filter).await
}

/// Set a user's role. Entrepreneur and investor roles also rewrite
/// `user_type`; the admin role keeps the sign-up category.
pub async fn set_role(
    ctx: &ServiceContext,
    session: &Session,
    user_id: &str,
    change: RoleChange,
) -> Result<Profile> {
    admin_gate().check(session)?;
    let admin = require_profile(session)?;
    if admin.id == user_id && change.role != Role::Admin {
        return Err(ConnectError::validation(
            "role",
            "Un administrateur ne peut pas retirer son propre rôle",
        ));
    }

    let patch = ProfilePatch {
        role: Some(change.role),
        user_type: change.role.user_type(),
        ..Default::default()
    };
    let updated = ctx
        .store
        .update_profile(user_id, patch)
        .await?
        .ok_or_else(|| ConnectError::NotFound(format!("profile {}", user_id)))?;

    info!(user_id = %updated.id, role = %updated.role, by = %admin.id, "Role changed");
    ctx.feed.publish(
        PROFILE_COLLECTION,
        ChangeOp::Update,
        &updated,
        vec![updated.id.clone()],
    );
    Ok(updated)
}

pub async fn decide_kyc(
    ctx: &ServiceContext,
    session: &Session,
    user_id: &str,
    decision: KycDecision,
) -> Result<Profile> {
    kyc::decide(ctx, session, user_id, decision).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserType;
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, session, user};
    use hyper::StatusCode;

    #[tokio::test]
    async fn test_set_role_rewrites_user_type() {
        let (ctx, _) = context();
        let admin = user(&ctx, "admin", Role::Admin, KycStatus::Approved).await;
        user(&ctx, "u", Role::Investor, KycStatus::Pending).await;

        let updated = set_role(&ctx, &admin, "u", RoleChange { role: Role::Entrepreneur })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Entrepreneur);
        assert_eq!(updated.user_type, UserType::Entrepreneur);

        let updated = set_role(&ctx, &admin, "u", RoleChange { role: Role::Admin })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.user_type, UserType::Entrepreneur);
        assert!(session(&ctx, "u").await.is_admin());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_manage_users() {
        let (ctx, _) = context();
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Approved).await;
        user(&ctx, "u", Role::Investor, KycStatus::Pending).await;

        let err = set_role(&ctx, &ent, "u", RoleChange { role: Role::Admin })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(list_users(&ctx, &ent, ProfileFilter::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_self() {
        let (ctx, _) = context();
        let admin = user(&ctx, "admin", Role::Admin, KycStatus::Approved).await;
        let err = set_role(&ctx, &admin, "admin", RoleChange { role: Role::Investor })
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("role"));
    }

    #[tokio::test]
    async fn test_list_users_filters() {
        let (ctx, _) = context();
        let admin = user(&ctx, "admin", Role::Admin, KycStatus::Approved).await;
        user(&ctx, "a", Role::Investor, KycStatus::UnderReview).await;
        user(&ctx, "b", Role::Entrepreneur, KycStatus::Pending).await;

        let investors = list_users(
            &ctx,
            &admin,
            ProfileFilter {
                role: Some(Role::Investor),
                kyc_status: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(investors.len(), 1);
        assert_eq!(investors[0].id, "a");

        let all = list_users(&ctx, &admin, ProfileFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
