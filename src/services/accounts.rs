//! Built-in identity provider: sign-up and login
//!
//! Sign-up writes the credential first (unique on email) and then the
//! profile with `role` derived from the chosen `user_type`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, JwtValidator, TokenInput, UserType};
use crate::db::{new_id, normalize_email, Credential, Profile, WriteOutcome, PROFILE_COLLECTION};
use crate::feed::ChangeOp;
use crate::services::{required_text, ServiceContext};
use crate::types::{ConnectError, Result};

pub const EMAIL_TAKEN_MESSAGE: &str = "Un compte existe déjà avec cette adresse e-mail.";

const INVALID_CREDENTIALS_MESSAGE: &str = "Identifiants invalides";

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub user_type: UserType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub expires_in: u64,
}

fn validate_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid || email.chars().count() > 254 {
        return Err(ConnectError::validation("email", "Adresse e-mail invalide"));
    }
    Ok(email)
}

fn issue(jwt: &JwtValidator, user_id: &str, email: &str) -> Result<AuthResponse> {
    let token = jwt.generate_token(TokenInput {
        user_id: user_id.to_string(),
        email: email.to_string(),
    })?;
    Ok(AuthResponse {
        token,
        user_id: user_id.to_string(),
        email: email.to_string(),
        expires_in: jwt.expiry_seconds(),
    })
}

pub async fn sign_up(ctx: &ServiceContext, jwt: &JwtValidator, request: SignUpRequest) -> Result<AuthResponse> {
    let email = validate_email(&request.email)?;
    let full_name = required_text("full_name", &request.full_name, 120)?;
    let password_hash = hash_password(&request.password)?;

    let user_id = new_id();
    let credential = Credential::new(user_id.clone(), &email, password_hash);
    if let WriteOutcome::Conflict = ctx.store.insert_credential(credential).await? {
        return Err(ConnectError::Conflict(EMAIL_TAKEN_MESSAGE.into()));
    }

    let profile = Profile::new(user_id.clone(), email.clone(), full_name, request.user_type);
    let profile = match ctx.store.insert_profile(profile).await? {
        WriteOutcome::Created(profile) => profile,
        WriteOutcome::Conflict => {
            return Err(ConnectError::Internal(format!(
                "profile {} already exists",
                user_id
            )))
        }
    };

    info!(user_id = %profile.id, user_type = %profile.user_type, "User signed up");
    ctx.feed.publish(
        PROFILE_COLLECTION,
        ChangeOp::Insert,
        &profile,
        vec![profile.id.clone()],
    );
    issue(jwt, &profile.id, &email)
}

pub async fn log_in(ctx: &ServiceContext, jwt: &JwtValidator, request: LoginRequest) -> Result<AuthResponse> {
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(ConnectError::BadRequest(
            "Missing required fields: email, password".into(),
        ));
    }

    let credential = match ctx.store.find_credential(&email).await? {
        Some(c) if c.is_active => c,
        _ => {
            warn!("Login failed - unknown account");
            return Err(ConnectError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.into()));
        }
    };

    if !verify_password(&request.password, &credential.password_hash)? {
        warn!(user_id = %credential.user_id, "Login failed - invalid password");
        return Err(ConnectError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.into()));
    }

    info!(user_id = %credential.user_id, "Login successful");
    issue(jwt, &credential.user_id, &credential.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Role};
    use crate::kyc::KycStatus;
    use crate::services::testing::context;
    use hyper::StatusCode;

    fn signup(email: &str, user_type: UserType) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: "motdepasse-solide".into(),
            full_name: "Awa Diop".into(),
            user_type,
        }
    }

    #[tokio::test]
    async fn test_sign_up_sets_role_from_user_type() {
        let (ctx, _) = context();
        let jwt = JwtValidator::new_dev();

        let auth = sign_up(&ctx, &jwt, signup("Awa@Example.com", UserType::Investor))
            .await
            .unwrap();
        assert_eq!(auth.email, "awa@example.com");

        let claims = jwt.verify_token(&auth.token).claims.unwrap();
        let session = ctx.sessions().resolve(Identity::from(claims)).await;
        assert_eq!(session.role(), Some(Role::Investor));
        assert_eq!(session.kyc_status(), Some(KycStatus::Pending));
        assert!(!session.has_active_premium());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (ctx, _) = context();
        let jwt = JwtValidator::new_dev();
        sign_up(&ctx, &jwt, signup("awa@example.com", UserType::Investor))
            .await
            .unwrap();

        let err = sign_up(&ctx, &jwt, signup("AWA@example.com", UserType::Entrepreneur))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), EMAIL_TAKEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_log_in() {
        let (ctx, _) = context();
        let jwt = JwtValidator::new_dev();
        let created = sign_up(&ctx, &jwt, signup("awa@example.com", UserType::Entrepreneur))
            .await
            .unwrap();

        let auth = log_in(
            &ctx,
            &jwt,
            LoginRequest {
                email: " AWA@example.com ".into(),
                password: "motdepasse-solide".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(auth.user_id, created.user_id);

        let err = log_in(
            &ctx,
            &jwt,
            LoginRequest {
                email: "awa@example.com".into(),
                password: "mauvais-mot".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let (ctx, _) = context();
        let jwt = JwtValidator::new_dev();

        let err = sign_up(&ctx, &jwt, signup("not-an-email", UserType::Investor))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("email"));

        let mut short = signup("a@example.com", UserType::Investor);
        short.password = "court".into();
        let err = sign_up(&ctx, &jwt, short).await.unwrap_err();
        assert_eq!(err.field(), Some("password"));
    }
}
