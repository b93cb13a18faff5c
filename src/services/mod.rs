//! Application services
//!
//! Each service takes the caller's [`Session`] and a [`ServiceContext`]
//! and performs one operation against the store, file storage or remote
//! functions. Authorization is expressed with [`AccessGate`](crate::gate::AccessGate)
//! at the top of each operation.

pub mod accounts;
pub mod admin;
pub mod assistant;
pub mod billing;
pub mod kyc;
pub mod messaging;
pub mod notifications;
pub mod profiles;
pub mod projects;

use std::sync::Arc;

use crate::auth::{Session, SessionResolver};
use crate::db::{Profile, Store};
use crate::feed::ChangeFeed;
use crate::functions::RemoteFunctions;
use crate::gate::SIGN_IN_REQUIRED_MESSAGE;
use crate::storage::ObjectStorage;
use crate::types::{ConnectError, Result};

pub use billing::BillingConfig;

/// Collaborators shared by every service
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub feed: ChangeFeed,
    pub storage: Arc<dyn ObjectStorage>,
    pub functions: Arc<dyn RemoteFunctions>,
    pub billing: BillingConfig,
}

impl ServiceContext {
    pub fn sessions(&self) -> SessionResolver {
        SessionResolver::new(self.store.clone())
    }
}

/// Resolved profile of the caller, or 401
pub fn require_profile(session: &Session) -> Result<&Profile> {
    session
        .profile()
        .ok_or_else(|| ConnectError::Unauthorized(SIGN_IN_REQUIRED_MESSAGE.into()))
}

/// Trimmed text, `None` when blank, bounded in length
pub fn optional_text(field: &str, value: Option<String>, max_chars: usize) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_chars {
        return Err(ConnectError::validation(
            field,
            format!("{} caractères maximum", max_chars),
        ));
    }
    Ok(Some(trimmed.to_string()))
}

/// Trimmed, non-empty, bounded text
pub fn required_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    optional_text(field, Some(value.to_string()), max_chars)?
        .ok_or_else(|| ConnectError::validation(field, "Ce champ est obligatoire"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("m", None, 5).unwrap(), None);
        assert_eq!(optional_text("m", Some("   ".into()), 5).unwrap(), None);
        assert_eq!(
            optional_text("m", Some(" hi ".into()), 5).unwrap(),
            Some("hi".into())
        );
        assert!(optional_text("m", Some("toolong".into()), 5).is_err());
    }

    #[test]
    fn test_required_text() {
        let err = required_text("title", "  ", 10).unwrap_err();
        assert_eq!(err.field(), Some("title"));
    }
}
