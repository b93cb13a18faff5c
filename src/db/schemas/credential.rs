//! Credential document schema
//!
//! Stores email/password credentials for the built-in identity provider.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for credentials
pub const CREDENTIAL_COLLECTION: &str = "credentials";

/// Credential document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Credential {
    /// Auth identity (also the profile id)
    pub user_id: String,

    /// Lower-cased login email
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Credential {
    pub fn new(user_id: String, email: &str, password_hash: String) -> Self {
        Self {
            user_id,
            email: normalize_email(email),
            password_hash,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IntoIndexes for Credential {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
