//! Profile document schema
//!
//! One profile per user, keyed by the auth identity.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::{Role, UserType};
use crate::db::mongo::IntoIndexes;
use crate::kyc::KycStatus;

/// Collection name for profiles
pub const PROFILE_COLLECTION: &str = "profiles";

/// Profile document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    /// Auth identity of the owner
    pub id: String,

    pub email: String,

    pub full_name: String,

    /// Category chosen at sign-up (display only)
    pub user_type: UserType,

    /// Authorization role (admin-managed)
    pub role: Role,

    #[serde(default)]
    pub kyc_status: KycStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_document_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_rejected_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_submitted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_verified_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Profile for a freshly signed-up user. Role follows the chosen category.
    pub fn new(id: String, email: String, full_name: String, user_type: UserType) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            full_name,
            user_type,
            role: user_type.initial_role(),
            kyc_status: KycStatus::Pending,
            kyc_document_url: None,
            kyc_rejected_reason: None,
            kyc_submitted_at: None,
            kyc_verified_at: None,
            is_verified: false,
            company: None,
            bio: None,
            location: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch in place. Used by the in-memory store; MongoDB applies
    /// the same fields through `ProfilePatch::to_set_document`.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(v) = &patch.full_name {
            self.full_name = v.clone();
        }
        if let Some(v) = &patch.company {
            self.company = Some(v.clone());
        }
        if let Some(v) = &patch.bio {
            self.bio = Some(v.clone());
        }
        if let Some(v) = &patch.location {
            self.location = Some(v.clone());
        }
        if let Some(v) = &patch.avatar_url {
            self.avatar_url = Some(v.clone());
        }
        if let Some(v) = patch.role {
            self.role = v;
        }
        if let Some(v) = patch.user_type {
            self.user_type = v;
        }
        if let Some(v) = patch.kyc_status {
            self.kyc_status = v;
        }
        if let Some(v) = &patch.kyc_document_url {
            self.kyc_document_url = Some(v.clone());
        }
        if let Some(v) = &patch.kyc_rejected_reason {
            self.kyc_rejected_reason = Some(v.clone());
        }
        if let Some(v) = patch.kyc_submitted_at {
            self.kyc_submitted_at = Some(v);
        }
        if let Some(v) = patch.kyc_verified_at {
            self.kyc_verified_at = Some(v);
        }
        if let Some(v) = patch.is_verified {
            self.is_verified = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a profile, written in a single store call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<Role>,
    pub user_type: Option<UserType>,
    pub kyc_status: Option<KycStatus>,
    pub kyc_document_url: Option<String>,
    pub kyc_rejected_reason: Option<String>,
    pub kyc_submitted_at: Option<DateTime<Utc>>,
    pub kyc_verified_at: Option<DateTime<Utc>>,
    pub is_verified: Option<bool>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == ProfilePatch::default()
    }

    /// Build the `$set` document for MongoDB
    pub fn to_set_document(&self) -> Result<Document, bson::ser::Error> {
        let mut set = Document::new();
        if let Some(v) = &self.full_name {
            set.insert("full_name", v);
        }
        if let Some(v) = &self.company {
            set.insert("company", v);
        }
        if let Some(v) = &self.bio {
            set.insert("bio", v);
        }
        if let Some(v) = &self.location {
            set.insert("location", v);
        }
        if let Some(v) = &self.avatar_url {
            set.insert("avatar_url", v);
        }
        if let Some(v) = self.role {
            set.insert("role", bson::to_bson(&v)?);
        }
        if let Some(v) = self.user_type {
            set.insert("user_type", bson::to_bson(&v)?);
        }
        if let Some(v) = self.kyc_status {
            set.insert("kyc_status", bson::to_bson(&v)?);
        }
        if let Some(v) = &self.kyc_document_url {
            set.insert("kyc_document_url", v);
        }
        if let Some(v) = &self.kyc_rejected_reason {
            set.insert("kyc_rejected_reason", v);
        }
        if let Some(v) = self.kyc_submitted_at {
            set.insert("kyc_submitted_at", bson::to_bson(&v)?);
        }
        if let Some(v) = self.kyc_verified_at {
            set.insert("kyc_verified_at", bson::to_bson(&v)?);
        }
        if let Some(v) = self.is_verified {
            set.insert("is_verified", v);
        }
        set.insert("updated_at", bson::to_bson(&Utc::now())?);
        Ok(set)
    }
}

/// Admin listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFilter {
    pub role: Option<Role>,
    pub kyc_status: Option<KycStatus>,
}

impl ProfileFilter {
    pub fn matches(&self, profile: &Profile) -> bool {
        self.role.map_or(true, |r| profile.role == r)
            && self.kyc_status.map_or(true, |s| profile.kyc_status == s)
    }

    pub fn to_document(&self) -> Result<Document, bson::ser::Error> {
        let mut filter = Document::new();
        if let Some(r) = self.role {
            filter.insert("role", bson::to_bson(&r)?);
        }
        if let Some(s) = self.kyc_status {
            filter.insert("kyc_status", bson::to_bson(&s)?);
        }
        Ok(filter)
    }
}

impl IntoIndexes for Profile {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("profile_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "kyc_status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("kyc_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
