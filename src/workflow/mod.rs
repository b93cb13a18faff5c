//! Investor → entrepreneur request workflow
//!
//! Connection requests move `pending → accepted | declined` and stop there.
//! Accepting opens exactly one conversation for the (investor, entrepreneur,
//! project) triple. Project interests are a lighter one-shot signal that
//! never opens a conversation.
//!
//! Duplicate detection is left to the store's unique indexes: an insert that
//! hits one comes back as [`WriteOutcome::Conflict`](crate::db::WriteOutcome)
//! and is reported to the caller as a friendly outcome, never as a failure.

pub mod connection;
pub mod interest;

pub use connection::{
    ensure_conversation, list_requests, respond, submit_request, ConnectionDecision,
    NewConnectionRequest, RespondOutcome, SubmitOutcome, ALREADY_REQUESTED_MESSAGE,
};
pub use interest::{
    list_interests, submit_interest, InterestOutcome, NewInterest, ALREADY_SENT_MESSAGE,
};

use crate::auth::{Role, Session};
use crate::db::{PartyFilter, Project, ProjectStatus};
use crate::gate::MISSING_PERMISSION_MESSAGE;
use crate::services::{require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

/// Which side of the workflow the caller lists from
pub fn party_for(session: &Session) -> Result<PartyFilter> {
    let profile = require_profile(session)?;
    match profile.role {
        Role::Investor => Ok(PartyFilter::Investor(profile.id.clone())),
        Role::Entrepreneur => Ok(PartyFilter::Entrepreneur(profile.id.clone())),
        Role::Admin => Err(ConnectError::Forbidden(MISSING_PERMISSION_MESSAGE.into())),
    }
}

/// Project an investor may act on. Drafts read as missing.
pub(crate) async fn listed_project(ctx: &ServiceContext, project_id: &str) -> Result<Project> {
    ctx.store
        .get_project(project_id)
        .await?
        .filter(|p| p.status != ProjectStatus::Draft)
        .ok_or_else(|| ConnectError::NotFound(format!("project {}", project_id)))
}
