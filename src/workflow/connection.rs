//! Connection requests

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{Role, Session};
use crate::db::{
    new_id, ConnectionRequest, Conversation, NotificationKind, Notification, RequestStatus,
    WriteOutcome, CONNECTION_REQUEST_COLLECTION, CONVERSATION_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::gate::AccessGate;
use crate::services::notifications::notify_quietly;
use crate::services::{optional_text, require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

use super::{listed_project, party_for};

pub const ALREADY_REQUESTED_MESSAGE: &str =
    "Vous avez déjà envoyé une demande de connexion pour ce projet.";

const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewConnectionRequest {
    pub project_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Created(ConnectionRequest),
    /// A request for this (investor, project) pair already exists
    AlreadyRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionDecision {
    Accept,
    Decline,
}

impl ConnectionDecision {
    pub fn status(&self) -> RequestStatus {
        match self {
            ConnectionDecision::Accept => RequestStatus::Accepted,
            ConnectionDecision::Decline => RequestStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub request: ConnectionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
}

/// Investor with approved KYC asks to connect about a project
pub async fn submit_request(
    ctx: &ServiceContext,
    session: &Session,
    input: NewConnectionRequest,
) -> Result<SubmitOutcome> {
    AccessGate::new()
        .roles(&[Role::Investor])
        .kyc()
        .check(session)?;
    let investor = require_profile(session)?;

    let message = optional_text("message", input.message, MAX_MESSAGE_CHARS)?;
    let project = listed_project(ctx, &input.project_id).await?;

    let request = ConnectionRequest {
        id: new_id(),
        investor_id: investor.id.clone(),
        entrepreneur_id: project.entrepreneur_id.clone(),
        project_id: project.id.clone(),
        status: RequestStatus::Pending,
        message,
        created_at: Utc::now(),
        responded_at: None,
    };

    let request = match ctx.store.insert_connection_request(request).await? {
        WriteOutcome::Created(request) => request,
        WriteOutcome::Conflict => {
            debug!(investor_id = %investor.id, project_id = %project.id, "Connection already requested");
            return Ok(SubmitOutcome::AlreadyRequested);
        }
    };

    info!(request_id = %request.id, project_id = %project.id, "Connection requested");
    ctx.feed.publish(
        CONNECTION_REQUEST_COLLECTION,
        ChangeOp::Insert,
        &request,
        vec![request.investor_id.clone(), request.entrepreneur_id.clone()],
    );

    notify_quietly(
        ctx,
        Notification::new(
            &request.entrepreneur_id,
            NotificationKind::ConnectionRequest,
            "Nouvelle demande de connexion",
            format!(
                "{} souhaite échanger avec vous au sujet de « {} ».",
                investor.full_name, project.title
            ),
        )
        .with_link("/connections"),
    )
    .await;

    Ok(SubmitOutcome::Created(request))
}

/// Create the conversation for an accepted request, or return the existing one.
/// Returns whether this call created it.
pub async fn ensure_conversation(
    ctx: &ServiceContext,
    request: &ConnectionRequest,
) -> Result<(Conversation, bool)> {
    let conversation = Conversation {
        id: new_id(),
        investor_id: request.investor_id.clone(),
        entrepreneur_id: request.entrepreneur_id.clone(),
        project_id: request.project_id.clone(),
        created_at: Utc::now(),
        last_message_at: None,
    };

    match ctx.store.insert_conversation(conversation).await? {
        WriteOutcome::Created(conversation) => {
            ctx.feed.publish(
                CONVERSATION_COLLECTION,
                ChangeOp::Insert,
                &conversation,
                vec![
                    conversation.investor_id.clone(),
                    conversation.entrepreneur_id.clone(),
                ],
            );
            Ok((conversation, true))
        }
        WriteOutcome::Conflict => {
            let existing = ctx
                .store
                .find_conversation(
                    &request.investor_id,
                    &request.entrepreneur_id,
                    &request.project_id,
                )
                .await?
                .ok_or_else(|| {
                    ConnectError::Database("conversation conflict without a row".into())
                })?;
            Ok((existing, false))
        }
    }
}

/// Repeating the same decision is a no-op; reversing it is refused
fn already_answered(
    request: ConnectionRequest,
    target: RequestStatus,
) -> Result<(ConnectionRequest, bool)> {
    if request.status == target {
        Ok((request, false))
    } else {
        Err(ConnectError::InvalidTransition(format!(
            "request already {}",
            request.status.as_str()
        )))
    }
}

/// Owning entrepreneur accepts or declines a request
pub async fn respond(
    ctx: &ServiceContext,
    session: &Session,
    request_id: &str,
    decision: ConnectionDecision,
) -> Result<RespondOutcome> {
    AccessGate::new()
        .roles(&[Role::Entrepreneur])
        .check(session)?;
    let entrepreneur = require_profile(session)?;

    let request = ctx
        .store
        .get_connection_request(request_id)
        .await?
        .filter(|r| r.entrepreneur_id == entrepreneur.id)
        .ok_or_else(|| ConnectError::NotFound(format!("connection request {}", request_id)))?;

    let target = decision.status();
    let (request, first_response) = match request.status {
        RequestStatus::Pending => {
            match ctx
                .store
                .answer_connection_request(&request.id, target, Utc::now())
                .await?
            {
                Some(updated) => (updated, true),
                // Answered by someone else since the read
                None => {
                    let current = ctx
                        .store
                        .get_connection_request(&request.id)
                        .await?
                        .ok_or_else(|| {
                            ConnectError::NotFound(format!("connection request {}", request_id))
                        })?;
                    already_answered(current, target)?
                }
            }
        }
        _ => already_answered(request, target)?,
    };

    let conversation = if target == RequestStatus::Accepted {
        let (conversation, created) = ensure_conversation(ctx, &request).await?;
        debug!(conversation_id = %conversation.id, created, "Conversation ensured");
        Some(conversation)
    } else {
        None
    };

    if first_response {
        info!(request_id = %request.id, status = %target.as_str(), "Connection request answered");
        ctx.feed.publish(
            CONNECTION_REQUEST_COLLECTION,
            ChangeOp::Update,
            &request,
            vec![request.investor_id.clone(), request.entrepreneur_id.clone()],
        );

        let (title, body) = match target {
            RequestStatus::Accepted => (
                "Demande acceptée",
                format!(
                    "{} a accepté votre demande de connexion. Vous pouvez maintenant échanger.",
                    entrepreneur.full_name
                ),
            ),
            _ => (
                "Demande déclinée",
                format!("{} a décliné votre demande de connexion.", entrepreneur.full_name),
            ),
        };
        let link = match &conversation {
            Some(c) => format!("/messages/{}", c.id),
            None => "/connections".to_string(),
        };
        notify_quietly(
            ctx,
            Notification::new(
                &request.investor_id,
                NotificationKind::ConnectionResponse,
                title,
                body,
            )
            .with_link(link),
        )
        .await;
    }

    Ok(RespondOutcome {
        request,
        conversation,
    })
}

/// Requests sent (investor) or received (entrepreneur), newest first
pub async fn list_requests(ctx: &ServiceContext, session: &Session) -> Result<Vec<ConnectionRequest>> {
    let party = party_for(session)?;
    ctx.store.list_connection_requests(&party).await
}
