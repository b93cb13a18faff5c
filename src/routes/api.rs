//! Authenticated `/api/*` routes
//!
//! Every handler resolves the caller's session from the bearer token and
//! delegates to a service. Payment, function and admin routes live in
//! their own modules.

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Session;
use crate::db::ProjectPatch;
use crate::gate::AccessGate;
use crate::routes::{
    admin, authenticate, cors_preflight, created_json, error_response, method_not_allowed,
    not_found, ok_json, parse_json_body, parse_query, premium, BoxBody, SuccessResponse,
    UploadBody, MAX_JSON_BYTES, MAX_UPLOAD_BYTES,
};
use crate::server::AppState;
use crate::services::messaging::{self, NewMessage};
use crate::services::projects::{self, MediaKind, NewProject, ProjectQuery};
use crate::services::profiles::{self, ProfileUpdate};
use crate::services::{kyc, notifications};
use crate::types::{ConnectError, Result};
use crate::workflow::{
    self, ConnectionDecision, InterestOutcome, NewConnectionRequest, NewInterest, SubmitOutcome,
    ALREADY_REQUESTED_MESSAGE, ALREADY_SENT_MESSAGE,
};

#[derive(Debug, Deserialize)]
struct MediaUpload {
    kind: MediaKind,
    #[serde(flatten)]
    file: UploadBody,
}

#[derive(Debug, Deserialize)]
struct RespondBody {
    decision: ConnectionDecision,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

// =============================================================================
// Profile & KYC
// =============================================================================

async fn update_profile(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: ProfileUpdate = parse_json_body(req, MAX_JSON_BYTES).await?;
    ok_json(&profiles::update_own(&state.ctx, session, body).await?)
}

async fn upload_avatar(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: UploadBody = parse_json_body(req, MAX_UPLOAD_BYTES).await?;
    let content = body.decode()?;
    ok_json(&profiles::upload_avatar(&state.ctx, session, &body.file_name, content).await?)
}

async fn submit_kyc(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: UploadBody = parse_json_body(req, MAX_UPLOAD_BYTES).await?;
    let content = body.decode()?;
    let profile = kyc::submit_document(&state.ctx, session, &body.file_name, content).await?;
    ok_json(&kyc::KycView::from(&profile))
}

/// Evaluate a client-side gate definition against the caller's session
async fn evaluate_gate(req: Request<Incoming>, session: &Session) -> Result<Response<BoxBody>> {
    let gate: AccessGate = parse_json_body(req, MAX_JSON_BYTES).await?;
    ok_json(&gate.evaluate(session))
}

// =============================================================================
// Projects
// =============================================================================

async fn list_projects(req: &Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let query: ProjectQuery = parse_query(req)?;
    ok_json(&projects::list(&state.ctx, session, query).await?)
}

async fn create_project(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: NewProject = parse_json_body(req, MAX_JSON_BYTES).await?;
    created_json(&projects::create(&state.ctx, session, body).await?)
}

async fn update_project(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    id: &str,
) -> Result<Response<BoxBody>> {
    let patch: ProjectPatch = parse_json_body(req, MAX_JSON_BYTES).await?;
    ok_json(&projects::update(&state.ctx, session, id, patch).await?)
}

async fn upload_project_media(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    id: &str,
) -> Result<Response<BoxBody>> {
    let body: MediaUpload = parse_json_body(req, MAX_UPLOAD_BYTES).await?;
    let content = body.file.decode()?;
    let project =
        projects::upload_media(&state.ctx, session, id, body.kind, &body.file.file_name, content).await?;
    ok_json(&project)
}

// =============================================================================
// Connections & interests
// =============================================================================

async fn submit_connection(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: NewConnectionRequest = parse_json_body(req, MAX_JSON_BYTES).await?;
    match workflow::submit_request(&state.ctx, session, body).await? {
        SubmitOutcome::Created(request) => created_json(&request),
        SubmitOutcome::AlreadyRequested => Err(ConnectError::Conflict(ALREADY_REQUESTED_MESSAGE.into())),
    }
}

async fn respond_connection(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    id: &str,
) -> Result<Response<BoxBody>> {
    let body: RespondBody = parse_json_body(req, MAX_JSON_BYTES).await?;
    ok_json(&workflow::respond(&state.ctx, session, id, body.decision).await?)
}

async fn submit_interest(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let body: NewInterest = parse_json_body(req, MAX_JSON_BYTES).await?;
    match workflow::submit_interest(&state.ctx, session, body).await? {
        InterestOutcome::Created(interest) => created_json(&interest),
        InterestOutcome::AlreadySent => Err(ConnectError::Conflict(ALREADY_SENT_MESSAGE.into())),
    }
}

// =============================================================================
// Conversations & notifications
// =============================================================================

async fn send_message(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    conversation_id: &str,
) -> Result<Response<BoxBody>> {
    let body: NewMessage = parse_json_body(req, MAX_JSON_BYTES).await?;
    created_json(&messaging::send_message(&state.ctx, session, conversation_id, body).await?)
}

async fn list_notifications(req: &Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    let query: NotificationQuery = parse_query(req)?;
    ok_json(&notifications::list(&state.ctx, session, query.unread).await?)
}

fn updated(count: u64) -> Result<Response<BoxBody>> {
    ok_json(&SuccessResponse {
        success: true,
        updated: Some(count),
    })
}

// =============================================================================
// Router
// =============================================================================

async fn route(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path
        .trim_start_matches("/api")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let session = authenticate(&req, &state).await?;
    let ctx = &state.ctx;

    match (&method, segments.as_slice()) {
        // Profile & KYC
        (&Method::GET, ["profile"]) => ok_json(&profiles::get_own(&session)?),
        (&Method::PUT, ["profile"]) => update_profile(req, &state, &session).await,
        (&Method::POST, ["profile", "avatar"]) => upload_avatar(req, &state, &session).await,
        (&Method::GET, ["kyc"]) => ok_json(&kyc::status(&session)?),
        (&Method::POST, ["kyc"]) => submit_kyc(req, &state, &session).await,
        (&Method::POST, ["gate"]) => evaluate_gate(req, &session).await,

        // Projects
        (&Method::GET, ["projects"]) => list_projects(&req, &state, &session).await,
        (&Method::POST, ["projects"]) => create_project(req, &state, &session).await,
        (&Method::GET, ["projects", id]) => ok_json(&projects::get(ctx, &session, id).await?),
        (&Method::PUT, ["projects", id]) => update_project(req, &state, &session, id).await,
        (&Method::POST, ["projects", id, "media"]) => {
            upload_project_media(req, &state, &session, id).await
        }

        // Connections & interests
        (&Method::GET, ["connections"]) => ok_json(&workflow::list_requests(ctx, &session).await?),
        (&Method::POST, ["connections"]) => submit_connection(req, &state, &session).await,
        (&Method::POST, ["connections", id, "respond"]) => {
            respond_connection(req, &state, &session, id).await
        }
        (&Method::GET, ["interests"]) => ok_json(&workflow::list_interests(ctx, &session).await?),
        (&Method::POST, ["interests"]) => submit_interest(req, &state, &session).await,

        // Conversations
        (&Method::GET, ["conversations"]) => {
            ok_json(&messaging::list_conversations(ctx, &session).await?)
        }
        (&Method::GET, ["conversations", id, "messages"]) => {
            ok_json(&messaging::list_messages(ctx, &session, id).await?)
        }
        (&Method::POST, ["conversations", id, "messages"]) => {
            send_message(req, &state, &session, id).await
        }
        (&Method::POST, ["conversations", id, "read"]) => {
            updated(messaging::mark_read(ctx, &session, id).await?)
        }

        // Notifications
        (&Method::GET, ["notifications"]) => list_notifications(&req, &state, &session).await,
        (&Method::POST, ["notifications", "read-all"]) => {
            updated(notifications::mark_all_read(ctx, &session).await?)
        }
        (&Method::POST, ["notifications", id, "read"]) => {
            notifications::mark_read(ctx, &session, id).await?;
            updated(1)
        }

        // Premium, payments and remote functions
        (_, ["premium"]) | (_, ["payments", ..]) | (_, ["chatbot"]) | (_, ["matching"]) => {
            premium::route(req, &state, &session, &method, segments.as_slice()).await
        }

        // Admin
        (_, ["admin", ..]) => admin::route(req, &state, &session, &method, segments.as_slice()).await,

        (_, ["profile"])
        | (_, ["profile", "avatar"])
        | (_, ["kyc"])
        | (_, ["gate"])
        | (_, ["projects"])
        | (_, ["projects", _])
        | (_, ["connections"])
        | (_, ["interests"])
        | (_, ["conversations"])
        | (_, ["notifications"]) => Ok(method_not_allowed()),

        _ => Ok(not_found(&path)),
    }
}

/// Handle `/api/*` requests
pub async fn handle_api_request(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    if req.method() == Method::OPTIONS {
        return cors_preflight();
    }
    route(req, state).await.unwrap_or_else(error_response)
}
