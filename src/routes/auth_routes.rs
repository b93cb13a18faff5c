//! HTTP Routes for Authentication
//!
//! - POST /auth/signup - Create credentials and profile, get JWT token
//! - POST /auth/login  - Authenticate and get JWT token
//! - GET  /auth/me     - Current session snapshot

use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;

use crate::auth::Identity;
use crate::routes::{
    authenticate, cors_preflight, created_json, error_response, method_not_allowed, not_found,
    ok_json, parse_json_body, BoxBody, MAX_JSON_BYTES,
};
use crate::server::AppState;
use crate::services::accounts::{self, LoginRequest, SignUpRequest};
use crate::services::require_profile;
use crate::types::Result;

async fn handle_signup(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: SignUpRequest = parse_json_body(req, MAX_JSON_BYTES).await?;
    let auth = accounts::sign_up(&state.ctx, &state.jwt, body).await?;
    created_json(&auth)
}

async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req, MAX_JSON_BYTES).await?;
    let auth = accounts::log_in(&state.ctx, &state.jwt, body).await?;
    ok_json(&auth)
}

async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let session = authenticate(&req, &state).await?;
    require_profile(&session)?;
    ok_json(&session.view())
}

/// Handle auth-related HTTP requests
pub async fn handle_auth_request(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return cors_preflight();
    }

    let result = match (&method, path.as_str()) {
        (&Method::POST, "/auth/signup") => handle_signup(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::GET, "/auth/me") => handle_me(req, state).await,

        (_, "/auth/signup") | (_, "/auth/login") | (_, "/auth/me") => Ok(method_not_allowed()),

        _ => Ok(not_found(&path)),
    };

    result.unwrap_or_else(error_response)
}

/// Validate a token and extract the identity for WebSocket authentication
pub fn validate_ws_token(state: &AppState, token: &str) -> Option<Identity> {
    let result = state.jwt.verify_token(token);
    if result.valid {
        result.claims.map(Identity::from)
    } else {
        None
    }
}
