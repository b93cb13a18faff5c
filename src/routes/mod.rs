//! HTTP routes for Growest Connect
//!
//! Handlers return `Result<Response<BoxBody>>`; the dispatchers turn every
//! error into a JSON body so nothing escapes a handler.

pub mod admin;
pub mod api;
pub mod auth_routes;
pub mod health;
pub mod premium;
pub mod realtime_ws;

pub use api::handle_api_request;
pub use auth_routes::{handle_auth_request, validate_ws_token};
pub use health::health_check;
pub use realtime_ws::handle_realtime_ws;

use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::auth::{extract_token_from_header, Identity, Session};
use crate::server::AppState;
use crate::types::{ConnectError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Limit for ordinary JSON bodies
pub const MAX_JSON_BYTES: usize = 64 * 1024;

/// Limit for base64 upload bodies (largest bucket is 100 MiB before encoding)
pub const MAX_UPLOAD_BYTES: usize = 140 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn with_cors<B>(mut response: Response<B>) -> Response<B> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    with_cors(response)
}

pub fn ok_json<T: Serialize>(body: &T) -> Result<Response<BoxBody>> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn created_json<T: Serialize>(body: &T) -> Result<Response<BoxBody>> {
    Ok(json_response(StatusCode::CREATED, body))
}

/// JSON error body for any service error
pub fn error_response(err: ConnectError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "Request failed: {}", err);
    } else {
        debug!(code = err.code(), "Request rejected: {}", err);
    }

    let field = err.field().map(str::to_string);
    let error = match &err {
        ConnectError::Validation { message, .. } => message.clone(),
        ConnectError::Conflict(message)
        | ConnectError::PaymentRequired(message)
        | ConnectError::Forbidden(message)
        | ConnectError::Unauthorized(message) => message.clone(),
        other => other.to_string(),
    };

    json_response(
        status,
        &ErrorResponse {
            error,
            code: err.code(),
            field,
        },
    )
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    with_cors(response)
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    error_response(ConnectError::NotFound(format!("route {}", path)))
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: "METHOD_NOT_ALLOWED",
            field: None,
        },
    )
}

/// Read and decode a JSON body no larger than `limit`
pub async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>, limit: usize) -> Result<T> {
    let body = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| ConnectError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.is_empty() {
        return Err(ConnectError::BadRequest("Request body is empty".into()));
    }

    serde_json::from_slice(&bytes).map_err(|e| ConnectError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Decode the query string into `T`
pub fn parse_query<T: DeserializeOwned>(req: &Request<Incoming>) -> Result<T> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| ConnectError::BadRequest(format!("Invalid query: {}", e)))
}

fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the caller's session. No token gives the signed-out session;
/// a bad token is rejected.
pub async fn authenticate(req: &Request<Incoming>, state: &AppState) -> Result<Session> {
    let Some(token) = extract_token_from_header(get_auth_header(req)) else {
        return Ok(Session::signed_out());
    };

    let result = state.jwt.verify_token(token);
    let claims = match (result.valid, result.claims) {
        (true, Some(claims)) => claims,
        _ => {
            return Err(ConnectError::Unauthorized(
                result
                    .error
                    .unwrap_or_else(|| "Invalid or expired token".into()),
            ))
        }
    };

    Ok(state.ctx.sessions().resolve(Identity::from(claims)).await)
}

/// File sent inside a JSON body
#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub file_name: String,
    /// Base64 (standard alphabet) file content
    pub content_base64: String,
}

impl UploadBody {
    pub fn decode(&self) -> Result<Bytes> {
        base64::engine::general_purpose::STANDARD
            .decode(self.content_base64.trim())
            .map(Bytes::from)
            .map_err(|e| ConnectError::validation("file", format!("Contenu base64 invalide : {}", e)))
    }
}
