//! Admin routes
//!
//! - GET  /api/admin/users            - List profiles (?role=&kyc_status=)
//! - GET  /api/admin/kyc              - Documents awaiting review
//! - PUT  /api/admin/users/{id}/role  - Change a user's role
//! - POST /api/admin/users/{id}/kyc   - Approve or reject a KYC document

use hyper::body::Incoming;
use hyper::{Method, Request, Response};

use crate::auth::Session;
use crate::db::ProfileFilter;
use crate::kyc::KycDecision;
use crate::routes::{method_not_allowed, ok_json, parse_json_body, parse_query, BoxBody, MAX_JSON_BYTES};
use crate::server::AppState;
use crate::services::admin::{self, RoleChange};
use crate::services::kyc;
use crate::types::Result;

pub async fn route(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    method: &Method,
    segments: &[&str],
) -> Result<Response<BoxBody>> {
    let ctx = &state.ctx;
    match (method, segments) {
        (&Method::GET, ["admin", "users"]) => {
            let filter: ProfileFilter = parse_query(&req)?;
            ok_json(&admin::list_users(ctx, session, filter).await?)
        }
        (&Method::GET, ["admin", "kyc"]) => ok_json(&kyc::review_queue(ctx, session).await?),
        (&Method::PUT, ["admin", "users", id, "role"]) => {
            let body: RoleChange = parse_json_body(req, MAX_JSON_BYTES).await?;
            ok_json(&admin::set_role(ctx, session, id, body).await?)
        }
        (&Method::POST, ["admin", "users", id, "kyc"]) => {
            let decision: KycDecision = parse_json_body(req, MAX_JSON_BYTES).await?;
            ok_json(&admin::decide_kyc(ctx, session, id, decision).await?)
        }
        _ => Ok(method_not_allowed()),
    }
}
