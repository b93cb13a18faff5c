//! Premium plan, payment and remote function routes
//!
//! - GET  /api/premium            - Resolved plan of the caller
//! - POST /api/payments/checkout  - Start a payment for a plan
//! - POST /api/payments/verify    - Confirm a payment and activate the plan
//! - POST /api/chatbot            - Assistant chat
//! - POST /api/matching           - AI matching (capital plan)

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;

use crate::auth::Session;
use crate::gate::{GateOutcome, UpgradePrompt};
use crate::routes::{json_response, method_not_allowed, ok_json, parse_json_body, BoxBody, MAX_JSON_BYTES};
use crate::server::AppState;
use crate::services::assistant::{self, ChatInput, MatchingInput};
use crate::services::billing::{self, CheckoutRequest, VerifyRequest};
use crate::types::Result;

/// 402 body carrying the upgrade overlay
#[derive(Debug, Serialize)]
struct UpgradeRequired<'a> {
    error: &'a str,
    code: &'static str,
    prompt: &'a UpgradePrompt,
}

fn upgrade_required(prompt: &UpgradePrompt) -> Response<BoxBody> {
    json_response(
        StatusCode::PAYMENT_REQUIRED,
        &UpgradeRequired {
            error: &prompt.message,
            code: "UPGRADE_REQUIRED",
            prompt,
        },
    )
}

async fn matching(req: Request<Incoming>, state: &AppState, session: &Session) -> Result<Response<BoxBody>> {
    if let GateOutcome::Degraded { prompt } = assistant::matching_gate().evaluate(session) {
        return Ok(upgrade_required(&prompt));
    }
    let body: MatchingInput = parse_json_body(req, MAX_JSON_BYTES).await?;
    ok_json(&assistant::find_matches(&state.ctx, session, body).await?)
}

pub async fn route(
    req: Request<Incoming>,
    state: &AppState,
    session: &Session,
    method: &Method,
    segments: &[&str],
) -> Result<Response<BoxBody>> {
    let ctx = &state.ctx;
    match (method, segments) {
        (&Method::GET, ["premium"]) => ok_json(&billing::premium(session)?),
        (&Method::POST, ["payments", "checkout"]) => {
            let body: CheckoutRequest = parse_json_body(req, MAX_JSON_BYTES).await?;
            ok_json(&billing::checkout(ctx, session, body).await?)
        }
        (&Method::POST, ["payments", "verify"]) => {
            let body: VerifyRequest = parse_json_body(req, MAX_JSON_BYTES).await?;
            ok_json(&billing::verify(ctx, session, body).await?)
        }
        (&Method::POST, ["chatbot"]) => {
            let body: ChatInput = parse_json_body(req, MAX_JSON_BYTES).await?;
            ok_json(&assistant::chat(ctx, session, body).await?)
        }
        (&Method::POST, ["matching"]) => matching(req, state, session).await,
        _ => Ok(method_not_allowed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::premium::PlanType;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_upgrade_required_body() {
        let prompt = UpgradePrompt {
            required_plan: Some(PlanType::Capital),
            title: "Plan Capital requis".into(),
            message: "Passez au plan Capital (capital) ou supérieur.".into(),
            upgrade_url: "/premium?plan=capital".into(),
        };
        let response = upgrade_required(&prompt);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "UPGRADE_REQUIRED");
        assert_eq!(body["prompt"]["requiredPlan"], "capital");
        assert_eq!(body["prompt"]["upgradeUrl"], "/premium?plan=capital");
    }
}
