//! Chatbot and AI matching

use serde::Deserialize;
use tracing::debug;

use crate::auth::{Role, Session};
use crate::functions::{ChatbotRequest, ChatbotResponse, MatchingRequest, MatchingResponse};
use crate::gate::AccessGate;
use crate::premium::PlanType;
use crate::services::{require_profile, required_text, ServiceContext};
use crate::types::Result;

const MAX_CHAT_CHARS: usize = 4000;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatInput {
    pub message: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingInput {
    #[serde(default)]
    pub preferences: serde_json::Value,
}

/// AI matching is a `capital` plan feature
pub fn matching_gate() -> AccessGate {
    AccessGate::new()
        .roles(&[Role::Entrepreneur, Role::Investor])
        .plan(PlanType::Capital)
        .feature("la mise en relation par IA")
}

pub async fn chat(ctx: &ServiceContext, session: &Session, input: ChatInput) -> Result<ChatbotResponse> {
    require_profile(session)?;
    let message = required_text("message", &input.message, MAX_CHAT_CHARS)?;
    ctx.functions
        .chatbot(ChatbotRequest {
            message,
            context: input.context,
        })
        .await
}

pub async fn find_matches(
    ctx: &ServiceContext,
    session: &Session,
    input: MatchingInput,
) -> Result<MatchingResponse> {
    matching_gate().check(session)?;
    let profile = require_profile(session)?;

    let response = ctx
        .functions
        .advanced_matching(MatchingRequest {
            user_id: profile.id.clone(),
            user_type: profile.user_type,
            preferences: input.preferences,
        })
        .await?;
    debug!(user_id = %profile.id, matches = response.matches.len(), "Matching returned");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{PaymentRequest, PaymentResponse, RemoteFunctions};
    use crate::gate::GateOutcome;
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, subscribe, user};
    use async_trait::async_trait;
    use hyper::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoFunctions;

    #[async_trait]
    impl RemoteFunctions for EchoFunctions {
        async fn chatbot(&self, request: ChatbotRequest) -> Result<ChatbotResponse> {
            Ok(ChatbotResponse {
                success: true,
                response: Some(format!("echo: {}", request.message)),
                error: None,
            })
        }

        async fn advanced_matching(&self, request: MatchingRequest) -> Result<MatchingResponse> {
            Ok(MatchingResponse {
                success: true,
                matches: vec![json!({ "for": request.user_id })],
                ai_analyzed: true,
                error: None,
            })
        }

        async fn paystack_payment(&self, _: PaymentRequest) -> Result<PaymentResponse> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_matching_needs_capital_plan() {
        let (mut ctx, _) = context();
        ctx.functions = Arc::new(EchoFunctions);
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;

        match matching_gate().evaluate(&inv) {
            GateOutcome::Degraded { prompt } => assert!(prompt.message.contains("capital")),
            other => panic!("unexpected outcome {:?}", other),
        }
        let err = find_matches(&ctx, &inv, MatchingInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);

        subscribe(&ctx, "inv", PlanType::ProPlus).await;
        let inv = crate::services::testing::session(&ctx, "inv").await;
        let response = find_matches(&ctx, &inv, MatchingInput::default()).await.unwrap();
        assert!(response.ai_analyzed);
        assert_eq!(response.matches[0]["for"], "inv");
    }

    #[tokio::test]
    async fn test_chat_requires_sign_in_and_text() {
        let (mut ctx, _) = context();
        ctx.functions = Arc::new(EchoFunctions);

        let input = ChatInput {
            message: "Bonjour".into(),
            context: None,
        };
        let err = chat(&ctx, &Session::signed_out(), input.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Pending).await;
        let reply = chat(&ctx, &ent, input).await.unwrap();
        assert_eq!(reply.response.as_deref(), Some("echo: Bonjour"));

        let err = chat(
            &ctx,
            &ent,
            ChatInput {
                message: " ".into(),
                context: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.field(), Some("message"));
    }
}
