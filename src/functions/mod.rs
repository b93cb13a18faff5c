//! Serverless function calls
//!
//! The chatbot, matching and payment logic run as remote functions invoked
//! with a JSON body. Their implementations are opaque to this service; the
//! payloads below are the whole contract.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::UserType;
use crate::types::{ConnectError, Result};

pub const CHATBOT_FUNCTION: &str = "chatbot";
pub const MATCHING_FUNCTION: &str = "advanced-matching";
pub const PAYMENT_FUNCTION: &str = "paystack-payment";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRequest {
    pub user_id: String,
    pub user_type: UserType,
    #[serde(default)]
    pub preferences: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingResponse {
    pub success: bool,
    #[serde(default)]
    pub matches: Vec<serde_json::Value>,
    #[serde(default)]
    pub ai_analyzed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    CreateSubscription,
    VerifyPayment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub action: PaymentAction,
    pub email: String,
    /// Amount in the currency's main unit
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Remote function client
#[async_trait]
pub trait RemoteFunctions: Send + Sync {
    async fn chatbot(&self, request: ChatbotRequest) -> Result<ChatbotResponse>;

    async fn advanced_matching(&self, request: MatchingRequest) -> Result<MatchingResponse>;

    async fn paystack_payment(&self, request: PaymentRequest) -> Result<PaymentResponse>;
}

/// Configuration for the HTTP function client
#[derive(Debug, Clone)]
pub struct HttpFunctionsConfig {
    /// Functions are invoked at `{base_url}/{name}`
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

/// Calls functions over HTTP
pub struct HttpRemoteFunctions {
    config: HttpFunctionsConfig,
    http_client: reqwest::Client,
}

impl HttpRemoteFunctions {
    pub fn new(config: HttpFunctionsConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("growest-connect/0.1")
            .build()
            .unwrap_or_default();

        info!(base_url = %config.base_url, "Remote functions configured");
        Self {
            config,
            http_client,
        }
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    async fn invoke<Req, Resp>(&self, name: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.function_url(name);
        debug!(function = %name, "Invoking remote function");

        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(function = %name, status = %status, "Remote function failed");
            return Err(ConnectError::Function(format!(
                "{} returned HTTP {}: {}",
                name, status, text
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ConnectError::Function(format!("{} returned invalid JSON: {}", name, e)))
    }
}

/// Turn `{ success: false, error }` into an error
fn ensure_success(name: &str, success: bool, error: Option<&str>) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(ConnectError::Function(format!(
            "{}: {}",
            name,
            error.unwrap_or("request failed")
        )))
    }
}

#[async_trait]
impl RemoteFunctions for HttpRemoteFunctions {
    async fn chatbot(&self, request: ChatbotRequest) -> Result<ChatbotResponse> {
        let response: ChatbotResponse = self.invoke(CHATBOT_FUNCTION, &request).await?;
        ensure_success(CHATBOT_FUNCTION, response.success, response.error.as_deref())?;
        Ok(response)
    }

    async fn advanced_matching(&self, request: MatchingRequest) -> Result<MatchingResponse> {
        let response: MatchingResponse = self.invoke(MATCHING_FUNCTION, &request).await?;
        ensure_success(MATCHING_FUNCTION, response.success, response.error.as_deref())?;
        Ok(response)
    }

    async fn paystack_payment(&self, request: PaymentRequest) -> Result<PaymentResponse> {
        // An unsuccessful verification is a normal outcome for the caller
        self.invoke(PAYMENT_FUNCTION, &request).await
    }
}

/// Stand-in used when no functions endpoint is configured (dev mode)
pub struct UnconfiguredFunctions;

#[async_trait]
impl RemoteFunctions for UnconfiguredFunctions {
    async fn chatbot(&self, _request: ChatbotRequest) -> Result<ChatbotResponse> {
        Err(ConnectError::Function("FUNCTIONS_URL is not configured".into()))
    }

    async fn advanced_matching(&self, _request: MatchingRequest) -> Result<MatchingResponse> {
        Err(ConnectError::Function("FUNCTIONS_URL is not configured".into()))
    }

    async fn paystack_payment(&self, _request: PaymentRequest) -> Result<PaymentResponse> {
        Err(ConnectError::Function("FUNCTIONS_URL is not configured".into()))
    }
}
