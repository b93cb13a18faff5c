//! Access gate
//!
//! Declarative composition of role, KYC and plan checks. Checks run in a
//! fixed order and stop at the first failure:
//!
//! 1. session still loading
//! 2. no resolved profile
//! 3. role not in the allow-list
//! 4. KYC required but not approved
//! 5. plan requirement not met
//!
//! Steps 2-4 are hard denials: the protected content is never built.
//! Step 5 is soft: the content is built and shown beneath an upgrade prompt,
//! unless the gate opts out of the prompt.

use serde::{Deserialize, Serialize};

use crate::auth::{is_role_allowed, Role, Session};
use crate::premium::PlanType;
use crate::types::ConnectError;

pub const SIGN_IN_REQUIRED_MESSAGE: &str =
    "Vous devez être connecté pour accéder à cette fonctionnalité.";

pub const MISSING_PERMISSION_MESSAGE: &str =
    "Vous n'avez pas la permission d'accéder à cette fonctionnalité.";

pub const KYC_REQUIRED_MESSAGE: &str =
    "Votre identité doit être vérifiée (KYC) avant d'accéder à cette fonctionnalité.";

/// Gate definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_roles: Option<Vec<Role>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_plan: Option<PlanType>,

    /// Plan check with no named plan: any active subscription
    #[serde(default)]
    pub require_premium: bool,

    #[serde(default)]
    pub require_kyc: bool,

    /// Feature label used in upgrade prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,

    #[serde(default = "default_true")]
    pub show_upgrade_prompt: bool,

    /// Replaces the default message of hard denials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for AccessGate {
    fn default() -> Self {
        Self {
            allowed_roles: None,
            required_plan: None,
            require_premium: false,
            require_kyc: false,
            feature: None,
            show_upgrade_prompt: true,
            fallback: None,
        }
    }
}

/// Upgrade overlay shown over degraded content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePrompt {
    pub required_plan: Option<PlanType>,
    pub title: String,
    pub message: String,
    pub upgrade_url: String,
}

impl UpgradePrompt {
    fn new(required_plan: Option<PlanType>, feature: Option<&str>) -> Self {
        let feature = feature.unwrap_or("cette fonctionnalité");
        match required_plan {
            Some(plan) => Self {
                required_plan,
                title: format!("Plan {} requis", plan.display_name()),
                message: format!(
                    "Passez au plan {} ({}) ou supérieur pour débloquer {}.",
                    plan.display_name(),
                    plan.as_str(),
                    feature
                ),
                upgrade_url: format!("/premium?plan={}", plan.as_str()),
            },
            None => Self {
                required_plan,
                title: "Abonnement Premium requis".into(),
                message: format!("Souscrivez à un abonnement Premium pour débloquer {}.", feature),
                upgrade_url: "/premium".into(),
            },
        }
    }
}

/// Result of evaluating a gate against a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    Loading,
    SignInRequired { message: String },
    MissingPermission { message: String },
    KycRequired { message: String },
    /// Content shown beneath an upgrade overlay
    Degraded { prompt: UpgradePrompt },
    /// Plan check failed and the gate opted out of the prompt
    Hidden,
    Granted,
}

impl GateOutcome {
    /// Whether the protected content may be constructed
    pub fn renders_children(&self) -> bool {
        matches!(self, GateOutcome::Granted | GateOutcome::Degraded { .. })
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, GateOutcome::Granted)
    }

    /// Map to an API error (401 sign-in, 403 role/KYC, 402 plan)
    pub fn into_result(self) -> Result<(), ConnectError> {
        match self {
            GateOutcome::Granted => Ok(()),
            GateOutcome::Loading => Err(ConnectError::Unauthorized(SIGN_IN_REQUIRED_MESSAGE.into())),
            GateOutcome::SignInRequired { message } => Err(ConnectError::Unauthorized(message)),
            GateOutcome::MissingPermission { message } | GateOutcome::KycRequired { message } => {
                Err(ConnectError::Forbidden(message))
            }
            GateOutcome::Degraded { prompt } => Err(ConnectError::PaymentRequired(prompt.message)),
            GateOutcome::Hidden => Err(ConnectError::PaymentRequired(
                UpgradePrompt::new(None, None).message,
            )),
        }
    }
}

/// Rendered result of a gate
#[derive(Debug, PartialEq)]
pub enum Rendered<T> {
    Loading,
    Denied { message: String },
    Content(T),
    Degraded { content: T, prompt: UpgradePrompt },
    Nothing,
}

impl AccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.allowed_roles = Some(roles.to_vec());
        self
    }

    pub fn plan(mut self, plan: PlanType) -> Self {
        self.required_plan = Some(plan);
        self
    }

    pub fn premium(mut self) -> Self {
        self.require_premium = true;
        self
    }

    pub fn kyc(mut self) -> Self {
        self.require_kyc = true;
        self
    }

    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn without_upgrade_prompt(mut self) -> Self {
        self.show_upgrade_prompt = false;
        self
    }

    pub fn fallback(mut self, message: impl Into<String>) -> Self {
        self.fallback = Some(message.into());
        self
    }

    fn deny_message(&self, default: &str) -> String {
        self.fallback.clone().unwrap_or_else(|| default.to_string())
    }

    fn checks_plan(&self) -> bool {
        self.required_plan.is_some() || self.require_premium
    }

    /// Evaluate the gate against a snapshot
    pub fn evaluate(&self, session: &Session) -> GateOutcome {
        if session.loading {
            return GateOutcome::Loading;
        }

        let Some(profile) = session.profile() else {
            return GateOutcome::SignInRequired {
                message: self.deny_message(SIGN_IN_REQUIRED_MESSAGE),
            };
        };

        if let Some(allowed) = &self.allowed_roles {
            if !is_role_allowed(profile.role, allowed) {
                return GateOutcome::MissingPermission {
                    message: self.deny_message(MISSING_PERMISSION_MESSAGE),
                };
            }
        }

        if self.require_kyc && !session.is_kyc_approved() {
            return GateOutcome::KycRequired {
                message: self.deny_message(KYC_REQUIRED_MESSAGE),
            };
        }

        if self.checks_plan() && !session.premium().allows(self.required_plan) {
            if !self.show_upgrade_prompt {
                return GateOutcome::Hidden;
            }
            return GateOutcome::Degraded {
                prompt: UpgradePrompt::new(self.required_plan, self.feature.as_deref()),
            };
        }

        GateOutcome::Granted
    }

    /// Evaluate and build the protected content only when it may be shown
    pub fn render<T>(&self, session: &Session, children: impl FnOnce() -> T) -> Rendered<T> {
        match self.evaluate(session) {
            GateOutcome::Loading => Rendered::Loading,
            GateOutcome::SignInRequired { message }
            | GateOutcome::MissingPermission { message }
            | GateOutcome::KycRequired { message } => Rendered::Denied { message },
            GateOutcome::Degraded { prompt } => Rendered::Degraded {
                content: children(),
                prompt,
            },
            GateOutcome::Hidden => Rendered::Nothing,
            GateOutcome::Granted => Rendered::Content(children()),
        }
    }

    /// Evaluate and convert to an API error
    pub fn check(&self, session: &Session) -> Result<(), ConnectError> {
        self.evaluate(session).into_result()
    }
}
