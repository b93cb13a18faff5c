//! Premium plan hierarchy
//!
//! Plans are strictly ordered: `start < capital < pro_plus`. A user without an
//! active subscription sits below every plan (rank 0). Access to a feature
//! that names a plan requires a rank at least as high; a feature that names
//! no plan only requires some active subscription.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::schemas::{Subscription, SubscriptionStatus};

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Start,
    Capital,
    ProPlus,
}

impl PlanType {
    pub const ALL: [PlanType; 3] = [PlanType::Start, PlanType::Capital, PlanType::ProPlus];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Start => "start",
            PlanType::Capital => "capital",
            PlanType::ProPlus => "pro_plus",
        }
    }

    /// Name shown in upgrade prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            PlanType::Start => "Start",
            PlanType::Capital => "Capital",
            PlanType::ProPlus => "Pro+",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(PlanType::Start),
            "capital" => Ok(PlanType::Capital),
            "pro_plus" => Ok(PlanType::ProPlus),
            other => Err(format!("unknown plan '{}'", other)),
        }
    }
}

/// Position of a plan in the hierarchy. Free tier is 0.
pub fn rank(plan: Option<PlanType>) -> u8 {
    match plan {
        None => 0,
        Some(PlanType::Start) => 1,
        Some(PlanType::Capital) => 2,
        Some(PlanType::ProPlus) => 3,
    }
}

/// Whether `user_plan` satisfies `required_plan`.
pub fn has_plan_access(user_plan: Option<PlanType>, required_plan: Option<PlanType>) -> bool {
    match required_plan {
        Some(required) => rank(user_plan) >= rank(Some(required)),
        None => user_plan.is_some(),
    }
}

/// Premium state resolved from the single active subscription row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PremiumStatus {
    pub premium_plan: Option<PlanType>,
    pub has_active_premium: bool,
}

impl PremiumStatus {
    /// Derive from the active row, if any. Rows in any other status, or past
    /// their end date, count as free tier.
    pub fn from_subscription(subscription: Option<&Subscription>) -> Self {
        match subscription {
            Some(sub)
                if sub.status == SubscriptionStatus::Active && !sub.is_lapsed(Utc::now()) =>
            {
                Self {
                    premium_plan: Some(sub.plan_type),
                    has_active_premium: true,
                }
            }
            _ => Self::default(),
        }
    }

    pub fn allows(&self, required_plan: Option<PlanType>) -> bool {
        has_plan_access(self.premium_plan, required_plan)
    }
}
