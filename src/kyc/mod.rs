//! KYC (identity verification) state machine
//!
//! ```text
//! pending ──submit──▶ under_review ──approve──▶ approved
//!                        ▲    │
//!                 submit │    └──reject──▶ rejected
//!                        └────────────────────┘
//! ```
//!
//! `approved` is terminal for the end user. Only an admin decides
//! `under_review`, and only `pending` or `rejected` accept a new document.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ConnectError;

/// Verification status stored on the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::UnderReview => "under_review",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }

    /// Whether the end-user surface offers the document upload control
    pub fn can_upload_document(&self) -> bool {
        matches!(self, KycStatus::Pending | KycStatus::Rejected)
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin decision on a submitted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum KycDecision {
    Approve,
    Reject { reason: String },
}

/// Event driving the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KycEvent {
    /// The owner stored a new verification document
    DocumentSubmitted,
    /// An admin ruled on the document under review
    Decided(KycDecision),
}

/// Compute the next status for an event, or explain why it is not allowed.
pub fn transition(current: KycStatus, event: &KycEvent) -> Result<KycStatus, ConnectError> {
    match (current, event) {
        (KycStatus::Pending | KycStatus::Rejected, KycEvent::DocumentSubmitted) => {
            Ok(KycStatus::UnderReview)
        }
        (KycStatus::UnderReview, KycEvent::DocumentSubmitted) => Err(
            ConnectError::InvalidTransition("document already under review".into()),
        ),
        (KycStatus::Approved, KycEvent::DocumentSubmitted) => Err(
            ConnectError::InvalidTransition("identity already verified".into()),
        ),
        (KycStatus::UnderReview, KycEvent::Decided(KycDecision::Approve)) => {
            Ok(KycStatus::Approved)
        }
        (KycStatus::UnderReview, KycEvent::Decided(KycDecision::Reject { reason })) => {
            if reason.trim().is_empty() {
                Err(ConnectError::validation(
                    "reason",
                    "a rejection reason is required",
                ))
            } else {
                Ok(KycStatus::Rejected)
            }
        }
        (status, KycEvent::Decided(_)) => Err(ConnectError::InvalidTransition(format!(
            "no document under review (status is {})",
            status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(reason: &str) -> KycEvent {
        KycEvent::Decided(KycDecision::Reject {
            reason: reason.into(),
        })
    }

    #[test]
    fn test_submit_from_pending_and_rejected() {
        assert_eq!(
            transition(KycStatus::Pending, &KycEvent::DocumentSubmitted).unwrap(),
            KycStatus::UnderReview
        );
        assert_eq!(
            transition(KycStatus::Rejected, &KycEvent::DocumentSubmitted).unwrap(),
            KycStatus::UnderReview
        );
    }

    #[test]
    fn test_submit_blocked_while_reviewing_or_approved() {
        assert!(transition(KycStatus::UnderReview, &KycEvent::DocumentSubmitted).is_err());
        assert!(transition(KycStatus::Approved, &KycEvent::DocumentSubmitted).is_err());
    }

    #[test]
    fn test_upload_control_matches_states() {
        for status in [
            KycStatus::Pending,
            KycStatus::UnderReview,
            KycStatus::Approved,
            KycStatus::Rejected,
        ] {
            assert_eq!(
                status.can_upload_document(),
                matches!(status, KycStatus::Pending | KycStatus::Rejected)
            );
            assert_eq!(
                status.can_upload_document(),
                transition(status, &KycEvent::DocumentSubmitted).is_ok()
            );
        }
    }

    #[test]
    fn test_decisions_only_from_under_review() {
        let approve = KycEvent::Decided(KycDecision::Approve);
        assert_eq!(
            transition(KycStatus::UnderReview, &approve).unwrap(),
            KycStatus::Approved
        );
        assert_eq!(
            transition(KycStatus::UnderReview, &reject("blurry scan")).unwrap(),
            KycStatus::Rejected
        );
        for status in [KycStatus::Pending, KycStatus::Approved, KycStatus::Rejected] {
            assert!(matches!(
                transition(status, &approve),
                Err(ConnectError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn test_reject_requires_reason() {
        let err = transition(KycStatus::UnderReview, &reject("   ")).unwrap_err();
        assert_eq!(err.field(), Some("reason"));
    }

    #[test]
    fn test_decision_json_shape() {
        let d: KycDecision =
            serde_json::from_str(r#"{"decision":"reject","reason":"expired id"}"#).unwrap();
        assert_eq!(
            d,
            KycDecision::Reject {
                reason: "expired id".into()
            }
        );
        let a: KycDecision = serde_json::from_str(r#"{"decision":"approve"}"#).unwrap();
        assert_eq!(a, KycDecision::Approve);
    }
}
