//! Project interests

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::{Role, Session};
use crate::db::{
    new_id, Notification, NotificationKind, ProjectInterest, WriteOutcome,
    PROJECT_INTEREST_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::gate::AccessGate;
use crate::services::notifications::notify_quietly;
use crate::services::{optional_text, require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

use super::{listed_project, party_for};

pub const ALREADY_SENT_MESSAGE: &str =
    "Vous avez déjà manifesté votre intérêt pour ce projet.";

const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewInterest {
    pub project_id: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterestOutcome {
    Created(ProjectInterest),
    /// Interest for this (investor, project) pair was already sent
    AlreadySent,
}

/// Investor with approved KYC signals an intended amount on a project
pub async fn submit_interest(
    ctx: &ServiceContext,
    session: &Session,
    input: NewInterest,
) -> Result<InterestOutcome> {
    AccessGate::new()
        .roles(&[Role::Investor])
        .kyc()
        .check(session)?;
    let investor = require_profile(session)?;

    if !input.amount.is_finite() || input.amount <= 0.0 {
        return Err(ConnectError::validation(
            "amount",
            "Le montant doit être supérieur à zéro",
        ));
    }
    let message = optional_text("message", input.message, MAX_MESSAGE_CHARS)?;
    let currency = optional_text("currency", input.currency, 8)?
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_else(|| ctx.billing.currency.clone());

    let project = listed_project(ctx, &input.project_id).await?;

    let interest = ProjectInterest {
        id: new_id(),
        investor_id: investor.id.clone(),
        entrepreneur_id: project.entrepreneur_id.clone(),
        project_id: project.id.clone(),
        amount: input.amount,
        currency,
        message,
        created_at: Utc::now(),
    };

    let interest = match ctx.store.insert_interest(interest).await? {
        WriteOutcome::Created(interest) => interest,
        WriteOutcome::Conflict => {
            debug!(investor_id = %investor.id, project_id = %project.id, "Interest already sent");
            return Ok(InterestOutcome::AlreadySent);
        }
    };

    info!(interest_id = %interest.id, project_id = %project.id, "Interest recorded");
    ctx.feed.publish(
        PROJECT_INTEREST_COLLECTION,
        ChangeOp::Insert,
        &interest,
        vec![interest.investor_id.clone(), interest.entrepreneur_id.clone()],
    );

    notify_quietly(
        ctx,
        Notification::new(
            &interest.entrepreneur_id,
            NotificationKind::Interest,
            "Nouvel intérêt pour votre projet",
            format!(
                "{} est intéressé par « {} » ({} {}).",
                investor.full_name, project.title, interest.amount, interest.currency
            ),
        )
        .with_link(format!("/projects/{}", project.id)),
    )
    .await;

    Ok(InterestOutcome::Created(interest))
}

/// Interests sent (investor) or received (entrepreneur), newest first
pub async fn list_interests(ctx: &ServiceContext, session: &Session) -> Result<Vec<ProjectInterest>> {
    let party = party_for(session)?;
    ctx.store.list_interests(&party).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Project, ProjectStatus, Store};
    use crate::kyc::KycStatus;
    use crate::services::testing::{context, user};

    #[tokio::test]
    async fn test_interest_conflict_and_no_conversation() {
        let (ctx, store) = context();
        let ent = user(&ctx, "ent", Role::Entrepreneur, KycStatus::Approved).await;
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;
        let mut project = Project::new(
            "ent".into(),
            "Atelier textile".into(),
            "Confection".into(),
            "textile".into(),
            1_000_000.0,
        );
        project.status = ProjectStatus::Published;
        let project = store.insert_project(project).await.unwrap();

        let input = NewInterest {
            project_id: project.id.clone(),
            amount: 250_000.0,
            currency: None,
            message: None,
        };
        let first = submit_interest(&ctx, &inv, input.clone()).await.unwrap();
        let InterestOutcome::Created(interest) = first else {
            panic!("expected a new interest");
        };
        assert_eq!(interest.currency, ctx.billing.currency);

        assert_eq!(
            submit_interest(&ctx, &inv, input).await.unwrap(),
            InterestOutcome::AlreadySent
        );
        assert_eq!(store.conversation_count(), 0);

        let received = list_interests(&ctx, &ent).await.unwrap();
        assert_eq!(received.len(), 1);
        let notes = store.list_notifications("ent", false).await.unwrap();
        assert_eq!(notes[0].kind, NotificationKind::Interest);
    }

    #[tokio::test]
    async fn test_amount_must_be_positive() {
        let (ctx, _) = context();
        let inv = user(&ctx, "inv", Role::Investor, KycStatus::Approved).await;
        for amount in [0.0, -5.0, f64::NAN] {
            let err = submit_interest(
                &ctx,
                &inv,
                NewInterest {
                    project_id: "p".into(),
                    amount,
                    currency: None,
                    message: None,
                },
            )
            .await
            .unwrap_err();
            assert_eq!(err.field(), Some("amount"));
        }
    }
}
