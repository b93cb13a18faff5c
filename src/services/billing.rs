//! Premium subscriptions and payments
//!
//! Checkout and verification go through the `paystack-payment` remote
//! function. A verified payment records its transaction, inserts a new
//! active subscription keyed by the payment reference, then cancels any
//! older active row. The unique reference makes repeated verification of
//! the same payment a no-op. Without a checkout row, the gateway record
//! must name the caller as payer and cover the plan price.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::Session;
use crate::db::{
    new_id, Notification, NotificationKind, Subscription, SubscriptionStatus, Transaction,
    TransactionStatus, WriteOutcome, SUBSCRIPTION_COLLECTION,
};
use crate::feed::ChangeOp;
use crate::functions::{PaymentAction, PaymentRequest};
use crate::premium::{PlanType, PremiumStatus};
use crate::services::notifications::notify_quietly;
use crate::services::{require_profile, ServiceContext};
use crate::types::{ConnectError, Result};

/// Plan pricing and subscription period
#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    pub currency: String,
    pub start_price: f64,
    pub capital_price: f64,
    pub pro_plus_price: f64,
    pub period_days: i64,
    /// Where the payment page sends the user back to
    pub callback_url: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            currency: "XOF".into(),
            start_price: 5_000.0,
            capital_price: 15_000.0,
            pro_plus_price: 35_000.0,
            period_days: 30,
            callback_url: None,
        }
    }
}

impl BillingConfig {
    pub fn price(&self, plan: PlanType) -> f64 {
        match plan {
            PlanType::Start => self.start_price,
            PlanType::Capital => self.capital_price,
            PlanType::ProPlus => self.pro_plus_price,
        }
    }
}

/// Response of `GET /api/premium`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumView {
    #[serde(flatten)]
    pub status: PremiumStatus,
    pub subscription: Option<Subscription>,
}

pub fn premium(session: &Session) -> Result<PremiumView> {
    require_profile(session)?;
    let status = session.premium();
    Ok(PremiumView {
        status,
        subscription: session.subscription.clone().filter(|_| status.has_active_premium),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub plan_type: PlanType,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub authorization_url: String,
    pub reference: String,
    pub plan_type: PlanType,
    pub amount: f64,
    pub currency: String,
}

/// Start a payment for a plan and return the gateway page
pub async fn checkout(
    ctx: &ServiceContext,
    session: &Session,
    request: CheckoutRequest,
) -> Result<CheckoutResponse> {
    let profile = require_profile(session)?;
    let plan = request.plan_type;
    let amount = ctx.billing.price(plan);
    let reference = format!("GRW-{}", new_id().replace('-', "").to_uppercase());

    let response = ctx
        .functions
        .paystack_payment(PaymentRequest {
            action: PaymentAction::CreateSubscription,
            email: profile.email.clone(),
            amount,
            reference: Some(reference.clone()),
            metadata: json!({
                "user_id": profile.id,
                "plan_type": plan,
                "currency": ctx.billing.currency,
                "callback_url": ctx.billing.callback_url,
            }),
        })
        .await?;

    if !response.success {
        return Err(ConnectError::Function(
            response
                .error
                .unwrap_or_else(|| "payment initialization failed".into()),
        ));
    }
    let authorization_url = response.authorization_url.ok_or_else(|| {
        ConnectError::Function("payment initialization returned no authorization_url".into())
    })?;
    let reference = response.reference.unwrap_or(reference);

    let transaction = Transaction {
        id: new_id(),
        user_id: profile.id.clone(),
        reference: reference.clone(),
        amount,
        currency: ctx.billing.currency.clone(),
        plan_type: plan,
        status: TransactionStatus::Pending,
        created_at: Utc::now(),
    };
    if ctx.store.insert_transaction(transaction).await?.is_conflict() {
        return Err(ConnectError::Conflict(
            "Cette référence de paiement existe déjà.".into(),
        ));
    }

    info!(user_id = %profile.id, reference = %reference, plan = %plan, "Checkout started");
    Ok(CheckoutResponse {
        authorization_url,
        reference,
        plan_type: plan,
        amount,
        currency: ctx.billing.currency.clone(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub status: TransactionStatus,
    /// The payment had already been applied
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

/// Fields of the gateway transaction record that verification relies on
#[derive(Debug, Default, Deserialize)]
struct GatewayTransaction {
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    metadata: GatewayMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayMetadata {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    plan_type: Option<String>,
}

impl GatewayTransaction {
    fn from_response(transaction: Option<&serde_json::Value>) -> Self {
        transaction
            .and_then(|value| Self::deserialize(value).ok())
            .unwrap_or_default()
    }

    fn plan(&self) -> Option<PlanType> {
        self.metadata.plan_type.as_deref()?.parse().ok()
    }

    fn paid_for(&self, user_id: &str) -> bool {
        self.metadata.user_id.as_deref() == Some(user_id)
    }
}

/// Confirm a payment with the gateway and activate the paid plan
pub async fn verify(
    ctx: &ServiceContext,
    session: &Session,
    request: VerifyRequest,
) -> Result<VerifyResponse> {
    let profile = require_profile(session)?;
    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(ConnectError::validation("reference", "Référence manquante"));
    }

    let existing = ctx.store.find_transaction(reference).await?;
    if let Some(tx) = &existing {
        if tx.user_id != profile.id {
            return Err(ConnectError::NotFound(format!("transaction {}", reference)));
        }
        if tx.status == TransactionStatus::Success {
            return Ok(VerifyResponse {
                status: TransactionStatus::Success,
                already_processed: true,
                subscription: ctx.store.active_subscription(&profile.id).await?,
            });
        }
    }

    let response = ctx
        .functions
        .paystack_payment(PaymentRequest {
            action: PaymentAction::VerifyPayment,
            email: profile.email.clone(),
            amount: existing.as_ref().map(|tx| tx.amount).unwrap_or_default(),
            reference: Some(reference.to_string()),
            metadata: json!({ "user_id": profile.id }),
        })
        .await?;

    if !response.success {
        warn!(reference = %reference, "Payment verification failed");
        if existing.is_some() {
            ctx.store
                .set_transaction_status(reference, TransactionStatus::Failed)
                .await?;
        }
        return Ok(VerifyResponse {
            status: TransactionStatus::Failed,
            already_processed: false,
            subscription: None,
        });
    }

    let gateway = GatewayTransaction::from_response(response.transaction.as_ref());
    if gateway.metadata.user_id.is_some() && !gateway.paid_for(&profile.id) {
        warn!(user_id = %profile.id, reference = %reference, "Payment belongs to another user");
        return Err(ConnectError::NotFound(format!("transaction {}", reference)));
    }

    let (plan, amount, currency) = match &existing {
        Some(tx) => {
            if gateway.amount.is_some_and(|paid| paid < tx.amount) {
                warn!(reference = %reference, expected = tx.amount, "Payment amount below checkout");
                ctx.store
                    .set_transaction_status(reference, TransactionStatus::Failed)
                    .await?;
                return Ok(VerifyResponse {
                    status: TransactionStatus::Failed,
                    already_processed: false,
                    subscription: None,
                });
            }
            (tx.plan_type, tx.amount, tx.currency.clone())
        }
        // No checkout row: the gateway record alone must name this user and cover the plan
        None => {
            if !gateway.paid_for(&profile.id) {
                return Err(ConnectError::NotFound(format!("transaction {}", reference)));
            }
            let plan = gateway
                .plan()
                .ok_or_else(|| ConnectError::Function("verified payment names no plan".into()))?;
            let paid = gateway.amount.unwrap_or_default();
            if paid < ctx.billing.price(plan) {
                warn!(reference = %reference, paid, plan = %plan, "Payment amount below plan price");
                return Err(ConnectError::PaymentRequired(format!(
                    "Le montant payé ne couvre pas le plan {}.",
                    plan.display_name()
                )));
            }
            (plan, paid, ctx.billing.currency.clone())
        }
    };

    match &existing {
        Some(_) => {
            ctx.store
                .set_transaction_status(reference, TransactionStatus::Success)
                .await?;
        }
        None => {
            let recorded = ctx
                .store
                .insert_transaction(Transaction {
                    id: new_id(),
                    user_id: profile.id.clone(),
                    reference: reference.to_string(),
                    amount,
                    currency: currency.clone(),
                    plan_type: plan,
                    status: TransactionStatus::Success,
                    created_at: Utc::now(),
                })
                .await?;
            if recorded.is_conflict() {
                debug!(reference = %reference, "Transaction recorded concurrently");
            }
        }
    }

    let now = Utc::now();
    let subscription = Subscription {
        id: new_id(),
        user_id: profile.id.clone(),
        plan_type: plan,
        status: SubscriptionStatus::Active,
        start_date: now,
        end_date: Some(now + ChronoDuration::days(ctx.billing.period_days)),
        amount,
        currency,
        payment_reference: Some(reference.to_string()),
    };

    let subscription = match ctx.store.insert_subscription(subscription).await? {
        WriteOutcome::Created(subscription) => subscription,
        WriteOutcome::Conflict => {
            return Ok(VerifyResponse {
                status: TransactionStatus::Success,
                already_processed: true,
                subscription: ctx.store.active_subscription(&profile.id).await?,
            });
        }
    };

    for previous in ctx.store.list_subscriptions(&profile.id).await? {
        if previous.id != subscription.id && previous.status == SubscriptionStatus::Active {
            ctx.store
                .set_subscription_status(&previous.id, SubscriptionStatus::Cancelled)
                .await?;
        }
    }

    info!(user_id = %profile.id, plan = %plan, reference = %reference, "Subscription activated");
    ctx.feed.publish(
        SUBSCRIPTION_COLLECTION,
        ChangeOp::Insert,
        &subscription,
        vec![profile.id.clone()],
    );
    notify_quietly(
        ctx,
        Notification::new(
            &profile.id,
            NotificationKind::Payment,
            "Paiement confirmé",
            format!("Votre abonnement {} est actif.", plan.display_name()),
        )
        .with_link("/premium"),
    )
    .await;

    Ok(VerifyResponse {
        status: TransactionStatus::Success,
        already_processed: false,
        subscription: Some(subscription),
    })
}

/// Mark active subscriptions past their end date as expired
pub async fn expire_lapsed(ctx: &ServiceContext) -> Result<usize> {
    let lapsed = ctx.store.lapsed_subscriptions(Utc::now()).await?;
    let mut expired = 0;
    for mut subscription in lapsed {
        if ctx
            .store
            .set_subscription_status(&subscription.id, SubscriptionStatus::Expired)
            .await?
        {
            subscription.status = SubscriptionStatus::Expired;
            ctx.feed.publish(
                SUBSCRIPTION_COLLECTION,
                ChangeOp::Update,
                &subscription,
                vec![subscription.user_id.clone()],
            );
            expired += 1;
        }
    }
    Ok(expired)
}

/// Start the periodic expiry sweep
pub fn spawn_expiry_task(ctx: ServiceContext, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match expire_lapsed(&ctx).await {
                Ok(0) => {}
                Ok(n) => info!("Expired {} lapsed subscriptions", n),
                Err(e) => error!("Subscription expiry sweep failed: {}", e),
            }
        }
    })
}
