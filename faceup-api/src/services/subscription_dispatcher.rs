//! Billing event dispatcher
//!
//! Classifies a verified billing event and reconciles the local subscription
//! row. Writes are last-write-wins upserts keyed by user id; there is no
//! deduplication or ordering of events.

use chrono::Utc;
use faceup_common::events::{EventBus, FaceUpEvent};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::db::subscriptions::{self, SubscriptionUpsert};
use crate::models::subscription::{STATUS_ACTIVE, STATUS_CANCELED};
use crate::models::PlanCatalog;
use crate::services::billing_client::{BillingError, BillingProvider, BillingSubscription};
use crate::services::webhook_verifier::BillingEvent;

/// Billing event classes handled by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEventKind {
    CheckoutCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    PaymentSucceeded,
    PaymentFailed,
    Other(String),
}

impl BillingEventKind {
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => BillingEventKind::CheckoutCompleted,
            "customer.subscription.created" => BillingEventKind::SubscriptionCreated,
            "customer.subscription.updated" => BillingEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => BillingEventKind::SubscriptionDeleted,
            "invoice.payment_succeeded" => BillingEventKind::PaymentSucceeded,
            "invoice.payment_failed" => BillingEventKind::PaymentFailed,
            other => BillingEventKind::Other(other.to_string()),
        }
    }
}

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Subscription row written
    Applied { user_id: String, status: String },
    /// Recognised event that could not be attributed; nothing written
    Dropped(String),
    /// Event type not handled
    Ignored(String),
}

/// Handler failure after signature verification (maps to 500)
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Billing provider error: {0}")]
    Billing(#[from] BillingError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] faceup_common::Error),

    #[error("Malformed event payload: {0}")]
    Payload(String),
}

/// Applies billing events to the subscription store
#[derive(Clone)]
pub struct SubscriptionDispatcher {
    db: SqlitePool,
    billing: Arc<dyn BillingProvider>,
    plans: PlanCatalog,
    event_bus: EventBus,
}

impl SubscriptionDispatcher {
    pub fn new(
        db: SqlitePool,
        billing: Arc<dyn BillingProvider>,
        plans: PlanCatalog,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            billing,
            plans,
            event_bus,
        }
    }

    pub async fn dispatch(&self, event: &BillingEvent) -> Result<DispatchOutcome, DispatchError> {
        let kind = BillingEventKind::classify(&event.event_type);
        let object = &event.data.object;

        let outcome = match kind {
            BillingEventKind::CheckoutCompleted => self.on_checkout_completed(object).await?,
            BillingEventKind::SubscriptionCreated | BillingEventKind::SubscriptionUpdated => {
                self.on_subscription_changed(object, None).await?
            }
            BillingEventKind::SubscriptionDeleted => {
                self.on_subscription_changed(object, Some(STATUS_CANCELED)).await?
            }
            BillingEventKind::PaymentSucceeded => {
                self.on_invoice(object, Some(STATUS_ACTIVE)).await?
            }
            BillingEventKind::PaymentFailed => self.on_invoice(object, None).await?,
            BillingEventKind::Other(event_type) => {
                tracing::info!(event_id = %event.id, event_type = %event_type, "Unhandled billing event type");
                return Ok(DispatchOutcome::Ignored(event_type));
            }
        };

        match &outcome {
            DispatchOutcome::Applied { user_id, status } => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                user_id = %user_id,
                status = %status,
                "Subscription updated from billing event"
            ),
            DispatchOutcome::Dropped(reason) => tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                reason = %reason,
                "Billing event dropped"
            ),
            DispatchOutcome::Ignored(_) => {}
        }

        Ok(outcome)
    }

    async fn on_checkout_completed(&self, session: &Value) -> Result<DispatchOutcome, DispatchError> {
        let user_id = non_blank_str(session.get("client_reference_id"))
            .or_else(|| non_blank_str(session.pointer("/metadata/userId")));
        let Some(user_id) = user_id else {
            return Ok(DispatchOutcome::Dropped(
                "checkout session has no user id".to_string(),
            ));
        };

        let Some(subscription_id) = reference_id(session.get("subscription")) else {
            return Ok(DispatchOutcome::Dropped(
                "checkout session has no subscription".to_string(),
            ));
        };

        let subscription = self.billing.retrieve_subscription(&subscription_id).await?;
        let status = subscription.status.clone();
        self.apply(&user_id, &subscription, status).await
    }

    async fn on_subscription_changed(
        &self,
        object: &Value,
        forced_status: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let subscription = BillingSubscription::from_value(object)
            .map_err(|e| DispatchError::Payload(e.to_string()))?;

        let Some(user_id) = subscription.metadata_user_id().map(str::to_string) else {
            return Ok(DispatchOutcome::Dropped(format!(
                "subscription {} has no userId metadata",
                subscription.id
            )));
        };

        let status = forced_status
            .map(str::to_string)
            .unwrap_or_else(|| subscription.status.clone());
        self.apply(&user_id, &subscription, status).await
    }

    async fn on_invoice(
        &self,
        invoice: &Value,
        forced_status: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let subscription_id = reference_id(invoice.get("subscription")).or_else(|| {
            reference_id(invoice.pointer("/parent/subscription_details/subscription"))
        });
        let Some(subscription_id) = subscription_id else {
            return Ok(DispatchOutcome::Dropped(
                "invoice has no subscription".to_string(),
            ));
        };

        let subscription = self.billing.retrieve_subscription(&subscription_id).await?;

        let user_id = match subscription.metadata_user_id() {
            Some(user_id) => Some(user_id.to_string()),
            None => subscriptions::find_user_by_stripe_subscription(&self.db, &subscription.id).await?,
        };
        let Some(user_id) = user_id else {
            return Ok(DispatchOutcome::Dropped(format!(
                "no user found for subscription {}",
                subscription.id
            )));
        };

        let status = forced_status
            .map(str::to_string)
            .unwrap_or_else(|| subscription.status.clone());
        self.apply(&user_id, &subscription, status).await
    }

    async fn apply(
        &self,
        user_id: &str,
        subscription: &BillingSubscription,
        status: String,
    ) -> Result<DispatchOutcome, DispatchError> {
        let plan_type = self.plans.plan_for(subscription.price_id.as_deref());

        let record = SubscriptionUpsert {
            user_id: user_id.to_string(),
            stripe_customer_id: subscription.customer.clone(),
            stripe_subscription_id: Some(subscription.id.clone()),
            status: status.clone(),
            plan_type,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
        };
        subscriptions::upsert_subscription(&self.db, &record).await?;

        self.event_bus.emit_lossy(FaceUpEvent::SubscriptionUpdated {
            user_id: user_id.to_string(),
            status: status.clone(),
            plan_type: plan_type.to_string(),
            timestamp: Utc::now(),
        });

        Ok(DispatchOutcome::Applied {
            user_id: user_id.to_string(),
            status,
        })
    }
}

fn non_blank_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Object reference given either as an id string or an expanded object
fn reference_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Object(obj)) => non_blank_str(obj.get("id")),
        other => non_blank_str(other),
    }
}
