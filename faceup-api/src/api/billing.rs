//! Subscription endpoints
//!
//! POST /stripe/create-checkout, GET /stripe/subscription/:user_id,
//! POST /stripe/webhook

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::PlanType;
use crate::services::webhook_verifier::SIGNATURE_HEADER;
use crate::services::CheckoutSession;
use crate::AppState;

/// POST /stripe/create-checkout request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub price_id: Option<String>,
}

/// GET /stripe/subscription response
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubscriptionStatusResponse {
    #[serde(rename_all = "camelCase")]
    Subscribed {
        has_subscription: bool,
        status: String,
        plan_type: PlanType,
        current_period_end: Option<DateTime<Utc>>,
    },
    Free {
        plan: &'static str,
        status: &'static str,
    },
}

/// POST /stripe/webhook response
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{} is required", name)))
}

/// POST /stripe/create-checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutSession>> {
    let Json(request) = payload?;
    let user_id = required(request.user_id, "userId")?;
    let price_id = required(request.price_id, "priceId")?;

    let session = state
        .billing
        .create_checkout_session(&user_id, &price_id)
        .await?;
    Ok(Json(session))
}

/// GET /stripe/subscription/:user_id
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<SubscriptionStatusResponse>> {
    let response = match crate::db::subscriptions::load_subscription(&state.db, &user_id).await? {
        Some(sub) => SubscriptionStatusResponse::Subscribed {
            has_subscription: sub.has_access(),
            status: sub.status,
            plan_type: sub.plan_type,
            current_period_end: sub.current_period_end,
        },
        None => SubscriptionStatusResponse::Free {
            plan: "free",
            status: "inactive",
        },
    };
    Ok(Json(response))
}

/// POST /stripe/webhook
///
/// Needs the raw body: the signature covers the exact bytes received.
/// Unattributable or unhandled events are still acknowledged.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let event = state
        .webhook_verifier
        .verify(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected billing webhook");
            ApiError::from(e)
        })?;

    tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Billing webhook verified");

    state.dispatcher.dispatch(&event).await.map_err(|e| {
        tracing::error!(event_id = %event.id, error = %e, "Billing webhook handler failed");
        ApiError::from(e)
    })?;

    Ok(Json(WebhookAck { received: true }))
}

/// Build billing routes
pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/stripe/create-checkout", post(create_checkout))
        .route("/stripe/subscription/:user_id", get(get_subscription))
        .route("/stripe/webhook", post(stripe_webhook))
}
