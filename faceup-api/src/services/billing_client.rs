//! Billing provider (Stripe REST API)

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

/// Billing provider errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider not configured: missing secret key")]
    MissingSecretKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Provider-side subscription, reduced to the fields mirrored locally
#[derive(Debug, Clone, PartialEq)]
pub struct BillingSubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    /// Price of the first line item
    pub price_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl BillingSubscription {
    /// Parse a Stripe `subscription` object
    ///
    /// `customer` may be an id or an expanded object. Period bounds are read
    /// from the subscription, then from the first item (newer API versions).
    pub fn from_value(object: &Value) -> Result<Self, BillingError> {
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BillingError::ParseError("subscription has no id".to_string()))?
            .to_string();

        let status = object
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| BillingError::ParseError(format!("subscription {} has no status", id)))?
            .to_string();

        let customer = match object.get("customer") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };

        let first_item = object.pointer("/items/data/0");
        let price_id = first_item
            .and_then(|item| item.pointer("/price/id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let period = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_i64)
                .or_else(|| first_item.and_then(|item| item.get(key)).and_then(Value::as_i64))
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        };

        let metadata = object
            .get("metadata")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            customer,
            status,
            price_id,
            current_period_start: period("current_period_start"),
            current_period_end: period("current_period_end"),
            metadata,
        })
    }

    /// Non-blank `metadata.userId`
    pub fn metadata_user_id(&self) -> Option<&str> {
        self.metadata
            .get("userId")
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Hosted checkout session handed back to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

/// Billing operations used by the webhook dispatcher and checkout endpoint
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<BillingSubscription, BillingError>;

    async fn create_checkout_session(
        &self,
        user_id: &str,
        price_id: &str,
    ) -> Result<CheckoutSession, BillingError>;
}

/// Stripe REST client
pub struct StripeClient {
    http_client: reqwest::Client,
    secret_key: Option<String>,
    frontend_url: String,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>, frontend_url: String) -> Result<Self, BillingError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BillingError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            secret_key,
            frontend_url,
        })
    }

    fn secret_key(&self) -> Result<&str, BillingError> {
        self.secret_key.as_deref().ok_or(BillingError::MissingSecretKey)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, BillingError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(BillingError::ApiError(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| BillingError::ParseError(e.to_string()))
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<BillingSubscription, BillingError> {
        let url = format!("{}/subscriptions/{}", STRIPE_BASE_URL, subscription_id);
        tracing::debug!(subscription_id = %subscription_id, "Retrieving Stripe subscription");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.secret_key()?)
            .send()
            .await
            .map_err(|e| BillingError::NetworkError(e.to_string()))?;

        BillingSubscription::from_value(&read_json(response).await?)
    }

    async fn create_checkout_session(
        &self,
        user_id: &str,
        price_id: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let success_url = format!(
            "{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_url
        );
        let cancel_url = format!("{}/subscription/cancel", self.frontend_url);

        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", user_id),
            ("metadata[userId]", user_id),
            ("subscription_data[metadata][userId]", user_id),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];

        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", STRIPE_BASE_URL))
            .bearer_auth(self.secret_key()?)
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::NetworkError(e.to_string()))?;

        let session: StripeCheckoutSession = serde_json::from_value(read_json(response).await?)
            .map_err(|e| BillingError::ParseError(e.to_string()))?;

        tracing::info!(user_id = %user_id, checkout_session = %session.id, "Checkout session created");

        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }
}
