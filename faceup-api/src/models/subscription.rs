//! Local subscription record mirrored from the billing provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription status forced by a `customer.subscription.deleted` event
pub const STATUS_CANCELED: &str = "canceled";
/// Subscription status forced by an `invoice.payment_succeeded` event
pub const STATUS_ACTIVE: &str = "active";

/// Billing plan derived from the first line item's price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Monthly,
    Yearly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Yearly => "yearly",
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
            "monthly" => Ok(PlanType::Monthly),
            "yearly" => Ok(PlanType::Yearly),
            other => Err(format!("Unknown plan type: {}", other)),
        }
    }
}

/// Fixed price id → plan lookup table
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    monthly_price_id: Option<String>,
    yearly_price_id: Option<String>,
}

impl PlanCatalog {
    pub fn new(monthly_price_id: Option<String>, yearly_price_id: Option<String>) -> Self {
        Self {
            monthly_price_id,
            yearly_price_id,
        }
    }

    /// Unrecognised or absent price ids map to `monthly`
    pub fn plan_for(&self, price_id: Option<&str>) -> PlanType {
        match price_id {
            Some(id) if self.yearly_price_id.as_deref() == Some(id) => PlanType::Yearly,
            Some(id) if self.monthly_price_id.as_deref() == Some(id) => PlanType::Monthly,
            _ => PlanType::Monthly,
        }
    }
}

/// One subscription row per user (upsert key: `user_id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Provider-defined: active / trialing / past_due / canceled / unpaid ...
    pub status: String,
    pub plan_type: PlanType,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Paid access is granted while active or trialing
    pub fn has_access(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}
