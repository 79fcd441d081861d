//! Subscription store
//!
//! One row per user. Every write is a last-write-wins upsert: there is no
//! event sequencing, so a late-delivered event overwrites a newer one.

use chrono::{DateTime, Utc};
use faceup_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::parse_timestamp;
use crate::models::{PlanType, Subscription};

/// Fields written by an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpsert {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub plan_type: PlanType,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Insert or overwrite the user's subscription row
pub async fn upsert_subscription(pool: &SqlitePool, record: &SubscriptionUpsert) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            user_id, stripe_customer_id, stripe_subscription_id, status, plan_type,
            current_period_start, current_period_end, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            stripe_customer_id = excluded.stripe_customer_id,
            stripe_subscription_id = excluded.stripe_subscription_id,
            status = excluded.status,
            plan_type = excluded.plan_type,
            current_period_start = excluded.current_period_start,
            current_period_end = excluded.current_period_end,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.stripe_customer_id)
    .bind(&record.stripe_subscription_id)
    .bind(&record.status)
    .bind(record.plan_type.as_str())
    .bind(record.current_period_start.map(|dt| dt.to_rfc3339()))
    .bind(record.current_period_end.map(|dt| dt.to_rfc3339()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the user's subscription row
pub async fn load_subscription(pool: &SqlitePool, user_id: &str) -> Result<Option<Subscription>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, stripe_customer_id, stripe_subscription_id, status, plan_type,
               current_period_start, current_period_end, created_at, updated_at
        FROM subscriptions
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(subscription_from_row).transpose()
}

/// Find the user owning a billing-subscription reference
pub async fn find_user_by_stripe_subscription(
    pool: &SqlitePool,
    stripe_subscription_id: &str,
) -> Result<Option<String>> {
    let user_id = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM subscriptions WHERE stripe_subscription_id = ? LIMIT 1",
    )
    .bind(stripe_subscription_id)
    .fetch_optional(pool)
    .await?;

    Ok(user_id)
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription> {
    let plan_type: String = row.get("plan_type");
    let plan_type = plan_type.parse::<PlanType>().map_err(Error::Internal)?;

    let optional_ts = |column: &str| -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = row.get(column);
        value.map(|v| parse_timestamp(column, &v)).transpose()
    };

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Subscription {
        user_id: row.get("user_id"),
        stripe_customer_id: row.get("stripe_customer_id"),
        stripe_subscription_id: row.get("stripe_subscription_id"),
        status: row.get("status"),
        plan_type,
        current_period_start: optional_ts("current_period_start")?,
        current_period_end: optional_ts("current_period_end")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    fn record(status: &str) -> SubscriptionUpsert {
        SubscriptionUpsert {
            user_id: "user-1".to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            status: status.to_string(),
            plan_type: PlanType::Yearly,
            current_period_start: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            current_period_end: Some(Utc.timestamp_opt(1_731_536_000, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_last_write_wins() {
        let (_dir, pool) = test_pool().await;

        upsert_subscription(&pool, &record("active")).await.unwrap();
        upsert_subscription(&pool, &record("past_due")).await.unwrap();

        let sub = load_subscription(&pool, "user-1").await.unwrap().unwrap();
        assert_eq!(sub.status, "past_due");
        assert_eq!(sub.plan_type, PlanType::Yearly);
        assert_eq!(
            sub.current_period_end,
            Some(Utc.timestamp_opt(1_731_536_000, 0).unwrap())
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_lookup_by_stripe_subscription() {
        let (_dir, pool) = test_pool().await;
        upsert_subscription(&pool, &record("active")).await.unwrap();

        assert_eq!(
            find_user_by_stripe_subscription(&pool, "sub_1").await.unwrap().as_deref(),
            Some("user-1")
        );
        assert!(find_user_by_stripe_subscription(&pool, "sub_other")
            .await
            .unwrap()
            .is_none());
        assert!(load_subscription(&pool, "nobody").await.unwrap().is_none());
    }
}
