//! Hairstyle suggestion records (children of a scan session)

use chrono::Utc;
use faceup_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::HairstyleSuggestion;

/// Insert all suggestions for a session in one transaction
///
/// Position follows slice order.
pub async fn insert_suggestions(
    pool: &SqlitePool,
    session_id: Uuid,
    suggestions: &[HairstyleSuggestion],
) -> Result<()> {
    let session_id = session_id.to_string();
    let created_at = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    for (position, suggestion) in suggestions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO hairstyle_suggestions (
                session_id, position, name, description, length, maintenance,
                best_for, styling_tips, confidence, image_url, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session_id)
        .bind(position as i64)
        .bind(&suggestion.name)
        .bind(&suggestion.description)
        .bind(&suggestion.length)
        .bind(&suggestion.maintenance)
        .bind(&suggestion.best_for)
        .bind(&suggestion.styling_tips)
        .bind(suggestion.confidence as f64)
        .bind(&suggestion.image_url)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!(session_id = %session_id, count = suggestions.len(), "Suggestions persisted");
    Ok(())
}

/// Load a session's suggestions in generation order
pub async fn load_suggestions(
    pool: &SqlitePool,
    session_id: Uuid,
) -> Result<Vec<HairstyleSuggestion>> {
    let rows = sqlx::query(
        r#"
        SELECT name, description, length, maintenance, best_for,
               styling_tips, confidence, image_url
        FROM hairstyle_suggestions
        WHERE session_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| HairstyleSuggestion {
            name: row.get("name"),
            description: row.get("description"),
            length: row.get("length"),
            maintenance: row.get("maintenance"),
            best_for: row.get("best_for"),
            styling_tips: row.get("styling_tips"),
            confidence: row.get::<f64, _>("confidence") as f32,
            image_url: row.get("image_url"),
        })
        .collect())
}
