//! Scan session database operations
//!
//! Updates are guarded by `status NOT IN ('completed', 'failed')` so a row that
//! has reached a terminal state is never overwritten.

use chrono::Utc;
use faceup_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::parse_timestamp;
use crate::models::{
    FaceAnalysis, OccasionLook, ScanPreferences, ScanSession, ScanSessionSummary, ScanStatus,
};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const SESSION_COLUMNS: &str = r#"
    session_id, user_id, image_url, preferences, status, progress,
    face_analysis, general_advice, occasion_looks, error_message,
    created_at, updated_at
"#;

/// Insert a freshly created session
pub async fn insert_session(pool: &SqlitePool, session: &ScanSession) -> Result<()> {
    let preferences = to_json("preferences", &session.preferences)?;
    let face_analysis = session
        .face_analysis
        .as_ref()
        .map(|a| to_json("face_analysis", a))
        .transpose()?;

    sqlx::query(&format!(
        "INSERT INTO scan_sessions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        SESSION_COLUMNS
    ))
    .bind(session.session_id.to_string())
    .bind(&session.user_id)
    .bind(&session.image_url)
    .bind(preferences)
    .bind(session.status.as_str())
    .bind(session.progress as i64)
    .bind(face_analysis)
    .bind(&session.general_advice)
    .bind(
        session
            .occasion_looks
            .as_ref()
            .map(|l| to_json("occasion_looks", l))
            .transpose()?,
    )
    .bind(&session.error_message)
    .bind(session.created_at.to_rfc3339())
    .bind(session.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the session's mutable fields back to its row
///
/// Fails if the row is missing or already terminal.
pub async fn update_session(pool: &SqlitePool, session: &ScanSession) -> Result<()> {
    // Prepare all data BEFORE acquiring database connection
    let session_id = session.session_id.to_string();
    let status = session.status.as_str();
    let progress = session.progress as i64;
    let face_analysis = session
        .face_analysis
        .as_ref()
        .map(|a| to_json("face_analysis", a))
        .transpose()?;
    let occasion_looks = session
        .occasion_looks
        .as_ref()
        .map(|l| to_json("occasion_looks", l))
        .transpose()?;
    let updated_at = session.updated_at.to_rfc3339();

    retry_on_lock("update scan session", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE scan_sessions
            SET status = ?,
                progress = ?,
                face_analysis = ?,
                general_advice = ?,
                occasion_looks = ?,
                error_message = ?,
                updated_at = ?
            WHERE session_id = ?
              AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(status)
        .bind(progress)
        .bind(&face_analysis)
        .bind(&session.general_advice)
        .bind(&occasion_looks)
        .bind(&session.error_message)
        .bind(&updated_at)
        .bind(&session_id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Internal(format!(
                "Scan session {} is missing or already terminal",
                session_id
            )));
        }
        Ok(())
    })
    .await
}

/// Mark a session failed without going through the in-memory model
///
/// Used when the model-level write itself failed. Returns whether a row changed.
pub async fn mark_failed(pool: &SqlitePool, session_id: Uuid, message: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE scan_sessions
        SET status = 'failed',
            error_message = ?,
            updated_at = ?
        WHERE session_id = ?
          AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load a session snapshot; suggestions are attached only when completed
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<ScanSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM scan_sessions WHERE session_id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut session = session_from_row(&row)?;
    if session.status == ScanStatus::Completed {
        let suggestions = crate::db::suggestions::load_suggestions(pool, session_id).await?;
        session.suggestions = Some(suggestions);
    }

    Ok(Some(session))
}

/// A user's sessions, newest first
pub async fn list_sessions_for_user(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ScanSessionSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT session_id, status, progress, image_url, created_at, updated_at
        FROM scan_sessions
        WHERE user_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: String = row.get("created_at");
            let updated_at: String = row.get("updated_at");
            Ok(ScanSessionSummary {
                session_id: parse_session_id(row)?,
                status: parse_status(row)?,
                progress: clamp_progress(row.get("progress")),
                image_url: row.get("image_url"),
                created_at: parse_timestamp("created_at", &created_at)?,
                updated_at: parse_timestamp("updated_at", &updated_at)?,
            })
        })
        .collect()
}

fn session_from_row(row: &SqliteRow) -> Result<ScanSession> {
    let preferences: String = row.get("preferences");
    let preferences: ScanPreferences = from_json("preferences", &preferences)?;

    let face_analysis: Option<String> = row.get("face_analysis");
    let face_analysis: Option<FaceAnalysis> = face_analysis
        .map(|s| from_json("face_analysis", &s))
        .transpose()?;

    let occasion_looks: Option<String> = row.get("occasion_looks");
    let occasion_looks: Option<Vec<OccasionLook>> = occasion_looks
        .map(|s| from_json("occasion_looks", &s))
        .transpose()?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ScanSession {
        session_id: parse_session_id(row)?,
        user_id: row.get("user_id"),
        image_url: row.get("image_url"),
        preferences,
        status: parse_status(row)?,
        progress: clamp_progress(row.get("progress")),
        face_analysis,
        suggestions: None,
        general_advice: row.get("general_advice"),
        occasion_looks,
        error_message: row.get("error_message"),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn parse_session_id(row: &SqliteRow) -> Result<Uuid> {
    let session_id: String = row.get("session_id");
    Uuid::parse_str(&session_id)
        .map_err(|e| Error::Internal(format!("Failed to parse session_id: {}", e)))
}

fn parse_status(row: &SqliteRow) -> Result<ScanStatus> {
    let status: String = row.get("status");
    status.parse::<ScanStatus>().map_err(Error::Internal)
}

fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HairstyleSuggestion;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_database_pool(&dir.path().join("test.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    fn suggestion(name: &str) -> HairstyleSuggestion {
        HairstyleSuggestion {
            name: name.to_string(),
            description: "desc".to_string(),
            length: "medium".to_string(),
            maintenance: "low".to_string(),
            best_for: "round faces".to_string(),
            styling_tips: "tips".to_string(),
            confidence: 0.75,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let (_dir, pool) = test_pool().await;
        let session = ScanSession::new(
            Some("user-1".to_string()),
            "https://x/y.jpg".to_string(),
            ScanPreferences {
                mood: Some("bold".to_string()),
                style: None,
                gender: Some("female".to_string()),
            },
        );
        insert_session(&pool, &session).await.unwrap();

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScanStatus::Processing);
        assert_eq!(loaded.progress, 0);
        assert_eq!(loaded.preferences, session.preferences);
        assert!(loaded.suggestions.is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_is_none() {
        let (_dir, pool) = test_pool().await;
        assert!(load_session(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_row_is_not_overwritten() {
        let (_dir, pool) = test_pool().await;
        let mut session =
            ScanSession::new(None, "https://x/y.jpg".to_string(), ScanPreferences::default());
        insert_session(&pool, &session).await.unwrap();

        session.fail("generator down").unwrap();
        update_session(&pool, &session).await.unwrap();

        // A stale in-memory copy must not resurrect the row
        let mut stale = session.clone();
        stale.status = ScanStatus::SavingResults;
        stale.progress = 75;
        assert!(update_session(&pool, &stale).await.is_err());
        assert!(!mark_failed(&pool, session.session_id, "again").await.unwrap());

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScanStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("generator down"));
    }

    #[tokio::test]
    async fn test_completed_session_loads_suggestions() {
        let (_dir, pool) = test_pool().await;
        let mut session =
            ScanSession::new(None, "https://x/y.jpg".to_string(), ScanPreferences::default());
        insert_session(&pool, &session).await.unwrap();

        let suggestions = vec![suggestion("Bob"), suggestion("Shag")];
        crate::db::suggestions::insert_suggestions(&pool, session.session_id, &suggestions)
            .await
            .unwrap();
        session
            .complete(suggestions.clone(), Some("advice".to_string()), None)
            .unwrap();
        update_session(&pool, &session).await.unwrap();

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScanStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert_eq!(loaded.suggestions, Some(suggestions));
        assert_eq!(loaded.general_advice.as_deref(), Some("advice"));
    }

    #[tokio::test]
    async fn test_list_sessions_for_user() {
        let (_dir, pool) = test_pool().await;
        for _ in 0..3 {
            let session = ScanSession::new(
                Some("user-7".to_string()),
                "https://x/y.jpg".to_string(),
                ScanPreferences::default(),
            );
            insert_session(&pool, &session).await.unwrap();
        }
        let other = ScanSession::new(
            Some("someone-else".to_string()),
            "https://x/z.jpg".to_string(),
            ScanPreferences::default(),
        );
        insert_session(&pool, &other).await.unwrap();

        let listed = list_sessions_for_user(&pool, "user-7", 10).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let limited = list_sessions_for_user(&pool, "user-7", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
