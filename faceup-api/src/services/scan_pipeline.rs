//! Scan pipeline controller
//!
//! `start` persists a new session and returns at once; the rest of the work
//! runs in a detached task per session:
//!
//! 1. analyzing (25)
//! 2. face analysis, substituting the fixed fallback on any provider error
//! 3. generating_suggestions (50) with the analysis attached
//! 4. suggestion generation (errors fail the session)
//! 5. saving_results (75)
//! 6. suggestion records written in one transaction
//! 7. completed (100)
//!
//! There is no cancellation and no resumption: a process exit mid-run leaves
//! the row in its last non-terminal status.

use chrono::Utc;
use faceup_common::events::{EventBus, FaceUpEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db;
use crate::models::{
    FaceAnalysis, ScanPreferences, ScanSession, ScanSessionSummary, ScanStatus, TransitionError,
};
use crate::services::analysis_client::FaceAnalyzer;
use crate::services::suggestion_client::{GenerationError, SuggestionGenerator};

/// History listings are capped at this many sessions
pub const HISTORY_LIMIT: i64 = 50;

/// Scan pipeline errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0}")]
    Validation(String),

    #[error("Scan session not found: {0}")]
    NotFound(String),

    #[error("Scan session not completed (status {status}, progress {progress})")]
    NotReady { status: ScanStatus, progress: u8 },

    #[error("Suggestion generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] faceup_common::Error),

    #[error("Invalid state transition: {0}")]
    Transition(#[from] TransitionError),
}

/// Owns the scan lifecycle and its provider clients
#[derive(Clone)]
pub struct ScanPipeline {
    db: SqlitePool,
    event_bus: EventBus,
    analyzer: Arc<dyn FaceAnalyzer>,
    generator: Arc<dyn SuggestionGenerator>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl ScanPipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        analyzer: Arc<dyn FaceAnalyzer>,
        generator: Arc<dyn SuggestionGenerator>,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            db,
            event_bus,
            analyzer,
            generator,
            last_error,
        }
    }

    /// Create a session and spawn its continuation
    ///
    /// A missing or blank image URL is rejected before anything is stored.
    pub async fn start(
        &self,
        user_id: Option<String>,
        image_url: Option<String>,
        preferences: ScanPreferences,
    ) -> Result<ScanSession, ScanError> {
        let image_url = image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ScanError::Validation("imageUrl is required".to_string()))?;
        let user_id = user_id.filter(|id| !id.trim().is_empty());

        let session = ScanSession::new(user_id, image_url, preferences);
        db::sessions::insert_session(&self.db, &session).await?;

        tracing::info!(
            session_id = %session.session_id,
            user_id = ?session.user_id,
            "Scan session created"
        );

        self.event_bus.emit_lossy(FaceUpEvent::ScanSessionStarted {
            session_id: session.session_id,
            user_id: session.user_id.clone(),
            timestamp: Utc::now(),
        });

        let pipeline = self.clone();
        let session_clone = session.clone();
        tokio::spawn(async move {
            pipeline.execute(session_clone).await;
        });

        Ok(session)
    }

    /// Current snapshot; suggestions only present once completed
    pub async fn get_status(&self, session_id: &str) -> Result<ScanSession, ScanError> {
        let not_found = || ScanError::NotFound(session_id.to_string());
        let id = Uuid::parse_str(session_id).map_err(|_| not_found())?;

        db::sessions::load_session(&self.db, id)
            .await?
            .ok_or_else(not_found)
    }

    /// Completed session, or `NotReady` carrying the current status
    pub async fn get_result(&self, session_id: &str) -> Result<ScanSession, ScanError> {
        let session = self.get_status(session_id).await?;
        if session.status != ScanStatus::Completed {
            return Err(ScanError::NotReady {
                status: session.status,
                progress: session.progress,
            });
        }
        Ok(session)
    }

    /// A user's sessions, newest first
    pub async fn history(&self, user_id: &str) -> Result<Vec<ScanSessionSummary>, ScanError> {
        Ok(db::sessions::list_sessions_for_user(&self.db, user_id, HISTORY_LIMIT).await?)
    }

    /// Background continuation; always leaves the session terminal unless
    /// every store write fails
    async fn execute(&self, mut session: ScanSession) {
        let session_id = session.session_id;
        tracing::debug!(session_id = %session_id, "Scan continuation started");

        let error = match self.run(&mut session).await {
            Ok(()) => return,
            Err(e) => e,
        };

        let message = error.to_string();
        tracing::error!(session_id = %session_id, error = %message, "Scan session failed");
        *self.last_error.write().await = Some(message.clone());

        if self.record_failure(&mut session, &message).await {
            self.event_bus.emit_lossy(FaceUpEvent::ScanSessionFailed {
                session_id,
                error: message,
                timestamp: Utc::now(),
            });
        }
    }

    async fn run(&self, session: &mut ScanSession) -> Result<(), ScanError> {
        self.transition(session, ScanStatus::Analyzing, 25).await?;

        let analysis = match self.analyzer.analyze(&session.image_url).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Face analysis failed, using fallback analysis"
                );
                FaceAnalysis::fallback()
            }
        };
        let used_fallback = analysis.fallback;
        session.attach_analysis(analysis.clone());
        self.transition(session, ScanStatus::GeneratingSuggestions, 50).await?;

        let generated = self.generator.generate(&analysis, &session.preferences).await?;
        if generated.suggestions.is_empty() {
            return Err(GenerationError::EmptyResult.into());
        }

        self.transition(session, ScanStatus::SavingResults, 75).await?;
        db::suggestions::insert_suggestions(&self.db, session.session_id, &generated.suggestions)
            .await?;

        let suggestion_count = generated.suggestions.len();
        session.complete(
            generated.suggestions,
            generated.general_advice,
            generated.occasion_looks,
        )?;
        db::sessions::update_session(&self.db, session).await?;

        tracing::info!(
            session_id = %session.session_id,
            suggestions = suggestion_count,
            fallback_analysis = used_fallback,
            "Scan session completed"
        );
        self.event_bus.emit_lossy(FaceUpEvent::ScanSessionCompleted {
            session_id: session.session_id,
            suggestion_count,
            used_fallback_analysis: used_fallback,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    async fn transition(
        &self,
        session: &mut ScanSession,
        status: ScanStatus,
        progress: u8,
    ) -> Result<(), ScanError> {
        let transition = session.advance(status, progress)?;
        db::sessions::update_session(&self.db, session).await?;

        tracing::debug!(
            session_id = %transition.session_id,
            from = %transition.old_status,
            to = %transition.new_status,
            progress = transition.progress,
            "Scan session advanced"
        );
        self.event_bus.emit_lossy(FaceUpEvent::ScanProgressUpdate {
            session_id: transition.session_id,
            status: transition.new_status.to_string(),
            progress: transition.progress,
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    /// Persist `failed`, falling back to a direct status update
    ///
    /// Returns whether the row is now marked failed.
    async fn record_failure(&self, session: &mut ScanSession, message: &str) -> bool {
        let session_id = session.session_id;

        if session.fail(message).is_ok() {
            match db::sessions::update_session(&self.db, session).await {
                Ok(()) => return true,
                Err(e) => tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to save failed session, trying direct update"
                ),
            }
        }

        match db::sessions::mark_failed(&self.db, session_id, message).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Direct failure update also failed; session left non-terminal"
                );
                false
            }
        }
    }
}
