//! Scan session state machine
//!
//! A session progresses through:
//! PROCESSING → ANALYZING → GENERATING_SUGGESTIONS → SAVING_RESULTS → COMPLETED
//!
//! FAILED is reachable from every non-terminal state. COMPLETED and FAILED are
//! terminal: no transition leaves them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FaceAnalysis, HairstyleSuggestion, OccasionLook};

/// Scan session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Session row created, continuation not yet started
    Processing,
    /// Waiting on the analysis provider
    Analyzing,
    /// Waiting on the suggestion generator
    GeneratingSuggestions,
    /// Writing suggestion records
    SavingResults,
    /// Suggestions available
    Completed,
    /// Terminal failure, see `error_message`
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Processing => "processing",
            ScanStatus::Analyzing => "analyzing",
            ScanStatus::GeneratingSuggestions => "generating_suggestions",
            ScanStatus::SavingResults => "saving_results",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    /// Position in the forward pipeline order
    fn rank(&self) -> u8 {
        match self {
            ScanStatus::Processing => 0,
            ScanStatus::Analyzing => 1,
            ScanStatus::GeneratingSuggestions => 2,
            ScanStatus::SavingResults => 3,
            ScanStatus::Completed => 4,
            ScanStatus::Failed => 5,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ScanStatus::Processing),
            "analyzing" => Ok(ScanStatus::Analyzing),
            "generating_suggestions" => Ok(ScanStatus::GeneratingSuggestions),
            "saving_results" => Ok(ScanStatus::SavingResults),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(format!("Unknown scan status: {}", other)),
        }
    }
}

/// Rejected state machine transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("session already terminal ({0})")]
    AlreadyTerminal(ScanStatus),

    #[error("cannot move backwards from {from} to {to}")]
    Backwards { from: ScanStatus, to: ScanStatus },

    #[error("progress cannot decrease from {from} to {to}")]
    ProgressDecrease { from: u8, to: u8 },

    #[error("{0} must be entered through complete() or fail()")]
    TerminalTarget(ScanStatus),
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_status: ScanStatus,
    pub new_status: ScanStatus,
    pub progress: u8,
    pub transitioned_at: DateTime<Utc>,
}

/// Style preferences supplied with a scan request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPreferences {
    pub mood: Option<String>,
    pub style: Option<String>,
    pub gender: Option<String>,
}

/// One face-scan request's full lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub image_url: String,
    pub preferences: ScanPreferences,
    pub status: ScanStatus,
    /// 0-100, non-decreasing while not failed
    pub progress: u8,
    pub face_analysis: Option<FaceAnalysis>,
    /// Present only once the session is completed
    pub suggestions: Option<Vec<HairstyleSuggestion>>,
    pub general_advice: Option<String>,
    pub occasion_looks: Option<Vec<OccasionLook>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanSession {
    /// Create new session in `processing` at progress 0
    pub fn new(user_id: Option<String>, image_url: String, preferences: ScanPreferences) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            image_url,
            preferences,
            status: ScanStatus::Processing,
            progress: 0,
            face_analysis: None,
            suggestions: None,
            general_advice: None,
            occasion_looks: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move forward to a non-terminal status with a new progress value
    pub fn advance(
        &mut self,
        new_status: ScanStatus,
        progress: u8,
    ) -> Result<StateTransition, TransitionError> {
        if new_status.is_terminal() {
            return Err(TransitionError::TerminalTarget(new_status));
        }
        self.check_not_terminal()?;
        if new_status.rank() < self.status.rank() {
            return Err(TransitionError::Backwards {
                from: self.status,
                to: new_status,
            });
        }
        if progress < self.progress {
            return Err(TransitionError::ProgressDecrease {
                from: self.progress,
                to: progress.min(100),
            });
        }

        Ok(self.apply(new_status, progress.min(100)))
    }

    /// Attach the (possibly fallback) analysis result
    pub fn attach_analysis(&mut self, analysis: FaceAnalysis) {
        self.face_analysis = Some(analysis);
        self.updated_at = Utc::now();
    }

    /// Enter `completed` at progress 100 with the generated results
    pub fn complete(
        &mut self,
        suggestions: Vec<HairstyleSuggestion>,
        general_advice: Option<String>,
        occasion_looks: Option<Vec<OccasionLook>>,
    ) -> Result<StateTransition, TransitionError> {
        self.check_not_terminal()?;
        self.suggestions = Some(suggestions);
        self.general_advice = general_advice;
        self.occasion_looks = occasion_looks;
        Ok(self.apply(ScanStatus::Completed, 100))
    }

    /// Enter `failed`, recording the error message
    ///
    /// Progress is left where the failure happened.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<StateTransition, TransitionError> {
        self.check_not_terminal()?;
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Scan processing failed".to_string();
        }
        self.error_message = Some(message);
        let progress = self.progress;
        Ok(self.apply(ScanStatus::Failed, progress))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn check_not_terminal(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            Err(TransitionError::AlreadyTerminal(self.status))
        } else {
            Ok(())
        }
    }

    fn apply(&mut self, new_status: ScanStatus, progress: u8) -> StateTransition {
        let now = Utc::now();
        let transition = StateTransition {
            session_id: self.session_id,
            old_status: self.status,
            new_status,
            progress,
            transitioned_at: now,
        };
        self.status = new_status;
        self.progress = progress;
        self.updated_at = now;
        transition
    }
}

/// Condensed row for history listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSessionSummary {
    pub session_id: Uuid,
    pub status: ScanStatus,
    pub progress: u8,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ScanSession {
        ScanSession::new(None, "https://x/y.jpg".to_string(), ScanPreferences::default())
    }

    fn suggestion() -> HairstyleSuggestion {
        HairstyleSuggestion {
            name: "Textured Crop".to_string(),
            description: "Short and choppy".to_string(),
            length: "short".to_string(),
            maintenance: "low".to_string(),
            best_for: "oval faces".to_string(),
            styling_tips: "Matte paste".to_string(),
            confidence: 0.9,
            image_url: None,
        }
    }

    #[test]
    fn test_new_session_starts_processing() {
        let s = session();
        assert_eq!(s.status, ScanStatus::Processing);
        assert_eq!(s.progress, 0);
        assert!(s.suggestions.is_none());
        assert!(s.error_message.is_none());
    }

    #[test]
    fn test_full_forward_path() {
        let mut s = session();
        s.advance(ScanStatus::Analyzing, 25).unwrap();
        s.attach_analysis(FaceAnalysis::fallback());
        s.advance(ScanStatus::GeneratingSuggestions, 50).unwrap();
        s.advance(ScanStatus::SavingResults, 75).unwrap();
        let t = s
            .complete(vec![suggestion()], Some("Keep it simple".to_string()), None)
            .unwrap();

        assert_eq!(t.old_status, ScanStatus::SavingResults);
        assert_eq!(s.status, ScanStatus::Completed);
        assert_eq!(s.progress, 100);
        assert_eq!(s.suggestions.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut s = session();
        s.fail("boom").unwrap();
        assert_eq!(
            s.advance(ScanStatus::Analyzing, 25).unwrap_err(),
            TransitionError::AlreadyTerminal(ScanStatus::Failed)
        );
        assert!(s.complete(vec![suggestion()], None, None).is_err());
        assert!(s.fail("again").is_err());
        assert_eq!(s.error_message.as_deref(), Some("boom"));

        let mut s = session();
        s.complete(vec![suggestion()], None, None).unwrap();
        assert!(s.fail("late").is_err());
        assert!(s.error_message.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut s = session();
        s.advance(ScanStatus::GeneratingSuggestions, 50).unwrap();
        assert!(matches!(
            s.advance(ScanStatus::SavingResults, 40),
            Err(TransitionError::ProgressDecrease { .. })
        ));
        assert!(matches!(
            s.advance(ScanStatus::Analyzing, 60),
            Err(TransitionError::Backwards { .. })
        ));
        assert_eq!(s.progress, 50);
    }

    #[test]
    fn test_advance_rejects_terminal_targets() {
        let mut s = session();
        assert_eq!(
            s.advance(ScanStatus::Completed, 100).unwrap_err(),
            TransitionError::TerminalTarget(ScanStatus::Completed)
        );
    }

    #[test]
    fn test_fail_keeps_progress_and_requires_message() {
        let mut s = session();
        s.advance(ScanStatus::Analyzing, 25).unwrap();
        s.fail("").unwrap();
        assert_eq!(s.progress, 25);
        assert!(!s.error_message.unwrap().is_empty());
    }

    #[test]
    fn test_status_wire_names() {
        for status in [
            ScanStatus::Processing,
            ScanStatus::Analyzing,
            ScanStatus::GeneratingSuggestions,
            ScanStatus::SavingResults,
            ScanStatus::Completed,
            ScanStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<ScanStatus>().unwrap(), status);
        }
    }
}
