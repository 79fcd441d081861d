//! Data models for faceup-api

pub mod face_analysis;
pub mod scan_session;
pub mod subscription;
pub mod suggestion;

pub use face_analysis::FaceAnalysis;
pub use scan_session::{
    ScanPreferences, ScanSession, ScanSessionSummary, ScanStatus, StateTransition, TransitionError,
};
pub use subscription::{PlanCatalog, PlanType, Subscription};
pub use suggestion::{GeneratedSuggestions, HairstyleSuggestion, OccasionLook};
