//! Scan pipeline endpoints
//!
//! POST /face-scan (alias POST /ai/analyze), GET /scan-status/:session_id,
//! GET /suggestions/:session_id, GET /scan-history/:user_id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{
    FaceAnalysis, HairstyleSuggestion, OccasionLook, ScanPreferences, ScanSession,
    ScanSessionSummary, ScanStatus,
};
use crate::AppState;

/// POST /face-scan request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceScanRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// POST /face-scan response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceScanResponse {
    pub session_id: Uuid,
    pub status: ScanStatus,
    pub message: String,
}

/// GET /suggestions response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResponse {
    pub session_id: Uuid,
    pub suggestions: Vec<HairstyleSuggestion>,
    pub general_advice: Option<String>,
    pub occasion_looks: Option<Vec<OccasionLook>>,
    pub face_analysis: Option<FaceAnalysis>,
}

/// GET /scan-history response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryResponse {
    pub user_id: String,
    pub sessions: Vec<ScanSessionSummary>,
}

/// POST /face-scan
///
/// Starts a scan and returns 202 with the session id; poll /scan-status.
pub async fn start_face_scan(
    State(state): State<AppState>,
    payload: Result<Json<FaceScanRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FaceScanResponse>)> {
    let Json(request) = payload?;

    let preferences = ScanPreferences {
        mood: request.mood,
        style: request.style,
        gender: request.gender,
    };
    let session = state
        .pipeline
        .start(request.user_id, request.image_url, preferences)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(FaceScanResponse {
            session_id: session.session_id,
            status: session.status,
            message: "Face scan started. Poll /scan-status for progress.".to_string(),
        }),
    ))
}

/// GET /scan-status/:session_id
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ScanSession>> {
    let session = state.pipeline.get_status(&session_id).await?;
    tracing::debug!(session_id = %session_id, status = %session.status, "Status query");
    Ok(Json(session))
}

/// GET /suggestions/:session_id
///
/// 400 with the current status and progress until the scan completes.
pub async fn get_suggestions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let session = state.pipeline.get_result(&session_id).await?;

    Ok(Json(SuggestionsResponse {
        session_id: session.session_id,
        suggestions: session.suggestions.unwrap_or_default(),
        general_advice: session.general_advice,
        occasion_looks: session.occasion_looks,
        face_analysis: session.face_analysis,
    }))
}

/// GET /scan-history/:user_id
pub async fn get_scan_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ScanHistoryResponse>> {
    let sessions = state.pipeline.history(&user_id).await?;
    Ok(Json(ScanHistoryResponse { user_id, sessions }))
}

/// Build scan routes
pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/face-scan", post(start_face_scan))
        .route("/ai/analyze", post(start_face_scan))
        .route("/scan-status/:session_id", get(get_scan_status))
        .route("/suggestions/:session_id", get(get_suggestions))
        .route("/scan-history/:user_id", get(get_scan_history))
}
