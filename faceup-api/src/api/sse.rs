//! Server-Sent Events for scan progress
//!
//! Best-effort mirror of the polling endpoints: events emitted while no
//! client is connected are lost.

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use faceup_common::events::FaceUpEvent;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GET /scan-events query
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEventsQuery {
    pub session_id: Option<Uuid>,
}

fn is_scan_event(event: &FaceUpEvent) -> bool {
    matches!(
        event,
        FaceUpEvent::ScanSessionStarted { .. }
            | FaceUpEvent::ScanProgressUpdate { .. }
            | FaceUpEvent::ScanSessionCompleted { .. }
            | FaceUpEvent::ScanSessionFailed { .. }
    )
}

/// GET /scan-events - SSE stream of scan lifecycle events
///
/// `?sessionId=` restricts the stream to one session.
pub async fn scan_event_stream(
    State(state): State<AppState>,
    Query(query): Query<ScanEventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = ?query.session_id, "New SSE client connected to scan events");

    let mut rx = state.event_bus.subscribe();
    let filter = query.session_id;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !is_scan_event(&event) {
                        continue;
                    }
                    if filter.is_some() && event.session_id() != filter {
                        continue;
                    }

                    let event_type = event.event_type().to_string();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting scan event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build SSE routes
pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/scan-events", get(scan_event_stream))
}
