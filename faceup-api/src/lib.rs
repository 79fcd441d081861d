//! faceup-api library interface
//!
//! Exposes the router and application state for the binary and for
//! integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use faceup_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::PlanCatalog;
use crate::services::{
    BillingProvider, FaceAnalyzer, ImageStore, ScanPipeline, SubscriptionDispatcher,
    SuggestionGenerator, WebhookVerifier,
};

/// Largest accepted image upload
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Request body cap; leaves headroom for multipart framing around the image
const BODY_LIMIT_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

/// External providers, constructed once at startup
#[derive(Clone)]
pub struct Providers {
    pub analyzer: Arc<dyn FaceAnalyzer>,
    pub generator: Arc<dyn SuggestionGenerator>,
    pub billing: Arc<dyn BillingProvider>,
    pub image_store: Arc<dyn ImageStore>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub pipeline: ScanPipeline,
    pub billing: Arc<dyn BillingProvider>,
    pub dispatcher: SubscriptionDispatcher,
    pub webhook_verifier: WebhookVerifier,
    pub image_store: Arc<dyn ImageStore>,
    /// Only origin allowed by CORS
    pub frontend_url: String,
    pub startup_time: DateTime<Utc>,
    /// Last pipeline error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        providers: Providers,
        plans: PlanCatalog,
        webhook_verifier: WebhookVerifier,
        frontend_url: String,
    ) -> Self {
        let last_error = Arc::new(RwLock::new(None));

        let pipeline = ScanPipeline::new(
            db.clone(),
            event_bus.clone(),
            providers.analyzer,
            providers.generator,
            last_error.clone(),
        );
        let dispatcher = SubscriptionDispatcher::new(
            db.clone(),
            providers.billing.clone(),
            plans,
            event_bus.clone(),
        );

        Self {
            db,
            event_bus,
            pipeline,
            billing: providers.billing,
            dispatcher,
            webhook_verifier,
            image_store: providers.image_store,
            frontend_url,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// CORS restricted to the configured frontend origin
///
/// An origin that is not a valid header value allows no cross-origin access.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = frontend_url.trim().trim_end_matches('/');
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            tracing::warn!(
                frontend_url = %frontend_url,
                error = %e,
                "Invalid frontend origin, cross-origin requests disabled"
            );
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.frontend_url);

    Router::new()
        .merge(api::scan_routes())
        .merge(api::upload_routes())
        .merge(api::billing_routes())
        .merge(api::sse_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
