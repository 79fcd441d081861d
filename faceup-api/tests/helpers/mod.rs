//! Shared test fixtures: fake providers and a router backed by a temp database

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use faceup_api::models::{
    FaceAnalysis, GeneratedSuggestions, HairstyleSuggestion, OccasionLook, PlanCatalog,
    ScanPreferences,
};
use faceup_api::services::{
    AnalysisError, BillingError, BillingProvider, BillingSubscription, CheckoutSession,
    FaceAnalyzer, GenerationError, ImageStore, StorageError, SuggestionGenerator,
    WebhookVerifier,
};
use faceup_api::{build_router, AppState, Providers};
use faceup_common::events::EventBus;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const MONTHLY_PRICE: &str = "price_monthly";
pub const YEARLY_PRICE: &str = "price_yearly";
pub const FRONTEND_URL: &str = "https://app.faceup.test";

/// Analyzer returning a fixed analysis or a fixed error, optionally gated
pub struct FakeAnalyzer {
    pub fail: bool,
    pub gate: Option<Arc<Notify>>,
}

impl FakeAnalyzer {
    pub fn new(fail: bool) -> Self {
        Self { fail, gate: None }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            fail: false,
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl FaceAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _image_url: &str) -> Result<FaceAnalysis, AnalysisError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(AnalysisError::PollExhausted("pred_1".to_string(), 30));
        }
        Ok(FaceAnalysis {
            face_shape: "square".to_string(),
            skin_tone: "warm".to_string(),
            hair_texture: Some("curly".to_string()),
            features: vec!["strong jawline".to_string()],
            fallback: false,
        })
    }
}

/// Generator with an optional gate held until the test releases it
pub struct FakeGenerator {
    pub fail: bool,
    pub gate: Option<Arc<Notify>>,
    pub seen_analysis: Mutex<Option<FaceAnalysis>>,
}

impl FakeGenerator {
    pub fn ok() -> Self {
        Self {
            fail: false,
            gate: None,
            seen_analysis: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::ok()
        }
    }
}

pub fn sample_suggestions() -> Vec<HairstyleSuggestion> {
    ["Textured Crop", "Side Part", "Quiff"]
        .iter()
        .enumerate()
        .map(|(i, name)| HairstyleSuggestion {
            name: name.to_string(),
            description: format!("{} description", name),
            length: "short".to_string(),
            maintenance: "medium".to_string(),
            best_for: "square faces".to_string(),
            styling_tips: "Use matte clay".to_string(),
            confidence: 0.9 - i as f32 * 0.1,
            image_url: None,
        })
        .collect()
}

#[async_trait]
impl SuggestionGenerator for FakeGenerator {
    async fn generate(
        &self,
        analysis: &FaceAnalysis,
        _preferences: &ScanPreferences,
    ) -> Result<GeneratedSuggestions, GenerationError> {
        *self.seen_analysis.lock().unwrap() = Some(analysis.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(GenerationError::ApiError(500, "model overloaded".to_string()));
        }

        Ok(GeneratedSuggestions {
            suggestions: sample_suggestions(),
            general_advice: Some("Keep the sides tight".to_string()),
            occasion_looks: Some(vec![OccasionLook {
                occasion: "interview".to_string(),
                hairstyle: "Side Part".to_string(),
                description: "Clean and classic".to_string(),
            }]),
        })
    }
}

/// In-memory billing provider keyed by subscription id
#[derive(Default)]
pub struct FakeBilling {
    pub subscriptions: Mutex<HashMap<String, BillingSubscription>>,
    pub checkouts: Mutex<Vec<(String, String)>>,
}

impl FakeBilling {
    pub fn insert(&self, subscription: BillingSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<BillingSubscription, BillingError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| BillingError::ApiError(404, format!("No such subscription: {}", subscription_id)))
    }

    async fn create_checkout_session(
        &self,
        user_id: &str,
        price_id: &str,
    ) -> Result<CheckoutSession, BillingError> {
        self.checkouts
            .lock()
            .unwrap()
            .push((user_id.to_string(), price_id.to_string()));
        Ok(CheckoutSession {
            session_id: "cs_test_1".to_string(),
            url: Some("https://checkout.test/cs_test_1".to_string()),
        })
    }
}

/// Records uploads and returns a predictable public URL
#[derive(Default)]
pub struct FakeImageStore {
    pub uploads: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), content_type.to_string(), bytes.len()));
        Ok(format!("https://storage.test/{}", path))
    }
}

/// Router plus handles to its fakes; the temp dir keeps the database alive
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub billing: Arc<FakeBilling>,
    pub generator: Arc<FakeGenerator>,
    pub images: Arc<FakeImageStore>,
    _dir: tempfile::TempDir,
}

pub async fn test_app(analyzer_fails: bool, generator: FakeGenerator) -> TestApp {
    test_app_with(FakeAnalyzer::new(analyzer_fails), generator).await
}

pub async fn test_app_with(analyzer: FakeAnalyzer, generator: FakeGenerator) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let pool = faceup_api::db::init_database_pool(&dir.path().join("faceup-test.db"))
        .await
        .unwrap();

    let billing = Arc::new(FakeBilling::default());
    let generator = Arc::new(generator);
    let images = Arc::new(FakeImageStore::default());

    let providers = Providers {
        analyzer: Arc::new(analyzer),
        generator: generator.clone(),
        billing: billing.clone(),
        image_store: images.clone(),
    };
    let plans = PlanCatalog::new(
        Some(MONTHLY_PRICE.to_string()),
        Some(YEARLY_PRICE.to_string()),
    );

    let state = AppState::new(
        pool,
        EventBus::new(100),
        providers,
        plans,
        WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string())),
        FRONTEND_URL.to_string(),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        billing,
        generator,
        images,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Poll /scan-status until `predicate` holds (5 s budget)
    pub async fn wait_for_status<F>(&self, session_id: &str, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        let uri = format!("/scan-status/{}", session_id);
        for _ in 0..250 {
            let (status, body) = self.get(&uri).await;
            assert_eq!(status, StatusCode::OK);
            if predicate(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("session {} never reached the expected state", session_id);
    }

    pub async fn wait_for_terminal(&self, session_id: &str) -> Value {
        self.wait_for_status(session_id, |body| {
            matches!(body["status"].as_str(), Some("completed") | Some("failed"))
        })
        .await
    }

    pub async fn session_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM scan_sessions")
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }
}
