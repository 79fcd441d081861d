//! Face analysis provider (Replicate vision model)
//!
//! Creates a prediction, then polls it a bounded number of times. The model
//! answers in free text, so the first JSON object found in the output is
//! parsed into a [`FaceAnalysis`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::FaceAnalysis;

const REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";
const POLL_ATTEMPTS: u32 = 30;
const POLL_INTERVAL_MS: u64 = 1000;

const ANALYSIS_PROMPT: &str = "Analyze this face photo for hairstyle recommendations. \
Respond only with a JSON object with the keys face_shape (oval, round, square, heart, \
oblong or diamond), skin_tone, hair_texture and notable_features (a list of short phrases).";

/// Analysis provider errors
///
/// Every variant is recovered by the pipeline with the fallback analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis provider not configured: missing API key")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Prediction {0} failed: {1}")]
    PredictionFailed(String, String),

    #[error("Prediction {0} not finished after {1} polls")]
    PollExhausted(String, u32),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Produces a structured analysis for an image URL
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    async fn analyze(&self, image_url: &str) -> Result<FaceAnalysis, AnalysisError>;
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    image: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Replicate predictions client
pub struct ReplicateClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model_version: String,
    base_url: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(api_key: Option<String>, model_version: String) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model_version,
            base_url: REPLICATE_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        })
    }

    /// Point the client at another predictions host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn create_prediction(&self, api_key: &str, image_url: &str) -> Result<Prediction, AnalysisError> {
        let url = format!("{}/predictions", self.base_url);
        let body = CreatePrediction {
            version: &self.model_version,
            input: PredictionInput {
                image: image_url,
                prompt: ANALYSIS_PROMPT,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        parse_prediction(response).await
    }

    async fn get_prediction(&self, api_key: &str, id: &str) -> Result<Prediction, AnalysisError> {
        let url = format!("{}/predictions/{}", self.base_url, id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| AnalysisError::NetworkError(e.to_string()))?;

        parse_prediction(response).await
    }
}

#[async_trait]
impl FaceAnalyzer for ReplicateClient {
    async fn analyze(&self, image_url: &str) -> Result<FaceAnalysis, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::MissingApiKey)?;

        let mut prediction = self.create_prediction(api_key, image_url).await?;
        tracing::debug!(prediction_id = %prediction.id, "Replicate prediction created");

        let mut attempt = 0;
        loop {
            match prediction.status.as_str() {
                "succeeded" => break,
                "failed" | "canceled" => {
                    let reason = prediction
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| prediction.status.clone());
                    return Err(AnalysisError::PredictionFailed(prediction.id, reason));
                }
                _ => {}
            }

            if attempt >= POLL_ATTEMPTS {
                return Err(AnalysisError::PollExhausted(prediction.id, POLL_ATTEMPTS));
            }
            attempt += 1;

            tokio::time::sleep(self.poll_interval).await;
            prediction = self.get_prediction(api_key, &prediction.id).await?;
        }

        let text = output_text(prediction.output.as_ref());
        let analysis = parse_analysis(&text)?;

        tracing::info!(
            prediction_id = %prediction.id,
            face_shape = %analysis.face_shape,
            polls = attempt,
            "Face analysis completed"
        );

        Ok(analysis)
    }
}

async fn parse_prediction(response: reqwest::Response) -> Result<Prediction, AnalysisError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(AnalysisError::ApiError(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| AnalysisError::ParseError(e.to_string()))
}

/// Flatten prediction output (a string or a list of streamed chunks)
fn output_text(output: Option<&Value>) -> String {
    match output {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(chunks)) => chunks
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Slice from the first `{` to the last `}`
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_analysis(text: &str) -> Result<FaceAnalysis, AnalysisError> {
    let json = extract_json_object(text)
        .ok_or_else(|| AnalysisError::ParseError("no JSON object in model output".to_string()))?;

    let mut analysis: FaceAnalysis =
        serde_json::from_str(json).map_err(|e| AnalysisError::ParseError(e.to_string()))?;
    analysis.fallback = false;
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Local predictions API: reports `processing` for `pending_polls` GETs,
    /// then `final_status`
    #[derive(Clone)]
    struct MockPredictions {
        polls: Arc<AtomicU32>,
        pending_polls: u32,
        final_status: &'static str,
    }

    async fn mock_create() -> Json<Value> {
        Json(json!({"id": "pred_1", "status": "starting"}))
    }

    async fn mock_get(State(mock): State<MockPredictions>, Path(id): Path<String>) -> Json<Value> {
        let poll = mock.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if poll <= mock.pending_polls {
            return Json(json!({"id": id, "status": "processing", "output": null}));
        }
        match mock.final_status {
            "succeeded" => Json(json!({
                "id": id,
                "status": "succeeded",
                "output": ["Here you go: {\"face_shape\": \"oval\", ", "\"skin_tone\": \"fair\"}"]
            })),
            status => Json(json!({"id": id, "status": status, "error": "model crashed"})),
        }
    }

    async fn spawn_mock(pending_polls: u32, final_status: &'static str) -> (String, Arc<AtomicU32>) {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = MockPredictions {
            polls: polls.clone(),
            pending_polls,
            final_status,
        };
        let app = Router::new()
            .route("/predictions", post(mock_create))
            .route("/predictions/:id", get(mock_get))
            .with_state(mock);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), polls)
    }

    fn mock_client(base_url: &str) -> ReplicateClient {
        ReplicateClient::new(Some("r8_test".to_string()), "version".to_string())
            .unwrap()
            .with_base_url(base_url)
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_prediction_polled_until_succeeded() {
        let (base_url, polls) = spawn_mock(3, "succeeded").await;

        let analysis = mock_client(&base_url).analyze("https://img.test/a.jpg").await.unwrap();

        assert_eq!(analysis.face_shape, "oval");
        assert_eq!(analysis.skin_tone, "fair");
        assert!(!analysis.fallback);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_prediction_stops_polling() {
        let (base_url, polls) = spawn_mock(1, "failed").await;

        let result = mock_client(&base_url).analyze("https://img.test/a.jpg").await;

        match result {
            Err(AnalysisError::PredictionFailed(id, reason)) => {
                assert_eq!(id, "pred_1");
                assert!(reason.contains("model crashed"));
            }
            other => panic!("expected PredictionFailed, got {:?}", other),
        }
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        let (base_url, _) = spawn_mock(0, "canceled").await;
        let result = mock_client(&base_url).analyze("https://img.test/a.jpg").await;
        assert!(matches!(result, Err(AnalysisError::PredictionFailed(_, _))));
    }

    #[tokio::test]
    async fn test_poll_budget_is_bounded() {
        let (base_url, polls) = spawn_mock(u32::MAX, "succeeded").await;

        let result = mock_client(&base_url).analyze("https://img.test/a.jpg").await;

        assert!(matches!(
            result,
            Err(AnalysisError::PollExhausted(ref id, POLL_ATTEMPTS)) if id == "pred_1"
        ));
        assert_eq!(polls.load(Ordering::SeqCst), POLL_ATTEMPTS);
    }

    #[test]
    fn test_output_chunks_are_concatenated() {
        let output = json!(["{\"face_shape\": ", "\"round\"}"]);
        assert_eq!(output_text(Some(&output)), "{\"face_shape\": \"round\"}");
        assert_eq!(output_text(None), "");
    }

    #[test]
    fn test_analysis_parsed_from_surrounding_prose() {
        let text = r#"Sure! Here is the analysis:
{"face_shape": "heart", "skin_tone": "olive", "hair_texture": "wavy",
 "notable_features": ["high cheekbones"]}
Let me know if you need more."#;

        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.face_shape, "heart");
        assert_eq!(analysis.skin_tone, "olive");
        assert_eq!(analysis.hair_texture.as_deref(), Some("wavy"));
        assert_eq!(analysis.features, vec!["high cheekbones".to_string()]);
        assert!(!analysis.fallback);
    }

    #[test]
    fn test_unparseable_output_is_error() {
        assert!(matches!(
            parse_analysis("I cannot see a face in this image."),
            Err(AnalysisError::ParseError(_))
        ));
        assert!(matches!(
            parse_analysis("{\"skin_tone\": 3}"),
            Err(AnalysisError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = ReplicateClient::new(None, "version".to_string()).unwrap();
        let result = client.analyze("https://x/y.jpg").await;
        assert!(matches!(result, Err(AnalysisError::MissingApiKey)));
    }
}
