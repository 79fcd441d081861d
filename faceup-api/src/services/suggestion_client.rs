//! Hairstyle suggestion generator (OpenAI chat completions)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FaceAnalysis, GeneratedSuggestions, ScanPreferences};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are an expert hairstylist. Recommend hairstyles that suit the \
client's face and preferences. Always answer with a single JSON object.";

/// Suggestion generator errors
///
/// Unlike analysis errors these are fatal to the scan session.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Suggestion generator not configured: missing API key")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Generator returned no suggestions")]
    EmptyResult,
}

/// Turns an analysis plus style preferences into hairstyle suggestions
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn generate(
        &self,
        analysis: &FaceAnalysis,
        preferences: &ScanPreferences,
    ) -> Result<GeneratedSuggestions, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI chat-completions client
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: String) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SuggestionGenerator for OpenAiClient {
    async fn generate(
        &self,
        analysis: &FaceAnalysis,
        preferences: &ScanPreferences,
    ) -> Result<GeneratedSuggestions, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;

        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(analysis, preferences) },
            ],
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", OPENAI_BASE_URL))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiError(status.as_u16(), error_text));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::ParseError("completion had no content".to_string()))?;

        let generated = parse_generated(&content)?;
        tracing::info!(
            model = %self.model,
            count = generated.suggestions.len(),
            "Hairstyle suggestions generated"
        );
        Ok(generated)
    }
}

/// User prompt describing the analysis and preferences
pub fn build_prompt(analysis: &FaceAnalysis, preferences: &ScanPreferences) -> String {
    let features = if analysis.features.is_empty() {
        "none noted".to_string()
    } else {
        analysis.features.join(", ")
    };

    format!(
        "Face analysis:\n\
         - Face shape: {}\n\
         - Skin tone: {}\n\
         - Hair texture: {}\n\
         - Notable features: {}\n\
         \n\
         Preferences:\n\
         - Mood: {}\n\
         - Style: {}\n\
         - Gender: {}\n\
         \n\
         Suggest 3 to 5 hairstyles. Respond with JSON of the form \
         {{\"suggestions\": [{{\"name\", \"description\", \"length\", \"maintenance\", \
         \"bestFor\", \"stylingTips\", \"confidence\"}}], \"generalAdvice\": string, \
         \"occasionLooks\": [{{\"occasion\", \"hairstyle\", \"description\"}}]}}. \
         confidence is a number between 0 and 1.",
        analysis.face_shape,
        analysis.skin_tone,
        analysis.hair_texture.as_deref().unwrap_or("unknown"),
        features,
        preferences.mood.as_deref().unwrap_or("any"),
        preferences.style.as_deref().unwrap_or("any"),
        preferences.gender.as_deref().unwrap_or("unspecified"),
    )
}

fn parse_generated(content: &str) -> Result<GeneratedSuggestions, GenerationError> {
    let mut generated: GeneratedSuggestions =
        serde_json::from_str(content).map_err(|e| GenerationError::ParseError(e.to_string()))?;

    generated.suggestions = generated
        .suggestions
        .into_iter()
        .filter(|s| !s.name.trim().is_empty())
        .map(|s| s.normalized())
        .collect();

    if generated.suggestions.is_empty() {
        return Err(GenerationError::EmptyResult);
    }
    Ok(generated)
}
