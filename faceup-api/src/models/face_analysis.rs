//! Structured facial-feature analysis

use serde::{Deserialize, Serialize};

/// Facial features extracted from a scan image
///
/// Field aliases accept the snake_case keys vision models tend to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnalysis {
    #[serde(alias = "face_shape")]
    pub face_shape: String,
    #[serde(alias = "skin_tone")]
    pub skin_tone: String,
    #[serde(default, alias = "hair_texture", alias = "hairType", alias = "hair_type")]
    pub hair_texture: Option<String>,
    #[serde(default, alias = "notable_features", alias = "notableFeatures")]
    pub features: Vec<String>,
    /// Set when the fixed default record replaced a failed provider call
    #[serde(default)]
    pub fallback: bool,
}

impl FaceAnalysis {
    /// Fixed record substituted whenever the analysis provider fails
    pub fn fallback() -> Self {
        Self {
            face_shape: "oval".to_string(),
            skin_tone: "medium".to_string(),
            hair_texture: Some("straight".to_string()),
            features: vec![
                "balanced proportions".to_string(),
                "symmetrical features".to_string(),
            ],
            fallback: true,
        }
    }
}
