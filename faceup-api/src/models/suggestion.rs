//! Hairstyle recommendations produced by the suggestion generator

use serde::{Deserialize, Deserializer, Serialize};

/// One hairstyle recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HairstyleSuggestion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Length category (short / medium / long ...)
    #[serde(default)]
    pub length: String,
    /// Maintenance level (low / medium / high)
    #[serde(default)]
    pub maintenance: String,
    #[serde(default, alias = "best_for")]
    pub best_for: String,
    #[serde(default, alias = "styling_tips", deserialize_with = "string_or_list")]
    pub styling_tips: String,
    /// 0.0 - 1.0
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
}

impl HairstyleSuggestion {
    /// Clamp confidence into 0.0-1.0 (NaN becomes 0.0)
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

/// Occasion-based look attached on completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccasionLook {
    pub occasion: String,
    #[serde(alias = "hairstyle_name", alias = "hairstyleName", alias = "name")]
    pub hairstyle: String,
    #[serde(default)]
    pub description: String,
}

/// Complete generator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSuggestions {
    #[serde(alias = "hairstyles")]
    pub suggestions: Vec<HairstyleSuggestion>,
    #[serde(default, alias = "general_advice")]
    pub general_advice: Option<String>,
    #[serde(default, alias = "occasion_looks", alias = "occasionBasedLooks")]
    pub occasion_looks: Option<Vec<OccasionLook>>,
}

/// Accept either `"tip"` or `["tip one", "tip two"]`
fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s,
        StringOrList::Many(items) => items.join("; "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styling_tips_list_joined() {
        let s: HairstyleSuggestion = serde_json::from_str(
            r#"{"name":"Long Layers","styling_tips":["Blow dry","Use a round brush"],"confidence":0.8}"#,
        )
        .unwrap();
        assert_eq!(s.styling_tips, "Blow dry; Use a round brush");
    }

    #[test]
    fn test_confidence_clamped() {
        let s = HairstyleSuggestion {
            name: "Buzz".to_string(),
            description: String::new(),
            length: "short".to_string(),
            maintenance: "low".to_string(),
            best_for: String::new(),
            styling_tips: String::new(),
            confidence: 1.7,
            image_url: None,
        };
        assert_eq!(s.clone().normalized().confidence, 1.0);

        let negative = HairstyleSuggestion { confidence: -0.2, ..s };
        assert_eq!(negative.normalized().confidence, 0.0);
    }

    #[test]
    fn test_generated_suggestions_aliases() {
        let g: GeneratedSuggestions = serde_json::from_str(
            r#"{
                "hairstyles": [{"name": "Pixie", "confidence": 0.7}],
                "general_advice": "Embrace texture",
                "occasion_looks": [{"occasion": "wedding", "hairstyle_name": "Low bun"}]
            }"#,
        )
        .unwrap();
        assert_eq!(g.suggestions.len(), 1);
        assert_eq!(g.general_advice.as_deref(), Some("Embrace texture"));
        assert_eq!(g.occasion_looks.unwrap()[0].hairstyle, "Low bun");
    }
}
