use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const API_VERSION: &str = "1.0.0";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchTextRequest {
    pub texts: Vec<String>,
}

/// Category → probability pairs that keep the model's output order on the wire.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Probabilities(pub Vec<(String, f32)>);

impl Probabilities {
    pub fn get(&self, category: &str) -> Option<f32> {
        self.0
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest-first ordering; ties keep their original relative order and
    /// NaN scores sort last.
    pub fn top_k(&self, k: usize) -> Vec<TopPrediction> {
        let mut sorted = self.0.clone();
        sorted.sort_by(|a, b| rank_key(b.1).total_cmp(&rank_key(a.1)));
        sorted
            .into_iter()
            .take(k)
            .map(|(category, confidence)| TopPrediction {
                category,
                confidence,
            })
            .collect()
    }
}

fn rank_key(p: f32) -> f32 {
    if p.is_nan() { f32::NEG_INFINITY } else { p }
}

impl FromIterator<(String, f32)> for Probabilities {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (category, p) in &self.0 {
            map.serialize_entry(category, p)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Probabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProbabilitiesVisitor;

        impl<'de> Visitor<'de> for ProbabilitiesVisitor {
            type Value = Probabilities;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category to probability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((category, p)) = access.next_entry::<String, f32>()? {
                    entries.push((category, p));
                }
                Ok(Probabilities(entries))
            }
        }

        deserializer.deserialize_map(ProbabilitiesVisitor)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ValidationError,
    ModelUnavailable,
    InferenceError,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TextResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchTextResponse {
    pub success: bool,
    pub count: usize,
    pub results: Vec<TextResponse>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ImageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Probabilities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TopPrediction {
    pub category: String,
    pub confidence: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TopKResponse {
    pub success: bool,
    pub top_predictions: Vec<TopPrediction>,
    pub all_probabilities: Probabilities,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_type: ErrorType,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InternalErrorResponse {
    pub success: bool,
    pub error: String,
    pub detail: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelInfo {
    pub text_model_loaded: bool,
    pub image_model_loaded: bool,
    pub embedder_loaded: bool,
    pub label_encoder_loaded: bool,
    pub categories: Vec<String>,
    pub image_size: (u32, u32),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub models: ModelInfo,
    pub api_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
    pub count: usize,
}
