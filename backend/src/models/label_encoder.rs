use serde::Deserialize;
use std::path::Path;

use super::{InferenceError, ModelLoadError};

/// Decodes classifier indices into category names. Stored as
/// `{"classes": [...]}`, index `i` maps to `classes[i]`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Result<Self, ModelLoadError> {
        if classes.is_empty() {
            return Err(ModelLoadError::InvalidEncoder("no classes".to_string()));
        }
        Ok(Self { classes })
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: LabelEncoder = serde_json::from_str(&raw)
            .map_err(|e| ModelLoadError::InvalidEncoder(e.to_string()))?;
        Self::new(parsed.classes)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn inverse_transform(&self, index: i64) -> Result<&str, InferenceError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
            .ok_or(InferenceError::UnknownClass {
                index,
                classes: self.classes.len(),
            })
    }
}
