pub mod image;
pub mod text;

use shared::ErrorType;

pub use self::image::{ImageClassificationService, ImagePrediction, TopKPrediction};
pub use text::{TextClassificationService, TextPrediction, MAX_BATCH_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    ModelUnavailable,
    Inference,
}

/// A request that could not be classified. Carries the user-facing message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ClassificationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ClassificationFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ModelUnavailable,
            message: message.into(),
        }
    }

    pub fn inference(detail: impl std::fmt::Display) -> Self {
        Self {
            kind: FailureKind::Inference,
            message: format!("Prediction error: {}", detail),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self.kind {
            FailureKind::Validation => ErrorType::ValidationError,
            FailureKind::ModelUnavailable => ErrorType::ModelUnavailable,
            FailureKind::Inference => ErrorType::InferenceError,
        }
    }
}

impl From<crate::preprocess::PreprocessError> for ClassificationFailure {
    fn from(e: crate::preprocess::PreprocessError) -> Self {
        Self::validation(e.to_string())
    }
}

impl From<crate::models::InferenceError> for ClassificationFailure {
    fn from(e: crate::models::InferenceError) -> Self {
        Self::inference(e)
    }
}
