pub mod cache;
pub mod embedder;
pub mod fetch;
pub mod label_encoder;
pub mod loader;
pub mod onnx;

use ndarray::{Array1, ArrayView2, ArrayView4};
use std::sync::Arc;

pub use cache::{ArtifactLoader, ModelCache, ModelStatus};
pub use label_encoder::LabelEncoder;
pub use loader::OnnxArtifactLoader;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("{artifact} not found at {path}")]
    NotFound { artifact: &'static str, path: String },
    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Invalid label encoder: {0}")]
    InvalidEncoder(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Download failed: {0}")]
    Fetch(#[from] fetch::FetchError),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Class index {index} out of range for {classes} classes")]
    UnknownClass { index: i64, classes: usize },
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Raw label as emitted by the text classifier: an encoded class index, or a
/// class name when the estimator was trained on string targets.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLabel {
    Index(i64),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    pub label: RawLabel,
    /// Present only when the estimator exposes calibrated class probabilities.
    pub probabilities: Option<Vec<f32>>,
}

/// Categorical classifier over sentence embeddings.
pub trait TextClassifier: Send + Sync {
    fn predict(&self, features: ArrayView2<f32>) -> Result<ClassifierOutput, InferenceError>;
}

/// Maps text to a fixed-length vector; multilingual.
pub trait SentenceEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Array1<f32>, InferenceError>;
}

/// CNN over a `(1, H, W, 3)` batch; returns one probability per category.
pub trait ImageClassifier: Send + Sync {
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array1<f32>, InferenceError>;
}

/// An artifact whose load failure degrades a feature instead of failing startup.
pub enum ModelSlot<T: ?Sized> {
    Loaded(Arc<T>),
    Unavailable(String),
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded(_))
    }
}

impl<T: ?Sized> Clone for ModelSlot<T> {
    fn clone(&self) -> Self {
        match self {
            ModelSlot::Loaded(handle) => ModelSlot::Loaded(Arc::clone(handle)),
            ModelSlot::Unavailable(reason) => ModelSlot::Unavailable(reason.clone()),
        }
    }
}

/// Index of the first maximum, ignoring NaN scores.
pub(crate) fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (idx, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}
