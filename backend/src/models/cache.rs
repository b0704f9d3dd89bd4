use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::{ImageClassifier, LabelEncoder, ModelLoadError, ModelSlot, SentenceEmbedder, TextClassifier};

/// Source of model artifacts. Production loads ONNX files from disk; tests
/// hand in in-memory fakes.
pub trait ArtifactLoader: Send + Sync {
    fn load_text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError>;
    /// `Ok(None)` when no encoder is deployed.
    fn load_label_encoder(&self) -> Result<Option<LabelEncoder>, ModelLoadError>;
    fn load_embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError>;
    fn load_image_classifier(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError>;
}

/// Initialized at most once. Readers never lock; the mutex only serializes
/// competing first loads.
struct LazySlot<T> {
    value: OnceLock<T>,
    init: Mutex<()>,
}

impl<T: Clone> LazySlot<T> {
    fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Failed loads are not stored, so the next caller tries again.
    fn get_or_try_init<E>(&self, load: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(v) = self.value.get() {
            return Ok(v.clone());
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(v) = self.value.get() {
            return Ok(v.clone());
        }
        let v = load()?;
        let _ = self.value.set(v.clone());
        Ok(v)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelStatus {
    pub text_classifier: bool,
    pub label_encoder: bool,
    pub embedder: bool,
    pub image_classifier: bool,
}

impl ModelStatus {
    pub fn text_ready(&self) -> bool {
        self.text_classifier && self.embedder
    }
}

pub struct ModelCache {
    loader: Arc<dyn ArtifactLoader>,
    text_classifier: LazySlot<Arc<dyn TextClassifier>>,
    label_encoder: LazySlot<Option<Arc<LabelEncoder>>>,
    embedder: LazySlot<Arc<dyn SentenceEmbedder>>,
    image_classifier: LazySlot<ModelSlot<dyn ImageClassifier>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            loader,
            text_classifier: LazySlot::new(),
            label_encoder: LazySlot::new(),
            embedder: LazySlot::new(),
            image_classifier: LazySlot::new(),
        }
    }

    pub fn text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError> {
        self.text_classifier.get_or_try_init(|| {
            let model = self.loader.load_text_classifier()?;
            log::info!("Text classifier loaded");
            Ok(model)
        })
    }

    pub fn label_encoder(&self) -> Option<Arc<LabelEncoder>> {
        let loaded: Result<_, ModelLoadError> = self.label_encoder.get_or_try_init(|| {
            Ok(match self.loader.load_label_encoder() {
                Ok(Some(encoder)) => {
                    log::info!("Label encoder loaded ({} classes)", encoder.classes().len());
                    Some(Arc::new(encoder))
                }
                Ok(None) => {
                    log::warn!("Label encoder not found, predictions will use configured categories");
                    None
                }
                Err(e) => {
                    log::warn!("Failed to load label encoder: {}", e);
                    None
                }
            })
        });
        loaded.ok().flatten()
    }

    pub fn embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError> {
        self.embedder.get_or_try_init(|| {
            let model = self.loader.load_embedder()?;
            log::info!("Embedder loaded");
            Ok(model)
        })
    }

    pub fn image_classifier(&self) -> ModelSlot<dyn ImageClassifier> {
        let loaded: Result<_, ModelLoadError> = self.image_classifier.get_or_try_init(|| {
            Ok(match self.loader.load_image_classifier() {
                Ok(model) => {
                    log::info!("Image classifier loaded");
                    ModelSlot::Loaded(model)
                }
                Err(e) => {
                    log::warn!("Image classifier unavailable: {}", e);
                    ModelSlot::Unavailable(e.to_string())
                }
            })
        });
        loaded.unwrap_or_else(|e| ModelSlot::Unavailable(e.to_string()))
    }

    /// Snapshot of what is loaded; never triggers a load.
    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            text_classifier: self.text_classifier.get().is_some(),
            label_encoder: matches!(self.label_encoder.get(), Some(Some(_))),
            embedder: self.embedder.get().is_some(),
            image_classifier: self.image_classifier.get().is_some_and(|slot| slot.is_loaded()),
        }
    }

    /// Loads every artifact and logs a readiness summary.
    pub fn preload(&self) -> ModelStatus {
        log::info!("Loading ML models...");
        let mut errors = Vec::new();

        if let Err(e) = self.text_classifier() {
            log::error!("Text classifier: {}", e);
            errors.push(format!("Text classifier: {}", e));
        }
        self.label_encoder();
        if let Err(e) = self.embedder() {
            log::error!("Embedder: {}", e);
            errors.push(format!("Embedder: {}", e));
        }
        if let ModelSlot::Unavailable(reason) = self.image_classifier() {
            log::warn!("Image classification endpoints will be unavailable");
            errors.push(format!("Image classifier: {}", reason));
        }

        let status = self.status();
        let mark = |ok: bool| if ok { "ok" } else { "missing" };
        log::info!("Models status:");
        log::info!("  Text classifier: {}", mark(status.text_classifier));
        log::info!("  Label encoder: {}", mark(status.label_encoder));
        log::info!("  Embedder: {}", mark(status.embedder));
        log::info!("  Image classifier: {}", mark(status.image_classifier));

        match (status.text_ready(), status.image_classifier) {
            (true, true) => log::info!("All systems ready: text and image classification working"),
            (true, false) => {
                log::info!("Text classification READY");
                log::warn!("Image classification UNAVAILABLE");
            }
            (false, true) => {
                log::info!("Image classification READY");
                log::warn!("Text classification UNAVAILABLE");
            }
            (false, false) => {
                log::error!("No models loaded successfully; predictions will fail");
                for e in &errors {
                    log::error!("  - {}", e);
                }
            }
        }
        status
    }
}
