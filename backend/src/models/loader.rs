use std::path::PathBuf;
use std::sync::Arc;

use super::embedder::OnnxSentenceEmbedder;
use super::fetch::HubFetcher;
use super::onnx::{OnnxImageClassifier, OnnxTextClassifier};
use super::{ArtifactLoader, ImageClassifier, LabelEncoder, ModelLoadError, SentenceEmbedder, TextClassifier};
use crate::config::Settings;

/// Loads every artifact from disk as configured; the embedder falls back to a
/// hub download when no bundled copy is usable.
pub struct OnnxArtifactLoader {
    text_model_path: PathBuf,
    label_encoder_path: PathBuf,
    embedder_dir: PathBuf,
    image_model_path: PathBuf,
    embedder_repo: String,
    fetcher: HubFetcher,
    max_tokens: usize,
    intra_threads: usize,
}

impl OnnxArtifactLoader {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            text_model_path: settings.text_model_path.clone(),
            label_encoder_path: settings.label_encoder_path.clone(),
            embedder_dir: settings.embedder_dir.clone(),
            image_model_path: settings.image_model_path.clone(),
            embedder_repo: settings.mbert_model.clone(),
            fetcher: HubFetcher::new(settings.hf_endpoint.clone(), settings.embedder_cache_dir.clone()),
            max_tokens: settings.embedder_max_tokens,
            intra_threads: settings.onnx_threads,
        }
    }
}

impl ArtifactLoader for OnnxArtifactLoader {
    fn load_text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError> {
        if !self.text_model_path.exists() {
            return Err(ModelLoadError::NotFound {
                artifact: "Text classifier",
                path: self.text_model_path.display().to_string(),
            });
        }
        log::info!("Loading text classifier from {:?}", self.text_model_path);
        Ok(Arc::new(OnnxTextClassifier::load(&self.text_model_path, self.intra_threads)?))
    }

    fn load_label_encoder(&self) -> Result<Option<LabelEncoder>, ModelLoadError> {
        if !self.label_encoder_path.exists() {
            return Ok(None);
        }
        log::info!("Loading label encoder from {:?}", self.label_encoder_path);
        LabelEncoder::from_path(&self.label_encoder_path).map(Some)
    }

    fn load_embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError> {
        if OnnxSentenceEmbedder::is_complete(&self.embedder_dir) {
            log::info!("Loading embedder from {:?}", self.embedder_dir);
            match OnnxSentenceEmbedder::load(&self.embedder_dir, self.max_tokens, self.intra_threads) {
                Ok(embedder) => return Ok(Arc::new(embedder)),
                Err(e) => log::warn!("Bundled embedder unusable ({}), trying {}", e, self.embedder_repo),
            }
        } else {
            log::info!(
                "No bundled embedder at {:?}, using {}",
                self.embedder_dir,
                self.embedder_repo
            );
        }

        let dir = self.fetcher.ensure_downloaded(&self.embedder_repo)?;
        let embedder = OnnxSentenceEmbedder::load(&dir, self.max_tokens, self.intra_threads)?;
        log::info!("Embedder ready from {:?}", embedder.dir());
        Ok(Arc::new(embedder))
    }

    fn load_image_classifier(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
        if !self.image_model_path.exists() {
            return Err(ModelLoadError::NotFound {
                artifact: "Image classifier",
                path: self.image_model_path.display().to_string(),
            });
        }
        log::info!("Loading image classifier from {:?}", self.image_model_path);
        Ok(Arc::new(OnnxImageClassifier::load(&self.image_model_path, self.intra_threads)?))
    }
}
