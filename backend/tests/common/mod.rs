use civic_ml_service::config::Settings;
use civic_ml_service::models::{
    ArtifactLoader, ClassifierOutput, ImageClassifier, InferenceError, LabelEncoder, ModelCache, ModelLoadError,
    RawLabel, SentenceEmbedder, TextClassifier,
};
use civic_ml_service::AppState;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::{Array1, ArrayView2, ArrayView4};
use std::io::Cursor;
use std::sync::Arc;

pub const BOUNDARY: &str = "----civicmltestboundary";

struct KeywordClassifier;

// Index 0 ("potholes") when the first feature says the text mentioned a road,
// otherwise 1 ("garbage").
impl TextClassifier for KeywordClassifier {
    fn predict(&self, features: ArrayView2<f32>) -> Result<ClassifierOutput, InferenceError> {
        let road = features[[0, 0]] > 0.5;
        let probabilities = if road { vec![0.8, 0.1, 0.05, 0.05] } else { vec![0.1, 0.7, 0.1, 0.1] };
        Ok(ClassifierOutput {
            label: RawLabel::Index(if road { 0 } else { 1 }),
            probabilities: Some(probabilities),
        })
    }
}

struct KeywordEmbedder;

impl SentenceEmbedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Array1<f32>, InferenceError> {
        let road = if text.contains("road") { 1.0 } else { 0.0 };
        Ok(Array1::from(vec![road, text.len() as f32]))
    }
}

struct FixedImageClassifier;

impl ImageClassifier for FixedImageClassifier {
    fn predict(&self, _batch: ArrayView4<f32>) -> Result<Array1<f32>, InferenceError> {
        Ok(Array1::from(vec![0.1, 0.5, 0.3, 0.1]))
    }
}

struct PanickingImageClassifier;

impl ImageClassifier for PanickingImageClassifier {
    fn predict(&self, _batch: ArrayView4<f32>) -> Result<Array1<f32>, InferenceError> {
        panic!("session aborted mid-run");
    }
}

#[derive(Clone, Copy)]
pub enum ImageModel {
    Available,
    Missing,
    Panics,
}

pub struct FakeLoader {
    pub text_available: bool,
    pub image: ImageModel,
}

impl ArtifactLoader for FakeLoader {
    fn load_text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError> {
        if self.text_available {
            Ok(Arc::new(KeywordClassifier))
        } else {
            Err(ModelLoadError::NotFound {
                artifact: "Text classifier",
                path: "models/text_classifier.onnx".to_string(),
            })
        }
    }

    fn load_label_encoder(&self) -> Result<Option<LabelEncoder>, ModelLoadError> {
        Ok(None)
    }

    fn load_embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError> {
        Ok(Arc::new(KeywordEmbedder))
    }

    fn load_image_classifier(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
        match self.image {
            ImageModel::Available => Ok(Arc::new(FixedImageClassifier)),
            ImageModel::Panics => Ok(Arc::new(PanickingImageClassifier)),
            ImageModel::Missing => Err(ModelLoadError::InvalidModel("incompatible serialized format".to_string())),
        }
    }
}

pub fn state(text_available: bool, image_available: bool) -> AppState {
    let image = if image_available { ImageModel::Available } else { ImageModel::Missing };
    state_with(FakeLoader { text_available, image })
}

pub fn state_with(loader: FakeLoader) -> AppState {
    let settings = Settings {
        image_size: (64, 64),
        ..Settings::default()
    };
    let cache = ModelCache::new(Arc::new(loader));
    AppState::new(Arc::new(cache), &settings)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Hand-built multipart body: one file part and any number of text parts.
pub fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
