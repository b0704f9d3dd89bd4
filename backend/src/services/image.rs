use ndarray::{Axis, Array4};
use shared::{ImageResponse, Probabilities, TopKResponse, TopPrediction};
use std::sync::Arc;

use super::ClassificationFailure;
use crate::models::{ModelCache, ModelSlot, argmax};
use crate::preprocess::image as preprocess;

pub const MODEL_UNAVAILABLE_MESSAGE: &str =
    "Image classification model is currently unavailable. Please try text classification or contact support.";

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrediction {
    pub prediction: String,
    pub confidence: f32,
    pub probabilities: Probabilities,
    /// Source image `(width, height)` before resizing.
    pub image_size: (u32, u32),
    pub enhanced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopKPrediction {
    pub top_predictions: Vec<TopPrediction>,
    pub all_probabilities: Probabilities,
}

pub struct ImageClassificationService {
    models: Arc<ModelCache>,
    categories: Vec<String>,
    image_size: (u32, u32),
}

impl ImageClassificationService {
    pub fn new(models: Arc<ModelCache>, categories: Vec<String>, image_size: (u32, u32)) -> Self {
        Self {
            models,
            categories,
            image_size,
        }
    }

    pub fn predict(&self, bytes: &[u8], enhance: bool) -> Result<ImagePrediction, ClassificationFailure> {
        let classifier = match self.models.image_classifier() {
            ModelSlot::Loaded(classifier) => classifier,
            ModelSlot::Unavailable(reason) => {
                log::error!("Image classification model is unavailable: {}", reason);
                return Err(ClassificationFailure::unavailable(MODEL_UNAVAILABLE_MESSAGE));
            }
        };

        let image = preprocess::decode(bytes)?;
        preprocess::validate(Some(&image))?;
        let image_size = (image.width(), image.height());
        log::info!("Processing image of size: {:?}", image_size);

        let mut batch = preprocess::preprocess(&image, self.image_size);
        if enhance {
            batch = enhance_batch(batch)?;
        }

        let scores = classifier.predict(batch.view()).inspect_err(|e| {
            log::error!("Image prediction failed: {}", e);
        })?;
        let scores = scores.to_vec();

        let idx = argmax(&scores)
            .ok_or_else(|| ClassificationFailure::inference("model returned no usable scores"))?;
        let prediction = self.categories.get(idx).cloned().ok_or_else(|| {
            ClassificationFailure::inference(format!(
                "class index {} out of range for {} categories",
                idx,
                self.categories.len()
            ))
        })?;
        let confidence = scores[idx];
        if scores.len() != self.categories.len() {
            log::warn!(
                "Image classifier returned {} scores for {} categories",
                scores.len(),
                self.categories.len()
            );
        }
        let probabilities = self.categories.iter().cloned().zip(scores).collect();

        log::info!("Predicted category: {} (confidence: {:.2}%)", prediction, confidence * 100.0);

        Ok(ImagePrediction {
            prediction,
            confidence,
            probabilities,
            image_size,
            enhanced: enhance,
        })
    }

    /// Top `k` categories by probability, ties in category order. Never enhances.
    pub fn predict_top_k(&self, bytes: &[u8], k: usize) -> Result<TopKPrediction, ClassificationFailure> {
        let prediction = self.predict(bytes, false)?;
        Ok(TopKPrediction {
            top_predictions: prediction.probabilities.top_k(k),
            all_probabilities: prediction.probabilities,
        })
    }
}

fn enhance_batch(batch: Array4<f32>) -> Result<Array4<f32>, ClassificationFailure> {
    let enhanced = preprocess::enhance(batch.index_axis(Axis(0), 0))?;
    Ok(enhanced.insert_axis(Axis(0)))
}

impl From<ImagePrediction> for ImageResponse {
    fn from(p: ImagePrediction) -> Self {
        ImageResponse {
            success: true,
            prediction: Some(p.prediction),
            confidence: Some(p.confidence),
            probabilities: Some(p.probabilities),
            image_size: Some(p.image_size),
            enhanced: Some(p.enhanced),
            ..Default::default()
        }
    }
}

impl From<TopKPrediction> for TopKResponse {
    fn from(p: TopKPrediction) -> Self {
        TopKResponse {
            success: true,
            top_predictions: p.top_predictions,
            all_probabilities: p.all_probabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArtifactLoader, ImageClassifier, InferenceError, LabelEncoder, ModelLoadError, SentenceEmbedder,
        TextClassifier,
    };
    use crate::services::FailureKind;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use ndarray::{Array1, ArrayView4};
    use std::io::Cursor;
    use std::sync::Mutex;

    struct FixedScores {
        scores: Vec<f32>,
        seen_shape: Mutex<Vec<usize>>,
    }

    impl ImageClassifier for FixedScores {
        fn predict(&self, batch: ArrayView4<f32>) -> Result<Array1<f32>, InferenceError> {
            *self.seen_shape.lock().unwrap() = batch.shape().to_vec();
            assert!(batch.iter().all(|v| (0.0..=1.0).contains(v)));
            Ok(Array1::from(self.scores.clone()))
        }
    }

    struct Loader(Option<Arc<FixedScores>>);

    impl ArtifactLoader for Loader {
        fn load_text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError> {
            Err(ModelLoadError::InvalidModel("not used".to_string()))
        }
        fn load_label_encoder(&self) -> Result<Option<LabelEncoder>, ModelLoadError> {
            Ok(None)
        }
        fn load_embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError> {
            Err(ModelLoadError::InvalidModel("not used".to_string()))
        }
        fn load_image_classifier(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
            match &self.0 {
                Some(model) => Ok(model.clone()),
                None => Err(ModelLoadError::NotFound {
                    artifact: "Image classifier",
                    path: "models/image_classifier.onnx".to_string(),
                }),
            }
        }
    }

    fn categories() -> Vec<String> {
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
    }

    fn service(model: Option<Arc<FixedScores>>) -> ImageClassificationService {
        let cache = ModelCache::new(Arc::new(Loader(model)));
        ImageClassificationService::new(Arc::new(cache), categories(), (32, 32))
    }

    fn fixed(scores: Vec<f32>) -> Arc<FixedScores> {
        Arc::new(FixedScores {
            scores,
            seen_shape: Mutex::new(Vec::new()),
        })
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 3) as u8, (y * 2) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_predict_maps_scores_to_categories() {
        let model = fixed(vec![0.1, 0.5, 0.3, 0.1]);
        let svc = service(Some(model.clone()));
        let p = svc.predict(&png(64, 80), false).unwrap();

        assert_eq!(p.prediction, "B");
        assert_eq!(p.confidence, 0.5);
        assert_eq!(p.image_size, (64, 80));
        assert!(!p.enhanced);
        assert_eq!(p.probabilities.get("C"), Some(0.3));
        assert_eq!(*model.seen_shape.lock().unwrap(), vec![1, 32, 32, 3]);
    }

    #[test]
    fn test_enhanced_batch_keeps_shape() {
        let model = fixed(vec![0.7, 0.1, 0.1, 0.1]);
        let svc = service(Some(model.clone()));
        let p = svc.predict(&png(60, 60), true).unwrap();

        assert!(p.enhanced);
        assert_eq!(*model.seen_shape.lock().unwrap(), vec![1, 32, 32, 3]);
    }

    #[test]
    fn test_top_k() {
        let svc = service(Some(fixed(vec![0.1, 0.5, 0.3, 0.1])));
        let top = svc.predict_top_k(&png(64, 64), 2).unwrap();

        assert_eq!(
            top.top_predictions,
            vec![
                TopPrediction { category: "B".into(), confidence: 0.5 },
                TopPrediction { category: "C".into(), confidence: 0.3 },
            ]
        );
        assert_eq!(top.all_probabilities.len(), 4);
    }

    #[test]
    fn test_unavailable_model() {
        let svc = service(None);
        let err = svc.predict(&png(64, 64), false).unwrap_err();
        assert_eq!(err.kind, FailureKind::ModelUnavailable);
        assert_eq!(err.message, MODEL_UNAVAILABLE_MESSAGE);
        assert!(svc.predict_top_k(&png(64, 64), 2).is_err());
    }

    #[test]
    fn test_invalid_images_are_validation_failures() {
        let svc = service(Some(fixed(vec![0.25; 4])));

        let err = svc.predict(b"definitely not an image", false).unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert!(err.message.starts_with("Invalid image: "));

        let err = svc.predict(&png(10, 10), false).unwrap_err();
        assert_eq!(err.message, "Image is too small (minimum 50x50 pixels)");
    }
}
