use ndarray::Axis;
use shared::{Probabilities, TextResponse};
use std::sync::{Arc, Once};

use super::ClassificationFailure;
use crate::models::{
    InferenceError, LabelEncoder, ModelCache, RawLabel, SentenceEmbedder, TextClassifier, argmax,
};
use crate::preprocess::text as preprocess;

pub const MAX_BATCH_SIZE: usize = 50;

static ALIGNMENT_WARNING: Once = Once::new();

#[derive(Debug, Clone, PartialEq)]
pub struct TextPrediction {
    pub prediction: String,
    pub confidence: Option<f32>,
    pub probabilities: Option<Probabilities>,
    pub original_text: String,
    pub cleaned_text: String,
}

pub struct TextClassificationService {
    models: Arc<ModelCache>,
    categories: Vec<String>,
    max_text_length: usize,
}

impl TextClassificationService {
    pub fn new(models: Arc<ModelCache>, categories: Vec<String>, max_text_length: usize) -> Self {
        Self {
            models,
            categories,
            max_text_length,
        }
    }

    pub fn predict(&self, text: &str) -> Result<TextPrediction, ClassificationFailure> {
        let classifier = self.models.text_classifier().map_err(|e| {
            log::error!("Text classifier unavailable: {}", e);
            ClassificationFailure::unavailable(format!("Text classification model is currently unavailable: {}", e))
        })?;
        let embedder = self.models.embedder().map_err(|e| {
            log::error!("Embedder unavailable: {}", e);
            ClassificationFailure::unavailable(format!("Text embedding model is currently unavailable: {}", e))
        })?;
        let encoder = self.models.label_encoder();

        preprocess::validate(text)?;
        let cleaned_text = preprocess::truncate(&preprocess::clean(text), self.max_text_length);
        log::info!("Processing text: '{}...'", cleaned_text.chars().take(50).collect::<String>());

        let (prediction, confidence, probabilities) = self
            .classify(embedder.as_ref(), classifier.as_ref(), encoder.as_deref(), &cleaned_text)
            .inspect_err(|e| log::error!("Prediction failed: {}", e))?;
        log::info!("Predicted category: {}", prediction);

        Ok(TextPrediction {
            prediction,
            confidence,
            probabilities,
            original_text: text.to_string(),
            cleaned_text,
        })
    }

    fn classify(
        &self,
        embedder: &dyn SentenceEmbedder,
        classifier: &dyn TextClassifier,
        encoder: Option<&LabelEncoder>,
        cleaned_text: &str,
    ) -> Result<(String, Option<f32>, Option<Probabilities>), InferenceError> {
        let features = embedder.embed(cleaned_text)?.insert_axis(Axis(0));
        let output = classifier.predict(features.view())?;

        let named_label = matches!(output.label, RawLabel::Name(_));
        let prediction = match output.label {
            RawLabel::Index(idx) => match encoder {
                Some(encoder) => encoder.inverse_transform(idx)?.to_string(),
                None => {
                    ALIGNMENT_WARNING.call_once(|| {
                        log::warn!(
                            "No label encoder; assuming classifier indices follow configured categories {:?}",
                            self.categories
                        )
                    });
                    usize::try_from(idx)
                        .ok()
                        .and_then(|i| self.categories.get(i))
                        .cloned()
                        .ok_or(InferenceError::UnknownClass {
                            index: idx,
                            classes: self.categories.len(),
                        })?
                }
            },
            RawLabel::Name(name) => name,
        };

        let Some(probs) = output.probabilities else {
            return Ok((prediction, None, None));
        };
        let names = encoder.map_or(self.categories.as_slice(), |e| e.classes());
        if names.len() != probs.len() {
            log::warn!(
                "Classifier returned {} probabilities for {} class names",
                probs.len(),
                names.len()
            );
        }
        let top = argmax(&probs);
        let confidence = top.map(|i| probs[i]);
        // A named label must agree with the highest-scoring class name,
        // otherwise the probability columns are in a different order.
        if named_label && top.and_then(|i| names.get(i)) != Some(&prediction) {
            log::warn!(
                "Classifier predicted '{}' but its top probability maps to {:?}; omitting probabilities",
                prediction,
                top.and_then(|i| names.get(i))
            );
            return Ok((prediction, confidence, None));
        }
        let mapping: Probabilities = names.iter().cloned().zip(probs.iter().copied()).collect();
        Ok((prediction, confidence, Some(mapping)))
    }

    /// Classifies each text independently, keeping input order. Callers cap the
    /// batch at `MAX_BATCH_SIZE`.
    pub fn batch_predict(&self, texts: &[String]) -> Vec<Result<TextPrediction, ClassificationFailure>> {
        log::info!("Batch of {} texts", texts.len());
        texts.iter().map(|text| self.predict(text)).collect()
    }
}

impl From<TextPrediction> for TextResponse {
    fn from(p: TextPrediction) -> Self {
        TextResponse {
            success: true,
            prediction: Some(p.prediction),
            confidence: p.confidence,
            probabilities: p.probabilities,
            original_text: Some(p.original_text),
            cleaned_text: Some(p.cleaned_text),
            ..Default::default()
        }
    }
}

impl From<ClassificationFailure> for TextResponse {
    fn from(f: ClassificationFailure) -> Self {
        TextResponse {
            success: false,
            error_type: Some(f.error_type()),
            error: Some(f.message),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactLoader, ClassifierOutput, ImageClassifier, ModelLoadError};
    use crate::services::FailureKind;
    use ndarray::{Array1, ArrayView2};
    use shared::ErrorType;

    struct LengthEmbedder;
    impl SentenceEmbedder for LengthEmbedder {
        fn embed(&self, text: &str) -> Result<Array1<f32>, InferenceError> {
            Ok(Array1::from(vec![text.chars().count() as f32, 1.0]))
        }
    }

    #[derive(Clone)]
    struct FixedClassifier(RawLabel, Option<Vec<f32>>);
    impl TextClassifier for FixedClassifier {
        fn predict(&self, features: ArrayView2<f32>) -> Result<ClassifierOutput, InferenceError> {
            assert_eq!(features.nrows(), 1);
            Ok(ClassifierOutput {
                label: self.0.clone(),
                probabilities: self.1.clone(),
            })
        }
    }

    struct Loader {
        text: Option<FixedClassifier>,
        encoder: Option<Vec<&'static str>>,
    }

    impl ArtifactLoader for Loader {
        fn load_text_classifier(&self) -> Result<Arc<dyn TextClassifier>, ModelLoadError> {
            match &self.text {
                Some(classifier) => Ok(Arc::new(classifier.clone())),
                None => Err(ModelLoadError::NotFound {
                    artifact: "Text classifier",
                    path: "models/text_classifier.onnx".to_string(),
                }),
            }
        }

        fn load_label_encoder(&self) -> Result<Option<LabelEncoder>, ModelLoadError> {
            self.encoder
                .as_ref()
                .map(|c| LabelEncoder::new(c.iter().map(|s| s.to_string()).collect()))
                .transpose()
        }

        fn load_embedder(&self) -> Result<Arc<dyn SentenceEmbedder>, ModelLoadError> {
            Ok(Arc::new(LengthEmbedder))
        }

        fn load_image_classifier(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
            Err(ModelLoadError::InvalidModel("not used".to_string()))
        }
    }

    fn service(text: Option<FixedClassifier>, encoder: Option<Vec<&'static str>>) -> TextClassificationService {
        let cache = ModelCache::new(Arc::new(Loader { text, encoder }));
        TextClassificationService::new(
            Arc::new(cache),
            vec!["potholes".into(), "garbage".into(), "fallen_trees".into(), "electric_poles".into()],
            512,
        )
    }

    #[test]
    fn test_predict_with_label_encoder() {
        let svc = service(
            Some(FixedClassifier(RawLabel::Index(1), Some(vec![0.2, 0.7, 0.1]))),
            Some(vec!["electric_poles", "garbage", "potholes"]),
        );
        let p = svc.predict("Garbage piled up near https://x.io the market").unwrap();

        assert_eq!(p.prediction, "garbage");
        assert_eq!(p.confidence, Some(0.7));
        let probs = p.probabilities.unwrap();
        assert_eq!(probs.get("electric_poles"), Some(0.2));
        assert_eq!(probs.get("potholes"), Some(0.1));
        assert_eq!(p.cleaned_text, "garbage piled up near the market");
        assert_eq!(p.original_text, "Garbage piled up near https://x.io the market");
    }

    #[test]
    fn test_predict_without_encoder_uses_categories() {
        let svc = service(Some(FixedClassifier(RawLabel::Index(2), None)), None);
        let p = svc.predict("tree fell on the road").unwrap();
        assert_eq!(p.prediction, "fallen_trees");
        assert_eq!(p.confidence, None);
        assert_eq!(p.probabilities, None);
    }

    #[test]
    fn test_string_label_used_as_is() {
        let svc = service(
            Some(FixedClassifier(RawLabel::Name("potholes".into()), None)),
            Some(vec!["garbage"]),
        );
        assert_eq!(svc.predict("huge pothole here").unwrap().prediction, "potholes");
    }

    #[test]
    fn test_string_label_with_matching_probabilities() {
        let svc = service(
            Some(FixedClassifier(RawLabel::Name("potholes".into()), Some(vec![0.7, 0.1, 0.1, 0.1]))),
            None,
        );
        let p = svc.predict("huge pothole here").unwrap();
        assert_eq!(p.prediction, "potholes");
        assert_eq!(p.probabilities.unwrap().get("potholes"), Some(0.7));
    }

    #[test]
    fn test_string_label_disagreeing_with_probabilities_drops_them() {
        // Alphabetical class order: electric_poles scores highest, not potholes.
        let svc = service(
            Some(FixedClassifier(RawLabel::Name("potholes".into()), Some(vec![0.1, 0.1, 0.1, 0.7]))),
            None,
        );
        let p = svc.predict("huge pothole here").unwrap();
        assert_eq!(p.prediction, "potholes");
        assert_eq!(p.confidence, Some(0.7));
        assert_eq!(p.probabilities, None);
    }

    #[test]
    fn test_out_of_range_index_is_inference_error() {
        let svc = service(Some(FixedClassifier(RawLabel::Index(9), None)), None);
        let err = svc.predict("some valid text").unwrap_err();
        assert_eq!(err.kind, FailureKind::Inference);
        assert!(err.message.starts_with("Prediction error: "));
    }

    #[test]
    fn test_validation_failures() {
        let svc = service(Some(FixedClassifier(RawLabel::Index(0), None)), None);
        let err = svc.predict("   ").unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert_eq!(err.message, "Text cannot be empty");
        assert_eq!(err.error_type(), ErrorType::ValidationError);

        let err = svc.predict("hi").unwrap_err();
        assert_eq!(err.message, "Text is too short (minimum 5 characters)");
    }

    #[test]
    fn test_missing_classifier_is_model_unavailable() {
        let svc = service(None, None);
        let err = svc.predict("pothole on main road").unwrap_err();
        assert_eq!(err.kind, FailureKind::ModelUnavailable);
        assert_eq!(err.error_type(), ErrorType::ModelUnavailable);
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let svc = service(Some(FixedClassifier(RawLabel::Index(0), None)), None);
        let texts = vec![
            "pothole near school".to_string(),
            "".to_string(),
            "another pothole".to_string(),
        ];
        let results = svc.batch_predict(&texts);

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert!(results[1].is_err());
        assert_eq!(results[0].as_ref().unwrap().original_text, "pothole near school");
        assert_eq!(results[2].as_ref().unwrap().original_text, "another pothole");
    }

    #[test]
    fn test_failure_converts_to_response() {
        let resp: TextResponse = ClassificationFailure::validation("Text cannot be empty").into();
        assert!(!resp.success);
        assert_eq!(resp.error_type, Some(ErrorType::ValidationError));
        assert!(resp.prediction.is_none());
    }
}
