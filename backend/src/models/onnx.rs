use ndarray::{Array1, ArrayView2, ArrayView4};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use super::{ClassifierOutput, ImageClassifier, InferenceError, ModelLoadError, RawLabel, TextClassifier};

static ENVIRONMENT: OnceLock<Result<(), String>> = OnceLock::new();

fn ensure_initialized() -> Result<(), ModelLoadError> {
    ENVIRONMENT
        .get_or_init(|| {
            ort::init()
                .with_name("civic-ml")
                .commit()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(ModelLoadError::InvalidModel)
}

/// Session builder on the shared environment. `intra_threads == 0` lets the
/// runtime pick.
pub fn create_session_builder(intra_threads: usize) -> Result<SessionBuilder, ModelLoadError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;
    if intra_threads > 0 {
        builder = builder.with_intra_threads(intra_threads)?;
    }
    Ok(builder.with_optimization_level(GraphOptimizationLevel::Level3)?)
}

pub fn load_session(path: &Path, intra_threads: usize) -> Result<Session, ModelLoadError> {
    let session = create_session_builder(intra_threads)?.commit_from_file(path)?;
    if session.inputs.is_empty() || session.outputs.is_empty() {
        return Err(ModelLoadError::InvalidModel(format!(
            "{} must declare at least one input and one output",
            path.display()
        )));
    }
    Ok(session)
}

/// scikit-learn estimator exported with skl2onnx (`zipmap=False`).
pub struct OnnxTextClassifier {
    session: Session,
    input_name: String,
    label_output: String,
    probability_output: Option<String>,
}

impl OnnxTextClassifier {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self, ModelLoadError> {
        let session = load_session(path, intra_threads)?;
        let input_name = session.inputs[0].name.clone();

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelLoadError::InvalidModel("no label output".to_string()))?;
        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        log::info!(
            "Text classifier io: input={}, label={}, probabilities={:?}",
            input_name,
            label_output,
            probability_output
        );

        Ok(Self {
            session,
            input_name,
            label_output,
            probability_output,
        })
    }
}

impl TextClassifier for OnnxTextClassifier {
    fn predict(&self, features: ArrayView2<f32>) -> Result<ClassifierOutput, InferenceError> {
        let input = features.as_standard_layout().into_owned();
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.as_str(), Tensor::from_array(input)?);

        let outputs = self.session.run(inputs)?;

        let label_value = &outputs[self.label_output.as_str()];
        let label = match label_value.try_extract_tensor::<i64>() {
            Ok(view) => view
                .iter()
                .next()
                .copied()
                .map(RawLabel::Index)
                .ok_or_else(|| InferenceError::Output("empty label tensor".to_string()))?,
            Err(_) => label_value
                .try_extract_string_tensor()?
                .iter()
                .next()
                .cloned()
                .map(RawLabel::Name)
                .ok_or_else(|| InferenceError::Output("empty label tensor".to_string()))?,
        };

        let probabilities = match &self.probability_output {
            Some(name) => {
                let view = outputs[name.as_str()].try_extract_tensor::<f32>()?;
                Some(view.iter().copied().collect())
            }
            None => None,
        };

        Ok(ClassifierOutput {
            label,
            probabilities,
        })
    }
}

/// Keras CNN exported with tf2onnx, NHWC float input.
pub struct OnnxImageClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxImageClassifier {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self, ModelLoadError> {
        let session = load_session(path, intra_threads)?;
        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();
        log::info!("Image classifier io: input={}, output={}", input_name, output_name);
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

impl ImageClassifier for OnnxImageClassifier {
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array1<f32>, InferenceError> {
        let input = batch.as_standard_layout().into_owned();
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.as_str(), Tensor::from_array(input)?);

        let outputs = self.session.run(inputs)?;
        let scores = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        if scores.is_empty() {
            return Err(InferenceError::Output("empty prediction tensor".to_string()));
        }
        Ok(scores.iter().copied().collect())
    }
}
