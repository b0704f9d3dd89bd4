use ndarray::{Array1, Array2, ArrayViewD, Axis, Ix2, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};

use super::onnx::load_session;
use super::{InferenceError, ModelLoadError, SentenceEmbedder};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Sentence-transformer exported to ONNX: token embeddings mean-pooled over the
/// attention mask. No extra normalization is applied.
pub struct OnnxSentenceEmbedder {
    tokenizer: Tokenizer,
    session: Session,
    uses_token_type_ids: bool,
    dir: PathBuf,
}

impl OnnxSentenceEmbedder {
    pub fn is_complete(dir: &Path) -> bool {
        dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
    }

    pub fn load(dir: &Path, max_tokens: usize, intra_threads: usize) -> Result<Self, ModelLoadError> {
        if !Self::is_complete(dir) {
            return Err(ModelLoadError::NotFound {
                artifact: "Embedder",
                path: dir.display().to_string(),
            });
        }

        let mut tokenizer = Tokenizer::from_file(dir.join(TOKENIZER_FILE))
            .map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;

        let session = load_session(&dir.join(MODEL_FILE), intra_threads)?;
        let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        if !input_names.contains(&"input_ids") || !input_names.contains(&"attention_mask") {
            return Err(ModelLoadError::InvalidModel(format!(
                "embedder must take input_ids and attention_mask, found {:?}",
                input_names
            )));
        }
        let uses_token_type_ids = input_names.contains(&"token_type_ids");

        Ok(Self {
            tokenizer,
            session,
            uses_token_type_ids,
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SentenceEmbedder for OnnxSentenceEmbedder {
    fn embed(&self, text: &str) -> Result<Array1<f32>, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let len = encoding.get_ids().len();
        let to_row = |values: &[u32]| {
            Array2::from_shape_vec((1, len), values.iter().map(|&v| v as i64).collect())
        };
        let input_ids = to_row(encoding.get_ids())?;
        let attention_mask = to_row(encoding.get_attention_mask())?;
        let mask: Vec<f32> = encoding.get_attention_mask().iter().map(|&m| m as f32).collect();

        let mut inputs = HashMap::new();
        inputs.insert("input_ids", Tensor::from_array(input_ids)?);
        inputs.insert("attention_mask", Tensor::from_array(attention_mask)?);
        if self.uses_token_type_ids {
            inputs.insert("token_type_ids", Tensor::from_array(to_row(encoding.get_type_ids())?)?);
        }

        let outputs = self.session.run(inputs)?;
        let hidden = outputs[0].try_extract_tensor::<f32>()?;
        pool(hidden, &mask)
    }
}

/// `[1, T, H]` token states are mean-pooled; an already pooled `[1, H]` output
/// is passed through.
fn pool(hidden: ArrayViewD<f32>, mask: &[f32]) -> Result<Array1<f32>, InferenceError> {
    match hidden.ndim() {
        2 => {
            let pooled = hidden.into_dimensionality::<Ix2>()?;
            Ok(pooled.index_axis(Axis(0), 0).to_owned())
        }
        3 => {
            let tokens = hidden.into_dimensionality::<Ix3>()?;
            let tokens = tokens.index_axis(Axis(0), 0);
            if tokens.nrows() != mask.len() {
                return Err(InferenceError::Output(format!(
                    "{} token states for {} mask entries",
                    tokens.nrows(),
                    mask.len()
                )));
            }

            let mut sum = Array1::<f32>::zeros(tokens.ncols());
            for (row, &m) in tokens.outer_iter().zip(mask) {
                if m > 0.0 {
                    sum.scaled_add(m, &row);
                }
            }
            let count = mask.iter().sum::<f32>().max(1e-9);
            Ok(sum / count)
        }
        n => Err(InferenceError::Output(format!("unexpected embedding rank {}", n))),
    }
}
