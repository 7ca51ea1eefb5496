//! Sentence embeddings from a MiniLM-style ONNX export.
//!
//! The model directory holds `model.onnx` and the matching `tokenizer.json`.
//! Token states are mean-pooled under the attention mask and L2-normalised,
//! which is what sentence-transformers does for `all-MiniLM-L6-v2`.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use ort::{
    inputs,
    session::builder::GraphOptimizationLevel,
    session::Session,
    value::Value,
};
use tokenizers::tokenizer::Tokenizer;
use tracing::{info, warn};

use crate::matching::semantic::Embedder;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// MiniLM was trained on sequences of at most 256 word pieces.
const MAX_TOKENS: usize = 256;
const INTRA_THREADS: usize = 4;

pub struct SentenceEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_type_ids: bool,
}

impl SentenceEncoder {
    /// `Ok(None)` when the directory does not hold both files.
    pub fn load_dir(dir: &Path) -> Result<Option<Self>> {
        let model_path = dir.join(MODEL_FILE);
        let tokenizer_path = dir.join(TOKENIZER_FILE);
        if !model_path.is_file() || !tokenizer_path.is_file() {
            warn!("sentence model incomplete in {}", dir.display());
            return Ok(None);
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?
            .commit_from_file(&model_path)
            .with_context(|| format!("failed to load {}", model_path.display()))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| anyhow!("failed to load {}: {}", tokenizer_path.display(), err))?;
        let wants_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        info!("loaded sentence model from {} ({} inputs)", dir.display(), session.inputs.len());
        Ok(Some(Self {
            session: Mutex::new(session),
            tokenizer,
            wants_type_ids,
        }))
    }

    fn encode(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|err| anyhow!("tokenizer failed: {}", err))?;
        let len = encoding.get_ids().len().min(MAX_TOKENS);
        if len == 0 {
            return Ok(None);
        }
        let widen = |values: &[u32]| values[..len].iter().map(|v| *v as i64).collect::<Vec<_>>();
        let ids = widen(encoding.get_ids());
        let mask = widen(encoding.get_attention_mask());
        let type_ids = widen(encoding.get_type_ids());

        let ids_tensor = Value::from_array(([1_usize, len], ids.into_boxed_slice()))?;
        let mask_tensor = Value::from_array(([1_usize, len], mask.clone().into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("sentence model lock poisoned"))?;
        let outputs = if self.wants_type_ids {
            let type_tensor = Value::from_array(([1_usize, len], type_ids.into_boxed_slice()))?;
            session.run(inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor
            ])?
        } else {
            session.run(inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])?
        };

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        if shape.len() != 3 {
            return Err(anyhow!("expected [batch, tokens, hidden] output, got {:?}", shape));
        }
        let hidden = shape[2] as usize;
        Ok(mean_pool(data, hidden, &mask).map(l2_normalize))
    }
}

impl Embedder for SentenceEncoder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.encode(text) {
            Ok(vector) => vector,
            Err(err) => {
                warn!("sentence embedding failed for {:?}: {:#}", text, err);
                None
            }
        }
    }
}

/// Average of the token states whose mask is set. `states` is row-major
/// `[tokens, hidden]` for a single sequence.
pub(crate) fn mean_pool(states: &[f32], hidden: usize, mask: &[i64]) -> Option<Vec<f32>> {
    if hidden == 0 {
        return None;
    }
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0usize;
    for (row, flag) in states.chunks_exact(hidden).zip(mask) {
        if *flag == 0 {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(row) {
            *acc += value;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    Some(sum)
}

pub(crate) fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}
