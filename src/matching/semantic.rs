use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::food_db::FoodTable;
use crate::matching::fuzzy::process;

/// Maps a phrase to a dense vector. `None` when nothing in the phrase is known.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Word vectors in the GloVe text layout, one `word v1 v2 ... vn` per line.
/// A phrase is the mean of its known token vectors.
#[derive(Debug, Clone, Default)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read word vectors {}", path.display()))?;
        let vectors = Self::parse(&content)
            .with_context(|| format!("failed to parse word vectors {}", path.display()))?;
        info!("loaded {} word vectors (dim {}) from {}", vectors.len(), vectors.dim, path.display());
        Ok(vectors)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut dim = 0usize;
        let mut vectors = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let values = parts
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("line {}: bad component", idx + 1))?;
            // word2vec-style "count dim" header
            if idx == 0 && values.len() == 1 && word.parse::<usize>().is_ok() {
                continue;
            }
            if values.is_empty() {
                continue;
            }
            if dim == 0 {
                dim = values.len();
            } else if values.len() != dim {
                return Err(anyhow!("line {}: expected {} components, got {}", idx + 1, dim, values.len()));
            }
            vectors.insert(word.to_lowercase(), values);
        }
        if vectors.is_empty() {
            return Err(anyhow!("no word vectors found"));
        }
        Ok(Self { dim, vectors })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let mut dim = 0;
        let mut vectors = HashMap::new();
        for (word, vector) in entries {
            dim = dim.max(vector.len());
            vectors.insert(word.into().to_lowercase(), vector);
        }
        Self { dim, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl Embedder for WordVectors {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let mut sum = vec![0.0f32; self.dim];
        let mut known = 0usize;
        for token in process(text).split_whitespace() {
            if let Some(vector) = self.vectors.get(token) {
                for (acc, value) in sum.iter_mut().zip(vector) {
                    *acc += value;
                }
                known += 1;
            }
        }
        if known == 0 {
            return None;
        }
        for value in &mut sum {
            *value /= known as f32;
        }
        Some(sum)
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Maps cosine in [-1, 1] onto 0..=100, truncating.
pub fn scale_cosine(cos: f32) -> u32 {
    (((cos.clamp(-1.0, 1.0) + 1.0) / 2.0) * 100.0) as u32
}

/// Food-name embeddings, computed once for a table.
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    rows: Vec<(usize, Vec<f32>)>,
}

impl SemanticIndex {
    pub fn build(embedder: Arc<dyn Embedder>, table: &FoodTable) -> Self {
        let rows = table
            .records()
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| embedder.embed(&record.item).map(|vector| (idx, vector)))
            .collect::<Vec<_>>();
        info!("semantic index covers {} of {} foods", rows.len(), table.len());
        Self { embedder, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Top `top_k` table rows by cosine similarity, as `(row, scaled score)`.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(usize, u32)> {
        let Some(query) = self.embedder.embed(query) else {
            return Vec::new();
        };
        let mut scored = self
            .rows
            .iter()
            .map(|(idx, vector)| (*idx, cosine(&query, vector)))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(top_k)
            .map(|(idx, cos)| (idx, scale_cosine(cos)))
            .collect()
    }
}
