//! Learned acceptance model for candidate lines.
//!
//! Three JSON artifacts live in the model directory: a TF-IDF vocabulary,
//! a standard scaler for the numeric line features, and logistic-regression
//! weights over the concatenation of both.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ScanError;
use crate::pipeline::normalize::{alpha_token_ratio, has_currency_symbol, numeric_token_ratio};
use crate::pipeline::CandidateLine;

pub const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const CLASSIFIER_FILE: &str = "line_classifier.json";

const NUMERIC_FEATURES: usize = 6;

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("token regex"))
}

/// Numeric features of one candidate line, in model column order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFeatures {
    pub alpha_ratio: f64,
    pub pct_numeric: f64,
    pub token_count: f64,
    /// Read from the raw line, since normalisation strips currency symbols.
    /// Artifacts fitted on normalised text only ever saw 0 here and will
    /// see a shifted distribution for this column.
    pub has_currency: f64,
    pub max_conf: f64,
    pub left: f64,
}

impl LineFeatures {
    pub fn from_candidate(line: &CandidateLine) -> Self {
        let text = &line.normalized_text;
        Self {
            alpha_ratio: alpha_token_ratio(text),
            pct_numeric: numeric_token_ratio(text),
            token_count: text.split_whitespace().count() as f64,
            has_currency: if has_currency_symbol(&line.raw_text) { 1.0 } else { 0.0 },
            max_conf: line.max_confidence.map(f64::from).unwrap_or(0.0),
            left: line.left as f64,
        }
    }

    fn to_array(self) -> [f64; NUMERIC_FEATURES] {
        [
            self.alpha_ratio,
            self.pct_numeric,
            self.token_count,
            self.has_currency,
            self.max_conf,
            self.left,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    #[serde(default = "default_ngram_max")]
    ngram_max: usize,
    #[serde(default)]
    sublinear_tf: bool,
}

fn default_ngram_max() -> usize {
    1
}

impl TfidfVectorizer {
    fn validate(&self) -> Result<()> {
        if self.ngram_max == 0 {
            return Err(anyhow!("ngram_max must be at least 1"));
        }
        if let Some((term, idx)) = self.vocabulary.iter().find(|(_, idx)| **idx >= self.idf.len()) {
            return Err(anyhow!("term {:?} has index {} beyond idf length {}", term, idx, self.idf.len()));
        }
        Ok(())
    }

    /// L2-normalised TF-IDF row for `text`.
    fn transform(&self, text: &str) -> Vec<f64> {
        let lowered = text.to_lowercase();
        let words = token_pattern()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .collect::<Vec<_>>();
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for n in 1..=self.ngram_max {
            for gram in words.windows(n) {
                if let Some(idx) = self.vocabulary.get(&gram.join(" ")) {
                    *counts.entry(*idx).or_default() += 1.0;
                }
            }
        }

        let mut row = vec![0.0; self.idf.len()];
        for (idx, count) in counts {
            let tf = if self.sublinear_tf { 1.0 + count.ln() } else { count };
            row[idx] = tf * self.idf[idx];
        }
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value /= norm;
            }
        }
        row
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    fn validate(&self) -> Result<()> {
        if self.mean.len() != NUMERIC_FEATURES || self.scale.len() != NUMERIC_FEATURES {
            return Err(anyhow!(
                "expected {} means and scales, got {} and {}",
                NUMERIC_FEATURES,
                self.mean.len(),
                self.scale.len()
            ));
        }
        Ok(())
    }

    fn transform(&self, features: [f64; NUMERIC_FEATURES]) -> [f64; NUMERIC_FEATURES] {
        let mut out = [0.0; NUMERIC_FEATURES];
        for (i, value) in features.iter().enumerate() {
            // A constant column is stored with scale 0.
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            out[i] = (value - self.mean[i]) / scale;
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LogisticModel {
    coef: Vec<f64>,
    intercept: f64,
}

pub struct LineClassifier {
    vectorizer: TfidfVectorizer,
    scaler: StandardScaler,
    model: LogisticModel,
}

fn read_artifact<T: for<'de> Deserialize<'de>>(dir: &Path, name: &str) -> Result<T, ScanError> {
    let path = dir.join(name);
    let parsed: Result<T> = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))
        .and_then(|content| serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display())));
    parsed.map_err(|err| ScanError::artifact(name, err))
}

impl LineClassifier {
    /// `Ok(None)` when the directory does not hold a complete artifact set.
    pub fn load_dir(dir: &Path) -> Result<Option<Self>, ScanError> {
        let files = [VECTORIZER_FILE, SCALER_FILE, CLASSIFIER_FILE];
        if let Some(missing) = files.iter().find(|name| !dir.join(name).is_file()) {
            debug!("line classifier disabled: {} not in {}", missing, dir.display());
            return Ok(None);
        }

        let vectorizer: TfidfVectorizer = read_artifact(dir, VECTORIZER_FILE)?;
        vectorizer.validate().map_err(|err| ScanError::artifact(VECTORIZER_FILE, err))?;
        let scaler: StandardScaler = read_artifact(dir, SCALER_FILE)?;
        scaler.validate().map_err(|err| ScanError::artifact(SCALER_FILE, err))?;
        let model: LogisticModel = read_artifact(dir, CLASSIFIER_FILE)?;

        let expected = vectorizer.idf.len() + NUMERIC_FEATURES;
        if model.coef.len() != expected {
            return Err(ScanError::artifact(
                CLASSIFIER_FILE,
                format!("expected {} coefficients, got {}", expected, model.coef.len()),
            ));
        }
        info!(
            "loaded line classifier from {} ({} terms)",
            dir.display(),
            vectorizer.vocabulary.len()
        );
        Ok(Some(Self {
            vectorizer,
            scaler,
            model,
        }))
    }

    /// Probability that `line` is a genuine item line.
    pub fn predict_proba(&self, line: &CandidateLine) -> f64 {
        self.predict_features(&line.normalized_text, LineFeatures::from_candidate(line))
    }

    pub fn predict_features(&self, text: &str, features: LineFeatures) -> f64 {
        let tfidf = self.vectorizer.transform(text);
        let numeric = self.scaler.transform(features.to_array());
        let logit = tfidf
            .iter()
            .chain(numeric.iter())
            .zip(&self.model.coef)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.model.intercept;
        1.0 / (1.0 + (-logit).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn candidate(text: &str, raw: &str) -> CandidateLine {
        CandidateLine {
            raw_text: raw.to_string(),
            stripped_text: raw.to_string(),
            normalized_text: text.to_string(),
            left: 20,
            max_confidence: Some(91.0),
            acceptance_probability: 0.6,
        }
    }

    fn write_artifacts(dir: &Path, coef: Vec<f64>) {
        let vectorizer = json!({
            "vocabulary": {"biryani": 0, "chicken": 1, "total": 2, "chicken biryani": 3},
            "idf": [1.5, 1.2, 2.0, 2.2],
            "ngram_max": 2,
            "sublinear_tf": true
        });
        let scaler = json!({"mean": [0.5, 0.2, 2.0, 0.3, 60.0, 100.0], "scale": [0.3, 0.2, 1.0, 0.0, 20.0, 50.0]});
        let model = json!({"coef": coef, "intercept": -0.5});
        fs::write(dir.join(VECTORIZER_FILE), vectorizer.to_string()).expect("write");
        fs::write(dir.join(SCALER_FILE), scaler.to_string()).expect("write");
        fs::write(dir.join(CLASSIFIER_FILE), model.to_string()).expect("write");
    }

    #[test]
    fn features_follow_the_line() {
        let features = LineFeatures::from_candidate(&candidate("2x chicken biryani", "2x Chicken Biryani ₹280"));
        assert_eq!(features.alpha_ratio, 1.0);
        assert_eq!(features.pct_numeric, 1.0 / 3.0);
        assert_eq!(features.token_count, 3.0);
        assert_eq!(features.has_currency, 1.0);
        assert_eq!(features.max_conf, 91.0);
        assert_eq!(features.left, 20.0);
    }

    #[test]
    fn currency_comes_from_the_raw_line() {
        let priced = LineFeatures::from_candidate(&candidate("paneer tikka", "Paneer Tikka ₹240"));
        let plain = LineFeatures::from_candidate(&candidate("paneer tikka", "Paneer Tikka"));
        assert_eq!(priced.has_currency, 1.0);
        assert_eq!(plain.has_currency, 0.0);
    }

    #[test]
    fn tfidf_rows_are_unit_length() {
        let vectorizer = TfidfVectorizer {
            vocabulary: HashMap::from([("naan".to_string(), 0), ("butter".to_string(), 1), ("butter naan".to_string(), 2)]),
            idf: vec![1.0, 2.0, 3.0],
            ngram_max: 2,
            sublinear_tf: false,
        };
        let row = vectorizer.transform("Butter NAAN, a");
        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        assert!(row.iter().all(|v| *v > 0.0));
        assert_eq!(vectorizer.transform("x y"), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_artifacts_disable_the_model() {
        let dir = tempdir().expect("tempdir");
        assert!(LineClassifier::load_dir(dir.path()).expect("load").is_none());
    }

    #[test]
    fn coefficient_mismatch_is_an_artifact_error() {
        let dir = tempdir().expect("tempdir");
        write_artifacts(dir.path(), vec![0.1; 3]);
        let err = LineClassifier::load_dir(dir.path()).err().expect("error");
        assert!(matches!(err, ScanError::ArtifactLoad { ref artifact, .. } if artifact == CLASSIFIER_FILE));
    }

    #[test]
    fn corrupt_artifact_is_an_error() {
        let dir = tempdir().expect("tempdir");
        write_artifacts(dir.path(), vec![0.0; 10]);
        fs::write(dir.path().join(SCALER_FILE), "{not json").expect("write");
        assert!(LineClassifier::load_dir(dir.path()).is_err());
    }

    #[test]
    fn food_lines_score_higher_than_totals() {
        let dir = tempdir().expect("tempdir");
        write_artifacts(dir.path(), vec![1.5, 1.0, -3.0, 2.0, 0.8, -0.5, 0.2, 0.0, 0.5, 0.0]);
        let classifier = LineClassifier::load_dir(dir.path()).expect("load").expect("model");
        let food = classifier.predict_proba(&candidate("chicken biryani", "Chicken Biryani"));
        let total = classifier.predict_proba(&candidate("total 240", "Total ₹240"));
        assert!(food > 0.75, "food probability {}", food);
        assert!(total < food);
        assert!((0.0..=1.0).contains(&total));
    }
}
