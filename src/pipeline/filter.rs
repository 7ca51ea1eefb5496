use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::audit::RequestLog;
use crate::ocr::RawLine;
use crate::pipeline::columns::NumericColumns;
use crate::pipeline::normalize::{alpha_token_ratio, TextRules};

/// An OCR line that survived filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateLine {
    pub raw_text: String,
    /// Raw text minus numeric-column tokens.
    pub stripped_text: String,
    pub normalized_text: String,
    pub left: u32,
    pub max_confidence: Option<f32>,
    pub acceptance_probability: f64,
}

#[derive(Debug, Clone)]
pub struct LineFilter {
    rules: TextRules,
    min_alpha_ratio: f64,
    min_word_confidence: f32,
    default_probability: f64,
}

impl LineFilter {
    pub fn new(rules: TextRules, min_alpha_ratio: f64, min_word_confidence: f32, default_probability: f64) -> Self {
        Self {
            rules,
            min_alpha_ratio,
            min_word_confidence,
            default_probability,
        }
    }

    pub fn rules(&self) -> &TextRules {
        &self.rules
    }

    /// Keeps item-like lines. Every dropped line is recorded in `log`.
    pub fn filter(&self, lines: &[RawLine], columns: &NumericColumns, log: &mut RequestLog<'_>) -> Vec<CandidateLine> {
        lines
            .iter()
            .filter_map(|line| self.check(line, columns, log))
            .collect()
    }

    fn check(&self, line: &RawLine, columns: &NumericColumns, log: &mut RequestLog<'_>) -> Option<CandidateLine> {
        let raw = line.text.trim();
        if raw.is_empty() {
            log.reject("empty", raw, None);
            return None;
        }

        let stripped = columns.strip(line);
        if stripped.is_empty() {
            log.reject("price_only", raw, Some(json!({ "text_no_price": stripped })));
            return None;
        }
        if self.rules.is_garble(raw) {
            log.reject("garble", raw, None);
            return None;
        }
        if self.rules.is_noise(raw) {
            log.reject("noise_pattern", raw, None);
            return None;
        }

        let has_trigger = self.rules.has_food_trigger(&stripped);
        if alpha_token_ratio(&stripped) < self.min_alpha_ratio && !has_trigger {
            log.reject("alpha_ratio_low", raw, Some(json!({ "text_no_price": stripped })));
            return None;
        }

        let max_confidence = line.max_token_confidence();
        if let Some(max_conf) = max_confidence {
            if max_conf < self.min_word_confidence && !has_trigger {
                log.reject("low_confidence", raw, Some(json!({ "max_conf": max_conf })));
                return None;
            }
        }

        let normalized = self.rules.normalize(&stripped);
        if normalized.chars().count() <= 3 && !self.rules.is_food_trigger(&normalized) {
            log.reject("too_short_token", raw, Some(json!({ "cleaned": normalized })));
            return None;
        }

        debug!("candidate {:?} -> {:?}", raw, normalized);
        Some(CandidateLine {
            raw_text: raw.to_string(),
            stripped_text: stripped,
            normalized_text: normalized,
            left: line.left,
            max_confidence,
            acceptance_probability: self.default_probability,
        })
    }
}
