use serde::Serialize;

use crate::audit::Rejection;
use crate::food_db::NutrientProfile;
use crate::matching::MatchCandidate;
use crate::pipeline::aggregate::NutrientTotals;

/// One candidate line after quantity parsing and matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedItem {
    pub raw_text: String,
    pub extracted_text: String,
    pub quantity: u32,
    /// The line carried a quantity prefix; `quantity` is 1 otherwise.
    pub explicit_quantity: bool,
    pub portion_multiplier: f64,
    pub best_match: Option<String>,
    pub best_score: u32,
    pub candidates: Vec<MatchCandidate>,
    pub acceptance_probability: f64,
}

impl MappedItem {
    pub fn best(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    /// Servings: parsed quantity times the portion multiplier.
    pub fn servings(&self) -> f64 {
        self.quantity as f64 * self.portion_multiplier
    }
}

/// Output row. Nutrient fields are per serving; an unaccepted row carries
/// the extracted text as `item` and zeroes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub item: String,
    pub quantity: f64,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub confidence: u32,
    pub acceptance_probability: f64,
    pub accepted: bool,
}

impl ResultRow {
    pub(crate) fn accepted(item: &str, quantity: f64, nutrients: NutrientProfile, confidence: u32, probability: f64) -> Self {
        Self {
            item: item.to_string(),
            quantity,
            calories: nutrients.calories,
            protein: nutrients.protein,
            carbs: nutrients.carbs,
            fat: nutrients.fat,
            fiber: nutrients.fiber,
            sugar: nutrients.sugar,
            confidence,
            acceptance_probability: probability,
            accepted: true,
        }
    }

    pub(crate) fn pass_through(item: &str, quantity: f64, confidence: u32, probability: f64) -> Self {
        Self {
            accepted: false,
            ..Self::accepted(item, quantity, NutrientProfile::default(), confidence, probability)
        }
    }

    pub fn nutrients(&self) -> NutrientProfile {
        NutrientProfile {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            fiber: self.fiber,
            sugar: self.sugar,
        }
    }

    /// What this row adds to the totals.
    pub fn contribution(&self) -> NutrientProfile {
        self.nutrients().scaled(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub ocr_lines_count: usize,
    pub candidate_lines_count: usize,
    pub detected_restaurant: Option<String>,
    pub restaurant_menu_count: usize,
    pub mapped_items: Vec<MappedItem>,
    pub rows: Vec<ResultRow>,
    pub summary: NutrientTotals,
    pub insights: Vec<String>,
    pub ocr_text: String,
    pub ocr_text_preview: String,
    pub rejections: Vec<Rejection>,
}

/// First `limit` characters, with `...` appended when cut.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out = text.chars().take(limit).collect::<String>();
    out.push_str("...");
    out
}
