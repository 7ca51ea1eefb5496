//! Itemised nutrient estimates for free-form dish names, and plain substring
//! search over the food table.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::food_db::{normalize_name, FoodRecord, NutrientProfile};
use crate::matching::ItemMatcher;
use crate::pipeline::quantity::{parse_quantity, portion_multiplier};
use crate::settings::PortionTrigger;

/// Hits returned by [`ItemMatcher::search`] at most.
pub const SEARCH_LIMIT: usize = 15;

const DEFAULT_KCAL: f64 = 350.0;
/// Keyword-specific base energy, checked in order.
const KCAL_BY_KEYWORD: [(&str, f64); 4] = [("salad", 220.0), ("biryani", 420.0), ("pizza", 700.0), ("paneer", 450.0)];
const PROTEIN_SHARE: f64 = 0.12;
const CARB_SHARE: f64 = 0.45;
const FAT_SHARE: f64 = 0.43;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EstimateRequest {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: f64,
    #[serde(default = "one")]
    pub portion: f64,
}

fn one() -> f64 {
    1.0
}

impl EstimateRequest {
    pub fn new(name: impl Into<String>, quantity: f64, portion: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            portion,
        }
    }

    /// Reads `"2x mini biryani"` style text the same way receipt lines are read.
    pub fn from_text(text: &str, portions: &[PortionTrigger]) -> Self {
        let (quantity, name) = parse_quantity(text);
        Self {
            portion: portion_multiplier(&name, portions),
            quantity: quantity as f64,
            name,
        }
    }

    pub fn servings(&self) -> f64 {
        self.quantity * self.portion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    LocalMatch { score: u32 },
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatedItem {
    pub item: String,
    pub matched: Option<String>,
    pub quantity: f64,
    /// Already scaled by quantity and portion.
    pub nutrients: NutrientProfile,
    pub provenance: Provenance,
}

/// Totals rounded to one decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacroTotals {
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EstimateSummary {
    pub results: Vec<EstimatedItem>,
    pub totals: NutrientProfile,
    pub macros: MacroTotals,
}

/// Energy split 12/45/43 over protein, carbs and fat for an unknown dish.
pub fn heuristic_profile(name: &str) -> NutrientProfile {
    let lowered = name.to_lowercase();
    let kcal = KCAL_BY_KEYWORD
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, kcal)| *kcal)
        .unwrap_or(DEFAULT_KCAL);
    NutrientProfile {
        calories: kcal,
        protein: kcal * PROTEIN_SHARE / 4.0,
        carbs: kcal * CARB_SHARE / 4.0,
        fat: kcal * FAT_SHARE / 9.0,
        ..NutrientProfile::default()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn add(acc: NutrientProfile, part: &NutrientProfile) -> NutrientProfile {
    NutrientProfile {
        calories: acc.calories + part.calories,
        protein: acc.protein + part.protein,
        carbs: acc.carbs + part.carbs,
        fat: acc.fat + part.fat,
        fiber: acc.fiber + part.fiber,
        sugar: acc.sugar + part.sugar,
    }
}

impl ItemMatcher {
    /// Up to [`SEARCH_LIMIT`] records whose normalised name contains `query`.
    pub fn search(&self, query: &str) -> Vec<&FoodRecord> {
        let needle = normalize_name(query);
        self.table()
            .records()
            .iter()
            .filter(|record| record.norm.contains(&needle))
            .take(SEARCH_LIMIT)
            .collect()
    }

    /// Nutrients for each named item: the closest table entry (or the pulao
    /// stand-in) when there is one, the keyword heuristic otherwise. Blank
    /// names are skipped.
    pub fn estimate_items(&self, items: &[EstimateRequest], min_score: u32) -> EstimateSummary {
        let mut results = Vec::with_capacity(items.len());
        for request in items {
            let name = request.name.trim();
            if name.is_empty() {
                continue;
            }
            let servings = request.servings();
            let found = self
                .closest_food(name, min_score)
                .and_then(|best| best.nutrient_profile.map(|profile| (best, profile)));
            let item = match found {
                Some((best, profile)) => EstimatedItem {
                    item: name.to_string(),
                    matched: Some(best.db_item),
                    quantity: request.quantity,
                    nutrients: profile.scaled(servings),
                    provenance: Provenance::LocalMatch { score: best.score },
                },
                None => EstimatedItem {
                    item: name.to_string(),
                    matched: None,
                    quantity: request.quantity,
                    nutrients: heuristic_profile(name).scaled(servings),
                    provenance: Provenance::Heuristic,
                },
            };
            debug!("estimate {:?} -> {:?}", name, item.provenance);
            results.push(item);
        }

        let totals = results
            .iter()
            .fold(NutrientProfile::default(), |acc, item| add(acc, &item.nutrients));
        let macros = MacroTotals {
            total_calories: round1(totals.calories),
            total_protein: round1(totals.protein),
            total_carbs: round1(totals.carbs),
            total_fat: round1(totals.fat),
        };
        EstimateSummary {
            results,
            totals,
            macros,
        }
    }
}

impl Provenance {
    pub fn is_heuristic(&self) -> bool {
        matches!(self, Provenance::Heuristic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MatchingSettings, Settings};
    use crate::test_util::sample_table;
    use std::sync::Arc;

    fn matcher() -> ItemMatcher {
        ItemMatcher::new(Arc::new(sample_table()), &MatchingSettings::default())
    }

    #[test]
    fn matched_items_scale_by_servings() {
        let summary = matcher().estimate_items(&[EstimateRequest::new("Butter Naan", 2.0, 1.5)], 60);
        let item = &summary.results[0];
        assert_eq!(item.matched.as_deref(), Some("Butter Naan"));
        assert_eq!(item.provenance, Provenance::LocalMatch { score: 100 });
        let per_serving = sample_table().get(2).expect("naan").nutrients;
        assert!((item.nutrients.calories - per_serving.calories * 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_biryani_uses_the_pulao_stand_in() {
        let summary = matcher().estimate_items(&[EstimateRequest::new("Hyderabadi Dum Biryani Special", 1.0, 1.0)], 90);
        let item = &summary.results[0];
        assert_eq!(item.matched.as_deref(), Some("Veg Pulao"));
        assert_eq!(item.provenance, Provenance::LocalMatch { score: 60 });
    }

    #[test]
    fn unknown_dishes_fall_back_to_keyword_energy() {
        let summary = matcher().estimate_items(
            &[
                EstimateRequest::new("Greek Salad", 1.0, 1.0),
                EstimateRequest::new("Farmhouse Pizza", 2.0, 1.0),
                EstimateRequest::new("   ", 1.0, 1.0),
            ],
            95,
        );
        assert_eq!(summary.results.len(), 2);
        assert!(summary.results.iter().all(|item| item.provenance.is_heuristic()));
        assert_eq!(summary.results[0].nutrients.calories, 220.0);
        assert_eq!(summary.results[1].nutrients.calories, 1400.0);
        // 220 * 0.12 / 4 + 1400 * 0.12 / 4
        assert_eq!(summary.macros.total_protein, 48.6);
        assert_eq!(summary.macros.total_calories, 1620.0);
        assert_eq!(summary.macros.total_fat, 77.4);
    }

    #[test]
    fn default_energy_for_unknown_keywords() {
        let profile = heuristic_profile("Something New");
        assert_eq!(profile.calories, 350.0);
        assert_eq!(profile.fiber, 0.0);
    }

    #[test]
    fn requests_read_quantity_and_portion_from_text() {
        let portions = Settings::default().vocabulary.portions;
        let request = EstimateRequest::from_text("2x Mini Paneer Tikka", &portions);
        assert_eq!(request.name, "mini paneer tikka");
        assert_eq!(request.quantity, 2.0);
        assert_eq!(request.portion, 0.6);
        assert!((request.servings() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn search_is_a_capped_substring_match() {
        let matcher = matcher();
        let hits = matcher.search("Naan");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item, "Butter Naan");
        assert!(matcher.search("sushi").is_empty());
        assert_eq!(matcher.search("a").len(), 6);
    }
}
