pub mod estimate;
pub mod fuzzy;
pub mod semantic;
pub mod transformer;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::food_db::{normalize_name, FoodTable, NutrientProfile};
use crate::settings::MatchingSettings;

pub use estimate::{EstimateRequest, EstimateSummary, EstimatedItem, MacroTotals, Provenance};
pub use semantic::{Embedder, SemanticIndex, WordVectors};
pub use transformer::SentenceEncoder;

/// Score given to a lookup whose name contains, or is contained in, a
/// table entry.
const SUBSTRING_SCORE: u32 = 85;
/// Score given to the pulao stand-in for an unknown biryani.
const PULAO_FALLBACK_SCORE: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Lexical,
    Semantic,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub db_item: String,
    pub score: u32,
    pub nutrient_profile: Option<NutrientProfile>,
    pub source: MatchSource,
}

pub struct ItemMatcher {
    table: Arc<FoodTable>,
    fuzzy_limit: usize,
    semantic_trigger_score: u32,
    semantic_top_k: usize,
}

impl ItemMatcher {
    pub fn new(table: Arc<FoodTable>, settings: &MatchingSettings) -> Self {
        Self {
            table,
            fuzzy_limit: settings.fuzzy_limit,
            semantic_trigger_score: settings.semantic_trigger_score,
            semantic_top_k: settings.semantic_top_k,
        }
    }

    pub fn table(&self) -> &FoodTable {
        &self.table
    }

    fn candidate(&self, row: usize, score: u32, source: MatchSource) -> Option<MatchCandidate> {
        self.table.get(row).map(|record| MatchCandidate {
            db_item: record.item.clone(),
            score,
            nutrient_profile: Some(record.nutrients),
            source,
        })
    }

    /// Fuzzy candidates, restricted to the restaurant's rows when the table
    /// has any.
    pub fn lexical(&self, text: &str, restaurant: Option<&str>) -> Vec<MatchCandidate> {
        if text.trim().is_empty() || self.table.is_empty() {
            return Vec::new();
        }
        let scoped = restaurant
            .map(|name| self.table.restaurant_rows(name))
            .unwrap_or_default();
        let rows = if scoped.is_empty() {
            (0..self.table.len()).collect::<Vec<_>>()
        } else {
            scoped
        };
        let names = rows
            .iter()
            .filter_map(|row| self.table.get(*row))
            .map(|record| record.item.as_str());
        fuzzy::extract(text, names, self.fuzzy_limit)
            .into_iter()
            .filter_map(|(pos, score)| self.candidate(rows[pos], score, MatchSource::Lexical))
            .collect()
    }

    pub fn semantic(&self, index: &SemanticIndex, text: &str) -> Vec<MatchCandidate> {
        index
            .search(text, self.semantic_top_k)
            .into_iter()
            .filter_map(|(row, score)| self.candidate(row, score, MatchSource::Semantic))
            .collect()
    }

    /// Lexical matching, topped up with semantic candidates when the best
    /// lexical score is below the trigger.
    pub fn match_item(&self, text: &str, restaurant: Option<&str>, index: Option<&SemanticIndex>) -> Vec<MatchCandidate> {
        let lexical = self.lexical(text, restaurant);
        let weak = lexical
            .first()
            .is_none_or(|best| best.score < self.semantic_trigger_score);
        match index {
            Some(index) if weak => {
                let semantic = self.semantic(index, text);
                debug!("semantic fallback for {:?}: {} hits", text, semantic.len());
                merge_candidates(lexical, semantic)
            }
            _ => lexical,
        }
    }

    /// Single-name lookup used outside the scan pipeline.
    pub fn closest_food(&self, name: &str, min_score: u32) -> Option<MatchCandidate> {
        let query = normalize_name(name);
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(usize, u32)> = None;
        for (row, record) in self.table.records().iter().enumerate() {
            if record.norm.is_empty() {
                continue;
            }
            if best.is_none() && (record.norm.contains(&query) || query.contains(&record.norm)) {
                best = Some((row, SUBSTRING_SCORE));
            }
        }
        for (row, record) in self.table.records().iter().enumerate() {
            let score = fuzzy::score(&query, &record.norm);
            if score > best.map_or(0, |(_, best_score)| best_score) {
                best = Some((row, score));
            }
        }

        match best {
            Some((row, score)) if score >= min_score => self.candidate(row, score, MatchSource::Lexical),
            _ => self.pulao_fallback(name),
        }
    }

    fn pulao_fallback(&self, name: &str) -> Option<MatchCandidate> {
        if !name.to_lowercase().contains("biryani") {
            return None;
        }
        let row = self.table.records().iter().position(|record| {
            record.norm.contains("pulao") && (record.norm.contains("chicken") || record.norm.contains("veg"))
        })?;
        self.candidate(row, PULAO_FALLBACK_SCORE, MatchSource::Fallback)
    }
}

/// Union by item name keeping the higher score; on a tie the earlier
/// (lexical) entry stays. Result is sorted by score, stable.
pub fn merge_candidates(lexical: Vec<MatchCandidate>, semantic: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    let mut merged: Vec<MatchCandidate> = lexical;
    for candidate in semantic {
        match merged.iter_mut().find(|existing| existing.db_item == candidate.db_item) {
            Some(existing) if candidate.score > existing.score => *existing = candidate,
            Some(_) => {}
            None => merged.push(candidate),
        }
    }
    merged.sort_by(|a, b| b.score.cmp(&a.score));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::food_db::FoodRecord;
    use crate::settings::MatchingSettings;
    use crate::test_util::{nutrients, sample_table};

    fn matcher(table: FoodTable) -> ItemMatcher {
        ItemMatcher::new(Arc::new(table), &MatchingSettings::default())
    }

    fn cand(name: &str, score: u32, source: MatchSource) -> MatchCandidate {
        MatchCandidate {
            db_item: name.to_string(),
            score,
            nutrient_profile: None,
            source,
        }
    }

    #[test]
    fn lexical_returns_best_first() {
        let hits = matcher(sample_table()).lexical("chicken biryani", None);
        assert_eq!(hits.len(), 6);
        assert_eq!(hits[0].db_item, "Chicken Biryani");
        assert_eq!(hits[0].score, 100);
        assert!(hits[0].nutrient_profile.is_some());
    }

    #[test]
    fn restaurant_scope_applies_when_rows_exist() {
        let table = FoodTable::from_records(vec![
            FoodRecord::new("Chicken Biryani", nutrients(300.0, 0.0, 0.0, 0.0, 0.0, 0.0)),
            FoodRecord::new("Chicken Biryani", nutrients(420.0, 0.0, 0.0, 0.0, 0.0, 0.0)).with_restaurant("meghana foods"),
            FoodRecord::new("Boneless Biryani", nutrients(500.0, 0.0, 0.0, 0.0, 0.0, 0.0)).with_restaurant("meghana foods"),
        ]);
        let matcher = matcher(table);
        let scoped = matcher.lexical("chicken biryani", Some("meghana foods"));
        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped[0].nutrient_profile.map(|n| n.calories), Some(420.0));
        assert_eq!(matcher.lexical("chicken biryani", Some("empire")).len(), 3);
    }

    #[test]
    fn merge_keeps_max_and_prefers_lexical_on_ties() {
        let merged = merge_candidates(
            vec![cand("Veg Pulao", 70, MatchSource::Lexical), cand("Butter Naan", 40, MatchSource::Lexical)],
            vec![
                cand("Veg Pulao", 70, MatchSource::Semantic),
                cand("Butter Naan", 75, MatchSource::Semantic),
                cand("Masala Dosa", 70, MatchSource::Semantic),
            ],
        );
        let summary = merged
            .iter()
            .map(|c| (c.db_item.as_str(), c.score, c.source))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("Butter Naan", 75, MatchSource::Semantic),
                ("Veg Pulao", 70, MatchSource::Lexical),
                ("Masala Dosa", 70, MatchSource::Semantic),
            ]
        );
    }

    #[test]
    fn semantic_only_runs_below_trigger() {
        let table = Arc::new(sample_table());
        let vectors = WordVectors::from_entries([
            ("rice", vec![0.0, 1.0]),
            ("pulao", vec![0.1, 1.0]),
            ("chicken", vec![1.0, 0.0]),
            ("biryani", vec![0.2, 1.0]),
        ]);
        let index = SemanticIndex::build(Arc::new(vectors), &table);
        let matcher = ItemMatcher::new(Arc::clone(&table), &MatchingSettings::default());

        let strong = matcher.match_item("chicken biryani", None, Some(&index));
        assert!(strong.iter().all(|c| c.source == MatchSource::Lexical));

        let weak = matcher.match_item("rice", None, Some(&index));
        assert!(weak.iter().any(|c| c.source == MatchSource::Semantic));
        assert!(weak.windows(2).all(|pair| pair[0].score >= pair[1].score));

        assert!(matcher.match_item("rice", None, None).iter().all(|c| c.source == MatchSource::Lexical));
    }

    #[test]
    fn closest_food_lookup() {
        let matcher = matcher(sample_table());
        let naan = matcher.closest_food("Butter Naan (2 pcs)", 60).expect("naan");
        assert_eq!(naan.db_item, "Butter Naan");
        assert_eq!(naan.score, 100);

        let pulao = matcher.closest_food("Hyderabadi Dum Biryani", 70).expect("fallback");
        assert_eq!(pulao.db_item, "Veg Pulao");
        assert_eq!(pulao.score, 60);
        assert_eq!(pulao.source, MatchSource::Fallback);

        assert!(matcher.closest_food("xyz", 60).is_none());
        assert!(matcher.closest_food("!!", 60).is_none());
    }

    #[test]
    fn substring_hit_scores_85_when_fuzzy_is_lower() {
        let table = FoodTable::from_records(vec![FoodRecord::new("Dal", nutrients(120.0, 7.0, 18.0, 2.0, 4.0, 1.0))]);
        let found = matcher(table).closest_food("dal makhani tadka", 60).expect("dal");
        assert_eq!(found.score, 100);
        let table = FoodTable::from_records(vec![FoodRecord::new("Dal Makhani", nutrients(0.0, 0.0, 0.0, 0.0, 0.0, 0.0))]);
        let found = matcher(table).closest_food("makh", 60).expect("makhani");
        assert_eq!(found.score, SUBSTRING_SCORE);
    }
}
