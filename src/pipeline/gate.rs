use tracing::debug;

use crate::pipeline::result::{MappedItem, ResultRow};

/// Auto-accept rule: the top candidate's score and the line's acceptance
/// probability must both clear their minimums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    pub min_score: u32,
    pub min_probability: f64,
}

impl ConfidenceGate {
    pub fn new(min_score: u32, min_probability: f64) -> Self {
        Self {
            min_score,
            min_probability,
        }
    }

    pub fn decide(&self, item: &MappedItem) -> ResultRow {
        let servings = item.servings();
        let probability = item.acceptance_probability;
        if let Some(best) = item.best() {
            if best.score >= self.min_score && probability >= self.min_probability {
                if let Some(nutrients) = best.nutrient_profile {
                    return ResultRow::accepted(&best.db_item, servings, nutrients, best.score, probability);
                }
            }
            debug!(
                "not accepted: {:?} score={} probability={:.2}",
                item.extracted_text, best.score, probability
            );
        }
        ResultRow::pass_through(&item.extracted_text, servings, item.best_score, probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchCandidate, MatchSource};
    use crate::test_util::nutrients;

    fn mapped(score: u32, probability: f64) -> MappedItem {
        MappedItem {
            raw_text: "2x Large Paneer Tikka".to_string(),
            extracted_text: "large paneer tikka".to_string(),
            quantity: 2,
            explicit_quantity: true,
            portion_multiplier: 1.5,
            best_match: Some("Paneer Tikka".to_string()),
            best_score: score,
            candidates: vec![MatchCandidate {
                db_item: "Paneer Tikka".to_string(),
                score,
                nutrient_profile: Some(nutrients(260.0, 14.0, 8.0, 19.0, 1.0, 3.0)),
                source: MatchSource::Lexical,
            }],
            acceptance_probability: probability,
        }
    }

    #[test]
    fn confident_match_is_populated() {
        let row = ConfidenceGate::new(90, 0.75).decide(&mapped(95, 0.8));
        assert!(row.accepted);
        assert_eq!(row.item, "Paneer Tikka");
        assert_eq!(row.quantity, 3.0);
        assert_eq!(row.calories, 260.0);
        assert_eq!(row.contribution().calories, 780.0);
    }

    #[test]
    fn low_score_passes_through() {
        let row = ConfidenceGate::new(90, 0.75).decide(&mapped(70, 0.8));
        assert!(!row.accepted);
        assert_eq!(row.item, "large paneer tikka");
        assert_eq!(row.confidence, 70);
        assert_eq!(row.calories, 0.0);
    }

    #[test]
    fn default_probability_never_auto_accepts() {
        assert!(!ConfidenceGate::new(90, 0.75).decide(&mapped(100, 0.6)).accepted);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(ConfidenceGate::new(95, 0.8).decide(&mapped(95, 0.8)).accepted);
    }

    #[test]
    fn no_candidates_scores_zero() {
        let mut item = mapped(0, 0.9);
        item.candidates.clear();
        item.best_match = None;
        let row = ConfidenceGate::new(90, 0.75).decide(&item);
        assert_eq!(row.confidence, 0);
        assert!(!row.accepted);
    }
}
