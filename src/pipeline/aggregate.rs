use serde::Serialize;

use crate::food_db::NutrientProfile;
use crate::pipeline::result::ResultRow;

/// Whole-number totals across all rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NutrientTotals {
    pub total_calories: i64,
    pub total_protein: i64,
    pub total_carbs: i64,
    pub total_fat: i64,
    pub total_fiber: i64,
    pub total_sugar: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub totals: NutrientTotals,
    pub insights: Vec<String>,
}

fn low_fiber(t: &NutrientTotals) -> bool {
    t.total_fiber < 30
}

fn low_protein(t: &NutrientTotals) -> bool {
    ((t.total_protein * 4) as f64 / t.total_calories.max(1) as f64) < 0.15
}

fn high_sugar(t: &NutrientTotals) -> bool {
    t.total_sugar > 200
}

type InsightRule = (fn(&NutrientTotals) -> bool, &'static str);

const INSIGHT_RULES: [InsightRule; 3] = [
    (low_fiber, "Your diet seems low in fiber. Add more vegetables/whole grains."),
    (low_protein, "Your protein intake is below recommended levels."),
    (high_sugar, "Your sugar intake is quite high. Consider reducing sugary drinks."),
];

fn round_total(value: f64) -> i64 {
    if value.is_finite() { value.round() as i64 } else { 0 }
}

pub fn aggregate(rows: &[ResultRow]) -> AggregateSummary {
    let sum = rows.iter().fold(NutrientProfile::default(), |acc, row| {
        let part = row.contribution();
        NutrientProfile {
            calories: acc.calories + part.calories,
            protein: acc.protein + part.protein,
            carbs: acc.carbs + part.carbs,
            fat: acc.fat + part.fat,
            fiber: acc.fiber + part.fiber,
            sugar: acc.sugar + part.sugar,
        }
    });
    let totals = NutrientTotals {
        total_calories: round_total(sum.calories),
        total_protein: round_total(sum.protein),
        total_carbs: round_total(sum.carbs),
        total_fat: round_total(sum.fat),
        total_fiber: round_total(sum.fiber),
        total_sugar: round_total(sum.sugar),
    };
    AggregateSummary {
        insights: insights(&totals),
        totals,
    }
}

pub fn insights(totals: &NutrientTotals) -> Vec<String> {
    INSIGHT_RULES
        .iter()
        .filter(|(applies, _)| applies(totals))
        .map(|(_, message)| message.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::nutrients;

    #[test]
    fn totals_are_rounded_sums_of_contributions() {
        let rows = vec![
            ResultRow::accepted("Chicken Biryani", 1.0, nutrients(290.4, 12.0, 35.0, 11.0, 1.5, 2.0), 100, 0.9),
            ResultRow::accepted("Butter Naan", 1.5, nutrients(300.0, 8.0, 45.0, 10.0, 2.0, 4.0), 92, 0.8),
            ResultRow::pass_through("jeera aloo", 3.0, 40, 0.6),
        ];
        let summary = aggregate(&rows);
        assert_eq!(
            summary.totals,
            NutrientTotals {
                total_calories: 740,
                total_protein: 24,
                total_carbs: 103,
                total_fat: 26,
                total_fiber: 5,
                total_sugar: 8,
            }
        );
    }

    #[test]
    fn all_rules_fire_in_order() {
        let totals = NutrientTotals {
            total_calories: 2000,
            total_protein: 40,
            total_fiber: 10,
            total_sugar: 250,
            ..NutrientTotals::default()
        };
        let messages = insights(&totals);
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("fiber"));
        assert!(messages[1].contains("protein"));
        assert!(messages[2].contains("sugar"));
    }

    #[test]
    fn no_insights_when_balanced() {
        let totals = NutrientTotals {
            total_calories: 2000,
            total_protein: 100,
            total_fiber: 35,
            total_sugar: 50,
            ..NutrientTotals::default()
        };
        assert!(insights(&totals).is_empty());
    }

    #[test]
    fn empty_input_reports_low_fiber_and_protein() {
        let summary = aggregate(&[]);
        assert_eq!(summary.totals, NutrientTotals::default());
        assert_eq!(summary.insights.len(), 2);
    }
}
