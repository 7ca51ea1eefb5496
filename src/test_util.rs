use crate::food_db::{FoodRecord, FoodTable, NutrientProfile};
use crate::ocr::{RawLine, Token};

/// A line whose words sit 10px per character apart, starting at x=10.
pub(crate) fn line(text: &str, top: u32) -> RawLine {
    let mut left = 10;
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        words.push((word, left));
        left += 10 * word.chars().count() as u32 + 10;
    }
    line_from(&words, top)
}

pub(crate) fn line_from(words: &[(&str, u32)], top: u32) -> RawLine {
    let tokens = words
        .iter()
        .map(|(text, left)| Token {
            text: text.to_string(),
            left: *left,
            top,
            width: 10 * text.chars().count() as u32,
            height: 14,
            confidence: 90.0,
        })
        .collect::<Vec<_>>();
    RawLine::from_tokens(tokens).unwrap_or_else(|| RawLine {
        text: String::new(),
        left: 0,
        right: 0,
        top,
        bottom: top,
        tokens: Vec::new(),
        conf: 0.0,
    })
}

pub(crate) fn with_confidence(mut line: RawLine, confidence: f32) -> RawLine {
    for token in &mut line.tokens {
        token.confidence = confidence;
    }
    line
}

pub(crate) fn nutrients(calories: f64, protein: f64, carbs: f64, fat: f64, fiber: f64, sugar: f64) -> NutrientProfile {
    NutrientProfile {
        calories,
        protein,
        carbs,
        fat,
        fiber,
        sugar,
    }
}

pub(crate) fn sample_table() -> FoodTable {
    FoodTable::from_records(vec![
        FoodRecord::new("Chicken Biryani", nutrients(290.0, 12.0, 35.0, 11.0, 1.5, 2.0)),
        FoodRecord::new("Paneer Tikka", nutrients(260.0, 14.0, 8.0, 19.0, 1.0, 3.0)),
        FoodRecord::new("Butter Naan", nutrients(300.0, 8.0, 45.0, 10.0, 2.0, 4.0)),
        FoodRecord::new("Veg Pulao", nutrients(210.0, 4.0, 38.0, 5.0, 2.5, 1.0)),
        FoodRecord::new("Masala Dosa", nutrients(170.0, 4.0, 27.0, 6.0, 2.0, 1.0)),
        FoodRecord::new("Gulab Jamun", nutrients(150.0, 2.0, 25.0, 5.0, 0.2, 20.0)),
    ])
}
