use std::sync::OnceLock;

use regex::Regex;

use crate::pipeline::normalize::collapse_whitespace;
use crate::settings::PortionTrigger;

/// Quantity prefixes, highest priority first: `2x naan`, `2. naan` /
/// `2) naan` / `2- naan` / `2: naan`, `2 naan`. Each may open with `(`.
fn quantity_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^\(?\s*(\d+)\s*x\b\s*(.*)$").expect("times quantity regex"),
            Regex::new(r"^\(?\s*(\d+)\s*[.\-:)]\s*(.*)$").expect("numbered quantity regex"),
            Regex::new(r"^\(?\s*(\d+)\s+([a-z\x{0900}-\x{097F}].*)$").expect("leading quantity regex"),
        ]
    })
}

/// Undo common OCR confusions for the multiplication sign.
fn prepare(text: &str) -> String {
    let lowered = format!(" {} ", text.trim().to_lowercase())
        .replace(" i ", " x ")
        .replace(" l ", " x ")
        .replace('×', "x");
    collapse_whitespace(&lowered)
}

pub fn has_quantity_marker(text: &str) -> bool {
    let prepared = prepare(text);
    quantity_patterns().iter().any(|pattern| pattern.is_match(&prepared))
}

/// Splits a leading quantity from the item text. Without a marker the
/// quantity is 1 and the whole (prepared) text is the item.
pub fn parse_quantity(text: &str) -> (u32, String) {
    let prepared = prepare(text);
    for pattern in quantity_patterns() {
        let Some(caps) = pattern.captures(&prepared) else {
            continue;
        };
        let Some(qty) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let rest = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .trim()
            .trim_start_matches(')')
            .trim();
        let residual = if rest.is_empty() { prepared.clone() } else { rest.to_string() };
        return (qty, residual);
    }
    (1, prepared)
}

/// Serving-size scalar from the first configured keyword found in `text`.
pub fn portion_multiplier(text: &str, portions: &[PortionTrigger]) -> f64 {
    let lower = text.to_lowercase();
    portions
        .iter()
        .find(|portion| !portion.keyword.is_empty() && lower.contains(&portion.keyword.to_lowercase()))
        .map(|portion| portion.multiplier)
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn leading_quantities() {
        assert_eq!(parse_quantity("1x Chicken Biryani"), (1, "chicken biryani".to_string()));
        assert_eq!(parse_quantity("(2) Paneer Tikka"), (2, "paneer tikka".to_string()));
        assert_eq!(parse_quantity("(3x) butter naan"), (3, "butter naan".to_string()));
        assert_eq!(parse_quantity("2 × Masala Dosa"), (2, "masala dosa".to_string()));
        assert_eq!(parse_quantity("4 i idli"), (4, "idli".to_string()));
        assert_eq!(parse_quantity("2. veg pulao"), (2, "veg pulao".to_string()));
        assert_eq!(parse_quantity("3 samosa"), (3, "samosa".to_string()));
    }

    #[test]
    fn no_marker_means_one() {
        assert_eq!(parse_quantity("Mini Biryani"), (1, "mini biryani".to_string()));
        assert_eq!(parse_quantity("chicken 65"), (1, "chicken 65".to_string()));
        assert_eq!(parse_quantity(""), (1, String::new()));
    }

    #[test]
    fn empty_residual_keeps_text() {
        assert_eq!(parse_quantity("2 x"), (2, "2 x".to_string()));
    }

    #[test]
    fn markers() {
        assert!(has_quantity_marker("1x naan"));
        assert!(has_quantity_marker("(1) naan"));
        assert!(has_quantity_marker("1 paneer"));
        assert!(!has_quantity_marker("paneer 1"));
        assert!(!has_quantity_marker("65 %"));
    }

    #[test]
    fn portions_follow_configured_order() {
        let portions = Settings::default().vocabulary.portions;
        assert_eq!(portion_multiplier("mini biryani", &portions), 0.6);
        assert_eq!(portion_multiplier("Large Fries", &portions), 1.5);
        assert_eq!(portion_multiplier("chicken bucket serves 2", &portions), 2.0);
        assert_eq!(portion_multiplier("veg thali", &portions), 1.0);
    }
}
