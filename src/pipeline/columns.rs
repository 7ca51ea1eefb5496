use std::collections::BTreeMap;

use crate::ocr::{RawLine, Token};

/// Leading currency symbol, then a digit.
pub(crate) fn looks_like_price(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some('₹' | '€' | '$' | '£') => chars.next().is_some_and(|ch| ch.is_ascii_digit()),
        Some(ch) => ch.is_ascii_digit(),
        None => false,
    }
}

/// Right-edge x coordinates of price/quantity columns on the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericColumns {
    edges: Vec<u32>,
    tolerance: u32,
}

impl NumericColumns {
    /// Counts, per right edge, the lines that end with a numeric token.
    pub fn detect(lines: &[RawLine], min_count: usize, tolerance: u32) -> Self {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for line in lines {
            let Some(last) = line.last_token() else {
                continue;
            };
            let entry = counts.entry(last.right()).or_default();
            if looks_like_price(&last.text) {
                *entry += 1;
            }
        }
        let min_count = min_count.max(1);
        Self {
            edges: counts
                .into_iter()
                .filter(|(_, count)| *count >= min_count)
                .map(|(edge, _)| edge)
                .collect(),
            tolerance,
        }
    }

    pub fn edges(&self) -> &[u32] {
        &self.edges
    }

    pub fn contains(&self, right: u32) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.abs_diff(right) <= self.tolerance)
    }

    fn is_column_token(&self, token: &Token) -> bool {
        self.contains(token.right())
    }

    /// Line text with column tokens removed. Lines without token geometry
    /// keep their raw text.
    pub fn strip(&self, line: &RawLine) -> String {
        if line.tokens.is_empty() {
            return line.text.trim().to_string();
        }
        line.tokens
            .iter()
            .filter(|token| !self.is_column_token(token))
            .map(|token| token.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::line_from;

    #[test]
    fn price_shapes() {
        assert!(looks_like_price("240"));
        assert!(looks_like_price("₹240.00"));
        assert!(looks_like_price("$9"));
        assert!(!looks_like_price("₹"));
        assert!(!looks_like_price("Rs240"));
        assert!(!looks_like_price(""));
    }

    #[test]
    fn trailing_prices_form_a_column_and_are_stripped() {
        let lines = vec![
            line_from(&[("Paneer", 10), ("Tikka", 80), ("₹240", 400)], 10),
            line_from(&[("Butter", 10), ("Naan", 80), ("40", 400)], 30),
            line_from(&[("Thanks", 10)], 50),
        ];
        let columns = NumericColumns::detect(&lines, 1, 0);
        assert_eq!(columns.edges().len(), 2);
        assert_eq!(columns.strip(&lines[0]), "Paneer Tikka");
        assert_eq!(columns.strip(&lines[1]), "Butter Naan");
        assert_eq!(columns.strip(&lines[2]), "Thanks");
    }

    #[test]
    fn min_count_and_tolerance() {
        let lines = vec![
            line_from(&[("Dosa", 10), ("60", 300)], 10),
            line_from(&[("Idli", 10), ("45", 302)], 30),
        ];
        let strict = NumericColumns::detect(&lines, 2, 0);
        assert!(strict.edges().is_empty());
        let loose = NumericColumns::detect(&lines, 1, 3);
        assert!(loose.contains(321));
        assert!(!loose.contains(330));
        assert_eq!(loose.strip(&lines[1]), "Idli");
    }

    #[test]
    fn tokenless_lines_keep_raw_text() {
        let line = RawLine {
            text: " Veg Thali ".to_string(),
            left: 0,
            right: 0,
            top: 0,
            bottom: 0,
            tokens: Vec::new(),
            conf: 0.0,
        };
        assert_eq!(NumericColumns::default().strip(&line), "Veg Thali");
    }
}
