use tracing::debug;

use crate::ocr::RawLine;
use crate::pipeline::normalize::TextRules;

/// Picks the restaurant name from the header of a receipt: the first
/// plausible line among the first `scan_lines`.
pub fn detect_restaurant(lines: &[RawLine], rules: &TextRules, scan_lines: usize) -> Option<String> {
    for line in lines.iter().take(scan_lines) {
        let text = line.text.trim();
        if text.is_empty() {
            continue;
        }
        if text.chars().filter(|ch| ch.is_ascii_digit()).count() > 3 {
            continue;
        }
        if text.chars().count() < 3 {
            continue;
        }
        if rules.is_noise(text) {
            continue;
        }
        let name = rules.normalize(text);
        debug!("restaurant candidate {:?}", name);
        return Some(name);
    }
    None
}
