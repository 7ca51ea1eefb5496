//! Text rules shared by the line filter, restaurant detection and quantity
//! parsing. All vocabularies come from `[vocabulary]` in the settings.

use regex::Regex;

use crate::error::ScanError;
use crate::settings::Vocabulary;

pub(crate) fn is_devanagari(ch: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&ch)
}

/// Compiled form of the vocabulary tables.
#[derive(Debug, Clone)]
pub struct TextRules {
    noise: Option<Regex>,
    food_triggers: Vec<String>,
    phrase_fixes: Vec<(String, String)>,
    word_fixes: Vec<(String, String)>,
}

impl TextRules {
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, ScanError> {
        let words = vocabulary
            .noise_words
            .iter()
            .map(|word| word.trim())
            .filter(|word| !word.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>();
        let noise = if words.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
            Some(
                Regex::new(&pattern)
                    .map_err(|err| ScanError::Settings(format!("invalid noise vocabulary: {}", err)))?,
            )
        };

        let mut phrase_fixes = Vec::new();
        let mut word_fixes = Vec::new();
        for (from, to) in &vocabulary.spell_fixes {
            let from = from.trim().to_lowercase();
            if from.is_empty() {
                continue;
            }
            if from.contains(char::is_whitespace) {
                phrase_fixes.push((from, to.trim().to_lowercase()));
            } else {
                word_fixes.push((from, to.trim().to_lowercase()));
            }
        }
        // Longer phrases first so "chicken birya ni" beats "birya ni".
        phrase_fixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            noise,
            food_triggers: vocabulary
                .food_triggers
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
            phrase_fixes,
            word_fixes,
        })
    }

    pub fn is_noise(&self, text: &str) -> bool {
        self.noise.as_ref().is_some_and(|noise| noise.is_match(text))
    }

    /// 1-6 characters with nothing alphanumeric, e.g. `~~`, `|:`, `•`.
    pub fn is_garble(&self, text: &str) -> bool {
        let count = text.chars().count();
        (1..=6).contains(&count) && !text.chars().any(|ch| ch.is_ascii_alphanumeric())
    }

    pub fn has_food_trigger(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.food_triggers.iter().any(|term| lower.contains(term.as_str()))
    }

    pub fn is_food_trigger(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        self.food_triggers.iter().any(|term| *term == lower)
    }

    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase().replace("@ x", "x ").replace('@', " ");
        let kept = lowered
            .chars()
            .map(|ch| {
                let keep = ch.is_ascii_digit()
                    || ch.is_ascii_lowercase()
                    || is_devanagari(ch)
                    || matches!(ch, '(' | ')' | '.' | '-' | '×')
                    || ch.is_whitespace();
                if keep { ch } else { ' ' }
            })
            .collect::<String>();
        let mut collapsed = collapse_whitespace(&kept);

        for (from, to) in &self.phrase_fixes {
            let padded = format!(" {} ", collapsed);
            let replaced = padded.replace(&format!(" {} ", from), &format!(" {} ", to));
            collapsed = replaced.trim().to_string();
        }

        collapsed
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(|word| {
                self.word_fixes
                    .iter()
                    .find(|(from, _)| from == word)
                    .map(|(_, to)| to.as_str())
                    .unwrap_or(word)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Share of whitespace tokens containing a Latin or Devanagari letter.
pub fn alpha_token_ratio(text: &str) -> f64 {
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    if tokens.is_empty() {
        return 0.0;
    }
    let alpha = tokens
        .iter()
        .filter(|token| token.chars().any(|ch| ch.is_ascii_alphabetic() || is_devanagari(ch)))
        .count();
    alpha as f64 / tokens.len() as f64
}

/// Share of whitespace tokens containing a digit.
pub fn numeric_token_ratio(text: &str) -> f64 {
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    if tokens.is_empty() {
        return 0.0;
    }
    let numeric = tokens
        .iter()
        .filter(|token| token.chars().any(|ch| ch.is_ascii_digit()))
        .count();
    numeric as f64 / tokens.len() as f64
}

pub fn has_currency_symbol(text: &str) -> bool {
    text.chars().any(|ch| matches!(ch, '₹' | '$' | '€' | '£'))
}
