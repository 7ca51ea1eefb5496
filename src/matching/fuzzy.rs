//! Token-set similarity on an indel (insert/delete only) edit distance,
//! scored 0-100.

use std::collections::BTreeSet;

/// Lowercase; every non-alphanumeric character becomes a space; trim.
pub fn process(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .trim()
        .to_string()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut row = vec![0usize; b.len() + 1];
    for ca in a {
        let mut diag = 0;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { above.max(row[j]) };
            diag = above;
        }
    }
    row[b.len()]
}

pub fn indel_distance(a: &str, b: &str) -> usize {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    a.len() + b.len() - 2 * lcs_len(&a, &b)
}

fn norm_similarity(distance: usize, len_sum: usize) -> f64 {
    if len_sum == 0 {
        return 100.0;
    }
    100.0 - 100.0 * distance as f64 / len_sum as f64
}

/// Similarity in 0..=100 over already processed strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let len_sum = a.chars().count() + b.chars().count();
    norm_similarity(indel_distance(a, b), len_sum)
}

/// Compares the shared tokens and the leftovers of each side, so word order
/// and extra words on one side do not hurt.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = a.split_whitespace().collect::<BTreeSet<_>>();
    let tokens_b = b.split_whitespace().collect::<BTreeSet<_>>();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersect = tokens_a.intersection(&tokens_b).copied().collect::<Vec<_>>();
    let diff_ab = tokens_a.difference(&tokens_b).copied().collect::<Vec<_>>();
    let diff_ba = tokens_b.difference(&tokens_a).copied().collect::<Vec<_>>();

    // One side is a subset of the other.
    if !intersect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = diff_ab_joined.chars().count();
    let ba_len = diff_ba_joined.chars().count();
    let sect_len = intersect.join(" ").chars().count();
    let sep = usize::from(sect_len != 0);

    let sect_ab_len = sect_len + sep + ab_len;
    let sect_ba_len = sect_len + sep + ba_len;

    let result = norm_similarity(
        indel_distance(&diff_ab_joined, &diff_ba_joined),
        sect_ab_len + sect_ba_len,
    );
    if sect_len == 0 {
        return result;
    }

    // `sect` vs `sect + diff` differ only by the appended diff.
    let sect_ab_ratio = norm_similarity(sep + ab_len, sect_len + sect_ab_len);
    let sect_ba_ratio = norm_similarity(sep + ba_len, sect_len + sect_ba_len);
    result.max(sect_ab_ratio).max(sect_ba_ratio)
}

/// `token_set_ratio` after processing both sides, truncated to an integer.
pub fn score(query: &str, choice: &str) -> u32 {
    token_set_ratio(&process(query), &process(choice)).max(0.0) as u32
}

/// Best `limit` choices by score, ties in input order. Returns
/// `(index into choices, score)`.
pub fn extract<'a, I>(query: &str, choices: I, limit: usize) -> Vec<(usize, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let processed_query = process(query);
    if processed_query.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut scored = choices
        .into_iter()
        .enumerate()
        .map(|(idx, choice)| {
            let value = token_set_ratio(&processed_query, &process(choice)).max(0.0) as u32;
            (idx, value)
        })
        .collect::<Vec<_>>();
    // Stable sort keeps input order among equal scores.
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_strips_punctuation() {
        assert_eq!(process("  Paneer-Tikka (Dry)! "), "paneer tikka  dry");
        assert_eq!(process("---"), "");
    }

    #[test]
    fn indel_counts_inserts_and_deletes() {
        assert_eq!(indel_distance("naan", "nan"), 1);
        assert_eq!(indel_distance("abc", "acb"), 2);
        assert_eq!(indel_distance("", "dal"), 3);
        assert_eq!(ratio("naan", "nan"), 100.0 - 100.0 / 7.0);
    }

    #[test]
    fn subset_scores_full_marks() {
        assert_eq!(score("chicken biryani", "Chicken Biryani"), 100);
        assert_eq!(score("biryani chicken", "Chicken Biryani (Full)"), 100);
        assert_eq!(score("", "Chicken Biryani"), 0);
    }

    #[test]
    fn partial_overlap() {
        // sect "biryani" (7); diffs "chicken" / "veg"
        // diff ratio: 100 - 100 * indel("chicken","veg") / (15 + 11)
        // sect ratios: 100 - 100*8/22, 100 - 100*4/18
        let value = token_set_ratio("chicken biryani", "biryani veg");
        assert!((value - (100.0 - 400.0 / 18.0)).abs() < 1e-9);
        assert_eq!(score("chicken biryani", "veg biryani"), 77);
    }

    #[test]
    fn disjoint_tokens_use_the_plain_ratio() {
        assert_eq!(token_set_ratio("naan", "nan"), ratio("naan", "nan"));
        assert_eq!(score("masala dosa", "gulab jamun"), score("gulab jamun", "masala dosa"));
    }

    #[test]
    fn extract_orders_by_score_then_index() {
        let choices = ["Veg Pulao", "Chicken Biryani", "Egg Biryani", "Chicken Biryani Family Pack"];
        let hits = extract("chicken biryani", choices.iter().copied(), 3);
        assert_eq!(hits[0], (1, 100));
        assert_eq!(hits[1], (3, 100));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[2].0, 2);
    }
}
