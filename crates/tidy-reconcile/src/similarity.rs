//! Fuzzy similarity between two free-text task descriptions.
//!
//! The score blends a character-level alignment ratio (Sørensen–Dice over
//! character bigrams) with the Jaccard overlap of the descriptions' keyword
//! sets. Both parts are symmetric, so the blend is too.

use std::collections::BTreeSet;

const ALIGNMENT_WEIGHT: f64 = 0.7;
const KEYWORD_WEIGHT: f64 = 0.3;

pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from",
];

/// Scores how alike two descriptions are, in `[0, 1]`.
///
/// Empty input (after trimming) scores 1.0 against empty input and 0.0 against
/// anything else. Descriptions that are identical once lower-cased score
/// exactly 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = a.trim().to_lowercase();
    let right = b.trim().to_lowercase();

    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }
    if left == right {
        return 1.0;
    }

    let alignment = bigram_dice(&left, &right);
    let left_keywords = keywords(&left);
    let right_keywords = keywords(&right);
    if left_keywords.is_empty() || right_keywords.is_empty() {
        return alignment.clamp(0.0, 1.0);
    }

    let shared = left_keywords.intersection(&right_keywords).count();
    let union = left_keywords.union(&right_keywords).count();
    let overlap = shared as f64 / union as f64;

    (ALIGNMENT_WEIGHT * alignment + KEYWORD_WEIGHT * overlap).clamp(0.0, 1.0)
}

/// Sørensen–Dice over character bigrams, whitespace ignored.
///
/// `strsim::sorensen_dice` counts bigrams per `char` but normalizes by byte
/// length, which penalizes non-ASCII text. Its shared-bigram count is recovered
/// and renormalized by `char` count.
fn bigram_dice(left: &str, right: &str) -> f64 {
    let byte_dice = strsim::sorensen_dice(left, right);
    if byte_dice >= 1.0 {
        return 1.0;
    }
    let (left_bytes, left_chars) = stripped_lengths(left);
    let (right_bytes, right_chars) = stripped_lengths(right);
    if left_chars < 2 || right_chars < 2 {
        return 0.0;
    }

    let shared = (byte_dice * (left_bytes + right_bytes - 2) as f64 / 2.0).round();
    (2.0 * shared / (left_chars + right_chars - 2) as f64).clamp(0.0, 1.0)
}

/// Byte and `char` lengths of `text` with whitespace removed.
fn stripped_lengths(text: &str) -> (usize, usize) {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .fold((0, 0), |(bytes, chars), ch| (bytes + ch.len_utf8(), chars + 1))
}

/// Lower-cased whitespace tokens with edge punctuation and stop words removed.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_matches(|ch: char| !ch.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty() && !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// Highest score of `description` against any of `candidates`; 0.0 when there
/// are none.
pub fn best_similarity<S: AsRef<str>>(description: &str, candidates: &[S]) -> f64 {
    candidates
        .iter()
        .map(|candidate| similarity(description, candidate.as_ref()))
        .fold(0.0, f64::max)
}
