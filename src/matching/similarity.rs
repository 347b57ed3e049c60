//! Bounded-cost string similarity for the fuzzy matching tier
//!
//! Scores are in [0, 1]. Cost is bounded by two guards: a 3x length-ratio
//! fast reject, and a switch from the exact sequence ratio to a cheap
//! character-overlap estimate once either string exceeds a short-length
//! threshold. The fallback full-scan tier calls this for every candidate, so
//! the guards matter more than precision on long names.

use std::collections::HashSet;

/// Strings at or under this many characters use the exact sequence ratio.
const SHORT_LEN: usize = 20;

/// Similarity score between two strings in [0, 1].
///
/// Equal strings score 1.0, either empty scores 0. When the longer string is
/// more than 3x the shorter's length the score is 0 without further work.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (min_len, max_len) = if a_chars.len() < b_chars.len() {
        (a_chars.len(), b_chars.len())
    } else {
        (b_chars.len(), a_chars.len())
    };
    if max_len > 3 * min_len {
        return 0.0;
    }

    if max_len <= SHORT_LEN {
        sequence_ratio(&a_chars, &b_chars)
    } else {
        char_overlap_ratio(&a_chars, &b_chars)
    }
}

/// Standard sequence-similarity ratio: 2 x matched / total, where matched is
/// the summed length of the longest matching blocks (longest common
/// substring, recursing on both sides).
fn sequence_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_len(a, b);
    2.0 * matched as f64 / total as f64
}

fn matching_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Longest common substring via DP over suffix lengths
    let mut best_len = 0usize;
    let mut best_a_end = 0usize;
    let mut best_b_end = 0usize;
    let mut prev = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best_len {
                    best_len = row[j + 1];
                    best_a_end = i + 1;
                    best_b_end = j + 1;
                }
            }
        }
        prev = row;
    }

    if best_len == 0 {
        return 0;
    }

    best_len
        + matching_len(&a[..best_a_end - best_len], &b[..best_b_end - best_len])
        + matching_len(&a[best_a_end..], &b[best_b_end..])
}

/// Jaccard estimate over unique characters, O(n) approximation for long
/// strings.
fn char_overlap_ratio(a: &[char], b: &[char]) -> f64 {
    let set_a: HashSet<char> = a.iter().copied().collect();
    let set_b: HashSet<char> = b.iter().copied().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}
