//! Deterministic gate deciding whether a generated rewrite is worth showing.
//!
//! Every check is driven by the word diff between the original line and the
//! rewrite. A rejected rewrite is an expected outcome, reported as a
//! [`Rejection`] value rather than an error.

use crate::diff::{changed_char_count, diff_words, DiffKind};

/// Thresholds for [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceLimits {
    /// Changed non-whitespace characters tolerated before the per-word
    /// compatibility check kicks in.
    pub max_char_delta: usize,
    /// Upper bound (inclusive) for `len(rewrite) / len(original)`.
    pub max_ratio: f64,
    /// Lower bound (inclusive) for `len(rewrite) / len(original)`.
    pub min_ratio: f64,
}

impl Default for AcceptanceLimits {
    fn default() -> Self {
        Self { max_char_delta: 480, max_ratio: 3.2, min_ratio: 0.25 }
    }
}

/// Why a rewrite was turned down.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Blank, or the same as the original ignoring case.
    NoOp,
    /// Only whitespace or punctuation moved.
    WhitespaceOnly,
    /// Length ratio outside the configured bounds.
    LengthRatio(f64),
    /// Too many changed characters and at least one word pair too far apart.
    Incompatible { changed_chars: usize },
    /// At most two characters changed while the length barely moved.
    Degenerate,
}

/// Shorthand for `evaluate(..).is_ok()`.
pub fn is_acceptable(original: &str, rewrite: &str, limits: &AcceptanceLimits) -> bool {
    evaluate(original, rewrite, limits).is_ok()
}

/// Runs every acceptance check and returns the changed-character count on success.
///
/// # Errors
///
/// Returns the first [`Rejection`] that applies.
pub fn evaluate(original: &str, rewrite: &str, limits: &AcceptanceLimits) -> Result<usize, Rejection> {
    let original = original.trim();
    let rewrite = rewrite.trim();

    if rewrite.is_empty() || rewrite.to_lowercase() == original.to_lowercase() {
        return Err(Rejection::NoOp);
    }

    let diff = diff_words(original, rewrite);
    let substantive = diff
        .iter()
        .any(|t| t.kind != DiffKind::Equal && t.value.chars().any(char::is_alphanumeric));
    if !substantive {
        return Err(Rejection::WhitespaceOnly);
    }

    let ratio = length_ratio(original, rewrite);
    if ratio < limits.min_ratio || ratio > limits.max_ratio {
        return Err(Rejection::LengthRatio(ratio));
    }

    let changed_chars = changed_char_count(&diff);
    if changed_chars > limits.max_char_delta && !words_compatible(original, rewrite) {
        return Err(Rejection::Incompatible { changed_chars });
    }

    if changed_chars <= 2 && (ratio - 1.0).abs() <= 0.05 {
        return Err(Rejection::Degenerate);
    }

    Ok(changed_chars)
}

/// Ratio of whitespace-collapsed character lengths; empty strings count as 1.
pub fn length_ratio(original: &str, rewrite: &str) -> f64 {
    let original_len = collapsed_len(original).max(1);
    let rewrite_len = collapsed_len(rewrite).max(1);
    rewrite_len as f64 / original_len as f64
}

fn collapsed_len(text: &str) -> usize {
    let mut len = 0;
    let mut in_ws = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                len += 1;
            }
            in_ws = true;
        } else {
            len += 1;
            in_ws = false;
        }
    }
    len
}

/// Compares words position by position up to the shorter word count.
/// A differing pair must be within `max(2, ceil(0.6 * longer_len))` edits.
fn words_compatible(original: &str, rewrite: &str) -> bool {
    original
        .split_whitespace()
        .zip(rewrite.split_whitespace())
        .all(|(a, b)| {
            let a: Vec<char> = a.to_lowercase().chars().collect();
            let b: Vec<char> = b.to_lowercase().chars().collect();
            if a == b {
                return true;
            }
            let longer = a.len().max(b.len());
            let threshold = 2.max((longer * 3).div_ceil(5));
            edit_distance(&a, &b) <= threshold
        })
}

/// Levenshtein distance with unit costs.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j]
            } else {
                1 + prev[j].min(prev[j + 1]).min(row[j])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}
