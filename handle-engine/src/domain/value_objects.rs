//! # Handle Value Objects
//!
//! Type-safe identifiers and the pure functions the handle engine's
//! invariants are built on: case-folding, format validation, and
//! normalized-Levenshtein similarity (spec.md §4.4).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type-safe wrapper for handle identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for HandleId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<HandleId> for Uuid {
    fn from(id: HandleId) -> Self {
        id.0
    }
}

/// Case-folds a handle for lookups. Folding is lower-casing; display value
/// keeps the caller's original case.
pub fn fold(handle: &str) -> String {
    handle.to_lowercase()
}

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 30;
const SEPARATORS: [char; 3] = ['.', '-', '_'];

/// Validates a candidate handle against spec.md §4.4's format rules:
/// length in `[3, 30]`, first/last character alphanumeric, interior
/// characters alphanumeric or one of `{., -, _}`, and no run of two or
/// more consecutive separators.
pub fn is_valid_format(handle: &str) -> bool {
    let len = handle.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return false;
    }

    let chars: Vec<char> = handle.chars().collect();
    let first = chars[0];
    let last = chars[chars.len() - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }

    let mut prev_was_separator = false;
    for &c in &chars {
        let is_allowed = c.is_ascii_alphanumeric() || SEPARATORS.contains(&c);
        if !is_allowed {
            return false;
        }
        let is_separator = SEPARATORS.contains(&c);
        if is_separator && prev_was_separator {
            return false;
        }
        prev_was_separator = is_separator;
    }

    true
}

/// Levenshtein edit distance between two strings, counted over Unicode
/// scalar values.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (la, lb) = (a.len(), b.len());

    if la == 0 {
        return lb;
    }
    if lb == 0 {
        return la;
    }

    let mut prev: Vec<usize> = (0..=lb).collect();
    let mut curr = vec![0usize; lb + 1];

    for i in 1..=la {
        curr[0] = i;
        for j in 1..=lb {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[lb]
}

/// Normalized Levenshtein similarity, per spec.md §4.4:
/// `s = 1 − edit(a, b) / max(|a|, |b|)`.
///
/// Both inputs should already be case-folded by the caller; this function
/// does not fold.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (edit_distance(a, b) as f64 / max_len as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_lowercases() {
        assert_eq!(fold("ElonMusk"), "elonmusk");
    }

    #[test]
    fn test_valid_format_accepts_plain_alphanumeric() {
        assert!(is_valid_format("mariposa"));
        assert!(is_valid_format("abc"));
        assert!(is_valid_format(&"a".repeat(30)));
    }

    #[test]
    fn test_valid_format_rejects_too_short_or_long() {
        assert!(!is_valid_format("ab"));
        assert!(!is_valid_format(&"a".repeat(31)));
    }

    #[test]
    fn test_valid_format_rejects_leading_or_trailing_separator() {
        assert!(!is_valid_format("_mariposa"));
        assert!(!is_valid_format("mariposa_"));
        assert!(!is_valid_format(".mariposa."));
    }

    #[test]
    fn test_valid_format_rejects_consecutive_separators() {
        assert!(!is_valid_format("mari__posa"));
        assert!(!is_valid_format("mari.-posa"));
    }

    #[test]
    fn test_valid_format_accepts_single_separators() {
        assert!(is_valid_format("mari_posa"));
        assert!(is_valid_format("mari.posa-x"));
    }

    #[test]
    fn test_valid_format_rejects_disallowed_characters() {
        assert!(!is_valid_format("mari posa"));
        assert!(!is_valid_format("mari@posa"));
    }

    #[test]
    fn test_similarity_identical_strings_is_one() {
        assert_eq!(similarity("elonmusk", "elonmusk"), 1.0);
    }

    #[test]
    fn test_similarity_elonmusks_example_from_spec() {
        // spec.md §8 scenario 1: check("elonmusks") vs "elonmusk" -> s ≈ 1 - 1/9
        let s = similarity("elonmusks", "elonmusk");
        assert!((s - (1.0 - 1.0 / 9.0)).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_unrelated_strings_is_low() {
        let s = similarity("mariposa", "elonmusk");
        assert!(s < 0.5);
    }
}
