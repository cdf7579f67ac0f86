//! Full-text tokenization shared by index and query.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid token regex"));

/// Splits text on anything that is not a letter or digit and lowercases.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|token| token.as_str().to_lowercase())
        .collect()
}
