//! Keyword-driven last resort when nothing structural worked

use crate::error::CipherError;
use crate::Result;
use regex::Regex;
use std::sync::LazyLock;

/// `splice(X, N)` or `splice(N)`; the offset is the last numeric argument
static SPLICE_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"splice\(\s*(?:\d+\s*,\s*)?(\d+)\s*\)").expect("valid splice regex")
});

const FALLBACK_OFFSETS: std::ops::RangeInclusive<usize> = 1..=10;

/// Guess the signature from keywords in `script`.
///
/// Low confidence: the result is never structurally verified.
pub fn guess(script: &str, signature: &str) -> Result<String> {
    let chars: Vec<char> = signature.chars().collect();

    if script.contains("reverse") && script.contains("join") {
        return Ok(chars.iter().rev().collect());
    }

    if script.contains("splice") {
        let literal = SPLICE_OFFSET
            .captures_iter(script)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .find(|&n| n < chars.len());
        let offset = literal.or_else(|| FALLBACK_OFFSETS.clone().find(|&n| n < chars.len()));
        if let Some(offset) = offset {
            return Ok(chars[offset..].iter().collect());
        }
    }

    Err(CipherError::NotFound(
        "no heuristic keyword pattern matched".into(),
    ))
}
