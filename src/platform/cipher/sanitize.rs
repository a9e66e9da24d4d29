//! Rewrites regex syntax the embedded engine rejects

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Lookaround, named and atomic group openers
static UNSUPPORTED_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\?(?:=|!|<=|<!|<[A-Za-z_$][A-Za-z0-9_$]*>|>)").expect("valid group regex")
});

/// Degrade unsupported group openers to plain `(`.
///
/// Runs until nothing matches, so sanitizing already-sanitized text returns it
/// unchanged.
pub fn sanitize(program: &str) -> Cow<'_, str> {
    if !UNSUPPORTED_GROUP.is_match(program) {
        return Cow::Borrowed(program);
    }
    let mut current = program.to_string();
    while UNSUPPORTED_GROUP.is_match(&current) {
        current = UNSUPPORTED_GROUP.replace_all(&current, "(").into_owned();
    }
    Cow::Owned(current)
}
