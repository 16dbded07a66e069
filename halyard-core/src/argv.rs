// ABOUTME: Minimal argv-style tokenizer for chat message bodies
// ABOUTME: Splits on whitespace while keeping single/double quoted runs intact

use once_cell::sync::Lazy;
use regex::Regex;

/// Quoted runs first so they win over the bare `\S+` alternative.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'[^']*'|"[^"]*"|\S+"#).expect("Failed to compile token regex"));

/// Split `input` into an argv-like list of tokens.
///
/// A token is either a run of non-whitespace characters or the contents of a
/// single- or double-quoted run with the quotes removed. Escapes and nested
/// quoting are not supported. Leading and trailing whitespace is ignored.
///
/// Unterminated quotes are not an error: the dangling quote simply becomes
/// part of a bare token (`a 'b` yields `["a", "'b"]`).
pub fn tokenize(input: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(input.trim())
        .map(|m| strip_quotes(m.as_str()).to_string())
        .collect()
}

/// Trim one quote from each end when the token both opens and closes with
/// it. A lone quote character trims to the empty string.
fn strip_quotes(token: &str) -> &str {
    for quote in ['\'', '"'] {
        if token.starts_with(quote) && token.ends_with(quote) {
            let inner = token.strip_prefix(quote).unwrap_or(token);
            return inner.strip_suffix(quote).unwrap_or(inner);
        }
    }
    token
}
