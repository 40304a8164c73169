//! Token extraction contract
//!
//! The session manager never inspects requests itself. It asks a
//! [`TokenSource`] for the raw value of one named field and parses the
//! session identifier out of it with [`parse_token`].

use std::collections::HashMap;

/// Anything that can hand out the raw value of a named header field
pub trait TokenSource {
    fn token_value(&self, name: &str) -> Option<&str>;
}

impl TokenSource for HashMap<String, String> {
    fn token_value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }
}

#[cfg(feature = "http")]
impl TokenSource for http::HeaderMap {
    fn token_value(&self, name: &str) -> Option<&str> {
        self.get(name)?.to_str().ok()
    }
}

/// Extract the session identifier from a raw token value
///
/// Surrounding whitespace is trimmed, a leading `prefix` is stripped, and the
/// remainder is trimmed again. Returns `None` when nothing is left.
///
/// The prefix is stripped even when no whitespace follows it, so with the
/// prefix `"Bearer"` both `"Bearer abc"` and `"Bearerabc"` yield `"abc"`.
pub fn parse_token<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let trimmed = raw.trim();
    let stripped = if prefix.is_empty() {
        trimmed
    } else {
        trimmed.strip_prefix(prefix).unwrap_or(trimmed)
    };

    let id = stripped.trim();
    (!id.is_empty()).then_some(id)
}
