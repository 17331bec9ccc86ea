//! Regex pre-extraction.
//!
//! A field may declare a pattern whose first capturing group replaces the
//! raw harvested string before it is normalized and converted.

use regex::Regex;
use tracing::Span;

/// Outcome of applying a field's pattern to one raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<'a> {
    /// Group 1 matched.
    Captured(&'a str),
    /// The pattern did not match, or group 1 did not take part in the match.
    NoMatch,
}

/// Compiled pattern for one field.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    regex: Regex,
}

impl FieldExtractor {
    /// Compile a field's pattern.
    ///
    /// Returns `None`, with a warning, when the pattern does not compile or
    /// has no capturing group; extraction is then skipped for the field and
    /// raw values pass through unchanged.
    pub fn compile(pattern: &str, span: &Span) -> Option<Self> {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(parent: span, regex = pattern, error = %e, "failed to compile regex");
                return None;
            }
        };

        // captures_len counts the implicit whole-match group.
        if regex.captures_len() < 2 {
            tracing::warn!(parent: span, regex = pattern, "regex has no capturing group, skipping extraction");
            return None;
        }

        Some(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Apply the pattern to a raw value.
    pub fn extract<'a>(&self, value: &'a str) -> Extraction<'a> {
        self.regex
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| Extraction::Captured(m.as_str()))
            .unwrap_or(Extraction::NoMatch)
    }

    /// Apply the pattern, mapping [`Extraction::NoMatch`] to the empty string.
    pub fn apply<'a>(&self, value: &'a str, span: &Span) -> &'a str {
        match self.extract(value) {
            Extraction::Captured(captured) => {
                tracing::debug!(parent: span, value, regex = self.as_str(), captured, "regex matched");
                captured
            }
            Extraction::NoMatch => {
                tracing::debug!(parent: span, value, regex = self.as_str(), "regex did not match");
                ""
            }
        }
    }
}
