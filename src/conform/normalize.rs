//! String clean-up applied before conversion.

use crate::convert::ValueKind;

/// Normalize a (possibly regex-narrowed) raw value for its field kind.
///
/// Every kind but `raw` is trimmed. Numeric kinds additionally lose
/// letters, punctuation, symbols and whitespace, keeping ASCII digits, a
/// leading sign and, for `decimal`, the `.` separator. The rules are
/// idempotent.
pub fn normalize(value: &str, kind: ValueKind) -> String {
    match kind {
        ValueKind::Raw => value.to_string(),
        ValueKind::Text | ValueKind::DateTime => value.trim().to_string(),
        ValueKind::Number => strip_numeric(value.trim(), false),
        ValueKind::Decimal => strip_numeric(value.trim(), true),
    }
}

fn strip_numeric(value: &str, keep_point: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev: Option<char> = None;
    let mut chars = value.chars().peekable();
    let mut seen_digit = false;

    while let Some(c) = chars.next() {
        let keep = match c {
            '0'..='9' => {
                seen_digit = true;
                true
            }
            '.' => keep_point && chars.peek().is_some_and(|next| next.is_ascii_digit()),
            // A sign survives only in front of the number: nothing kept
            // yet, preceded by nothing or whitespace, followed by a digit.
            '-' | '+' => {
                !seen_digit
                    && out.is_empty()
                    && prev.map_or(true, char::is_whitespace)
                    && chars.peek().is_some_and(|next| next.is_ascii_digit())
            }
            _ => false,
        };

        if keep {
            out.push(c);
        }
        prev = Some(c);
    }

    out
}
