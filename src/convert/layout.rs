//! Translation of plan date layouts into chrono format strings.
//!
//! Plans describe date formats with single-letter layout characters
//! (`d/m/Y H:i:s`), the way most scraping configs write them. chrono parses
//! with `strftime` specifiers, so layouts are translated once when a field's
//! converter is resolved.

/// Translate a date layout into a chrono `strftime` format string.
///
/// Letters without a layout meaning are copied literally, `\` escapes the
/// following character and `%` is always escaped.
///
/// | layout | meaning | chrono |
/// |---|---|---|
/// | `d`, `j` | day of month | `%d` |
/// | `D` / `l` | short / long weekday name | `%a` / `%A` |
/// | `m`, `n` | month number | `%m` |
/// | `M` / `F` | short / long month name | `%b` / `%B` |
/// | `Y` / `y` | 4 / 2 digit year | `%Y` / `%y` |
/// | `H`, `G` | 24-hour hour | `%H` |
/// | `h`, `g` | 12-hour hour | `%I` |
/// | `i` / `s` | minutes / seconds | `%M` / `%S` |
/// | `A`, `a` | AM/PM | `%p` |
/// | `v` / `u` | milli / microseconds | `%3f` / `%6f` |
/// | `O` / `P` | offset `+0200` / `+02:00` | `%z` / `%:z` |
/// | `e`, `T` | zone name (skipped) | `%Z` |
/// | `U` | Unix seconds | `%s` |
pub fn to_strftime(layout: &str) -> String {
    let mut out = String::with_capacity(layout.len() * 2);
    let mut chars = layout.chars();

    while let Some(c) = chars.next() {
        let specifier = match c {
            'd' | 'j' => "%d",
            'D' => "%a",
            'l' => "%A",
            'm' | 'n' => "%m",
            'M' => "%b",
            'F' => "%B",
            'Y' => "%Y",
            'y' => "%y",
            'H' | 'G' => "%H",
            'h' | 'g' => "%I",
            'i' => "%M",
            's' => "%S",
            'A' | 'a' => "%p",
            'v' => "%3f",
            'u' => "%6f",
            'O' => "%z",
            'P' => "%:z",
            'e' | 'T' => "%Z",
            'U' => "%s",
            '\\' => {
                if let Some(escaped) = chars.next() {
                    push_literal(&mut out, escaped);
                }
                continue;
            }
            other => {
                push_literal(&mut out, other);
                continue;
            }
        };
        out.push_str(specifier);
    }

    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
