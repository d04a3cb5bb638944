//! URN-safe escaping of reserved characters.
//!
//! The template grammar reserves parentheses, comma, and colon as
//! structural characters. Parameter values are escaped so a built URN can
//! always be split back on its literal separators. `%` escapes itself so
//! unescaping is unambiguous.

/// Characters that may not appear raw inside a parameter value.
pub const RESERVED: [char; 5] = ['%', '(', ')', ',', ':'];

/// Escape reserved characters in a parameter value.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            ',' => out.push_str("%2C"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

/// Invert [`escape_value`]. Unrecognized escape sequences are kept verbatim
/// so values that never went through escaping still round-trip.
pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let decoded = if bytes[i] == b'%' {
            value.get(i + 1..i + 3).and_then(|code| match code {
                "25" => Some('%'),
                "28" => Some('('),
                "29" => Some(')'),
                "2C" => Some(','),
                "3A" => Some(':'),
                _ => None,
            })
        } else {
            None
        };
        if let Some(ch) = decoded {
            out.push(ch);
            i += 3;
        } else {
            // '%' is single-byte, so i is always on a char boundary here.
            let ch = value[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

/// Whether a string contains any reserved character.
pub fn contains_reserved(value: &str) -> bool {
    value.chars().any(|c| RESERVED.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_reserved() {
        assert_eq!(escape_value("a(b),c:d"), "a%28b%29%2Cc%3Ad");
        assert_eq!(escape_value("100%"), "100%25");
        assert_eq!(escape_value("plain.value-1"), "plain.value-1");
    }

    #[test]
    fn test_unescape_inverts_escape() {
        for value in ["a(b),c:d", "100%", "plain", "%2C", "urn:li:x"] {
            assert_eq!(unescape_value(&escape_value(value)), value);
        }
    }

    #[test]
    fn test_unescape_keeps_unknown_sequences() {
        assert_eq!(unescape_value("a%20b"), "a%20b");
        assert_eq!(unescape_value("trailing%"), "trailing%");
    }

    #[test]
    fn test_escaped_value_has_no_reserved_chars() {
        let escaped = escape_value("weird(value):with,everything%");
        assert!(!escaped.contains('('));
        assert!(!escaped.contains(')'));
        assert!(!escaped.contains(','));
        assert!(!escaped.contains(':'));
    }
}
