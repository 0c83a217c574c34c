//! IRC case-mapping functions.
//!
//! Nicknames and channel names compare case-insensitively under the
//! `rfc1459` mapping, where `[]\~` are the uppercase forms of `{}|^`.

#[inline]
fn fold(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
///
/// This is the canonical form used for roster and cache keys.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(fold).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold(x) == fold(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_brackets() {
        assert_eq!(irc_to_lower("#Rust[Dev]"), "#rust{dev}");
        assert_eq!(irc_to_lower("Nick\\~"), "nick|^");
    }

    #[test]
    fn test_eq() {
        assert!(irc_eq("Bob[away]", "bob{AWAY}"));
        assert!(!irc_eq("bob", "bobby"));
        assert!(!irc_eq("bob", "rob"));
    }
}
