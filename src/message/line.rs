use std::borrow::Cow;

use serde::Serialize;

use super::nom_parser::parse_line;

/// An owned, parsed IRC line.
///
/// `nick` and `host` are only set when the prefix has the
/// `nick!user@host` shape; `host` then carries `user@host`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedLine {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub nick: Option<String>,
    pub host: Option<String>,
    /// Command token as received. Empty when the line had none.
    pub command: String,
    pub params: Vec<String>,
}

impl ParsedLine {
    /// Parse one decoded line. Never fails; see [`parse_line`].
    pub fn parse(line: &str) -> Self {
        let raw = parse_line(line);
        let (nick, host) = match raw.prefix.and_then(split_prefix) {
            Some((nick, host)) => (Some(nick.to_string()), Some(host.to_string())),
            None => (None, None),
        };
        ParsedLine {
            tags: raw.tags.map(str::to_string),
            prefix: raw.prefix.map(str::to_string),
            nick,
            host,
            command: raw.command.to_string(),
            params: raw.params.into_iter().map(str::to_string).collect(),
        }
    }

    /// Decode and parse one framed line.
    pub fn parse_bytes(line: &[u8]) -> Self {
        Self::parse(&decode_line(line))
    }

    /// Get the parameter at `idx`.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// The last parameter.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// The numeric reply code, if the command is three ASCII digits.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Whether the command matches `name`, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.command.eq_ignore_ascii_case(name)
    }
}

/// Split a `nick!user@host` prefix into `(nick, user@host)`.
///
/// Returns `None` unless both delimiters are present with `!` first.
pub fn split_prefix(prefix: &str) -> Option<(&str, &str)> {
    let bang = prefix.find('!')?;
    let at = prefix.find('@')?;
    if bang == 0 || bang > at {
        return None;
    }
    Some((&prefix[..bang], &prefix[bang + 1..]))
}

/// Decode a framed line to text.
///
/// Valid UTF-8 is borrowed as-is. Anything else is decoded as
/// Windows-1252, which maps every byte, so no line is lost to a peer
/// with a legacy encoding.
pub fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    let end = bytes
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);
    let bytes = &bytes[..end];
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (text, _) = encoding::WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}
