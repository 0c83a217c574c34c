//! Outbound line validation and secret redaction.
//!
//! Every line sent upstream passes through [`SocketWriter::prepare`], which
//! yields the bytes for the wire and a redacted copy for consumers and
//! logs. The wire copy is never redacted.

use std::borrow::Cow;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::framer::MAX_LINE_LEN;
use crate::message::parse_line;

const MASK: &str = "********";

/// Services verbs whose arguments are secrets.
const SECRET_SERVICE_VERBS: &[&str] = &["IDENTIFY", "REGISTER", "GHOST", "RECOVER", "RELEASE", "SET"];

/// A validated outbound line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedLine {
    /// Bytes to send, without terminator.
    pub wire: Bytes,
    /// Copy safe to show consumers and logs.
    pub mirror: String,
}

/// Validates, frames and redacts outbound lines.
#[derive(Clone, Debug)]
pub struct SocketWriter {
    max_line_len: usize,
}

impl Default for SocketWriter {
    fn default() -> Self {
        Self {
            max_line_len: MAX_LINE_LEN,
        }
    }
}

impl SocketWriter {
    /// Create a writer with a custom line limit (terminator included).
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self { max_line_len }
    }

    /// Validate `line` and produce its wire and mirror forms.
    ///
    /// A single trailing CRLF or LF is tolerated and stripped; the framing
    /// codec adds its own terminator.
    pub fn prepare(&self, line: &[u8]) -> Result<PreparedLine, ProtocolError> {
        let text = std::str::from_utf8(line)?;
        let text = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);

        if text.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }
        if let Some(pos) = text.bytes().position(|b| b == 0) {
            return Err(ProtocolError::NullByte(pos));
        }
        if text.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedLineBreak);
        }
        let framed = text.len() + 2;
        if framed > self.max_line_len {
            return Err(ProtocolError::MessageTooLong {
                actual: framed,
                limit: self.max_line_len,
            });
        }

        Ok(PreparedLine {
            wire: Bytes::copy_from_slice(text.as_bytes()),
            mirror: redact(text).into_owned(),
        })
    }
}

/// Mask the secret part of password and services-authentication commands.
pub fn redact(line: &str) -> Cow<'_, str> {
    let raw = parse_line(line);
    let command = raw.command.to_ascii_uppercase();

    match command.as_str() {
        "PASS" | "AUTHENTICATE" => Cow::Owned(format!("{} {}", raw.command, MASK)),
        "OPER" => match raw.params.first() {
            Some(name) => Cow::Owned(format!("{} {} {}", raw.command, name, MASK)),
            None => Cow::Borrowed(line),
        },
        "NICKSERV" | "NS" => match raw.params.first() {
            Some(verb) if is_secret_verb(first_word(verb)) => Cow::Owned(format!(
                "{} {} {}",
                raw.command,
                first_word(verb),
                MASK
            )),
            _ => Cow::Borrowed(line),
        },
        "PRIVMSG" | "NOTICE" => match (raw.params.first(), raw.params.get(1)) {
            (Some(target), Some(text))
                if target.eq_ignore_ascii_case("NickServ")
                    && is_secret_verb(first_word(text)) =>
            {
                Cow::Owned(format!(
                    "{} {} :{} {}",
                    raw.command,
                    target,
                    first_word(text),
                    MASK
                ))
            }
            _ => Cow::Borrowed(line),
        },
        _ => Cow::Borrowed(line),
    }
}

fn first_word(s: &str) -> &str {
    s.split(' ').next().unwrap_or(s)
}

fn is_secret_verb(verb: &str) -> bool {
    SECRET_SERVICE_VERBS
        .iter()
        .any(|v| v.eq_ignore_ascii_case(verb))
}
