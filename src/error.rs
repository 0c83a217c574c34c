//! Error types for the bridge.
//!
//! Errors are grouped by where they surface: framing and pre-send
//! validation ([`ProtocolError`]), registration numerics
//! ([`RegistrationError`]), the replay cache file ([`PersistError`]),
//! configuration ([`ConfigError`]), consumer input ([`Rejection`]) and
//! lifecycle requests ([`BridgeError`]).

use serde::Serialize;
use thiserror::Error;

use crate::session::ConnectionState;

/// Convenience type alias for Results using [`BridgeError`].
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Wire-level errors. Lines that produce one of these are dropped; the
/// session keeps running.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound bytes were not valid UTF-8.
    #[error("decode error: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// Line exceeded the protocol's maximum length.
    #[error("line too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line, terminator included.
        actual: usize,
        /// Configured limit, terminator included.
        limit: usize,
    },

    /// Line contained a NUL byte.
    #[error("line contains a NUL byte at offset {0}")]
    NullByte(usize),

    /// Line contained a CR or LF before its end.
    #[error("line contains an embedded line break")]
    EmbeddedLineBreak,

    /// Line was empty after trimming.
    #[error("empty line")]
    EmptyLine,
}

/// Errors that end a registration attempt.
///
/// None of these schedule an automatic reconnect; the caller decides
/// whether to try again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistrationError {
    /// 433 ERR_NICKNAMEINUSE.
    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    /// 432 ERR_ERRONEUSNICKNAME.
    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    /// 451 ERR_NOTREGISTERED.
    #[error("server reports connection not registered")]
    NotRegistered,

    /// 001 named a different nick than the one we sent.
    #[error("welcome reply names {got}, expected {expected}")]
    NickMismatch {
        /// The nick sent in NICK.
        expected: String,
        /// The nick carried by RPL_WELCOME.
        got: String,
    },

    /// 001 did not arrive in time.
    #[error("registration timed out after {0} seconds")]
    Timeout(u64),
}

impl RegistrationError {
    /// Whether a different nickname could succeed where this one failed.
    pub fn is_nick_collision(&self) -> bool {
        matches!(self, Self::NicknameInUse(_) | Self::ErroneousNickname(_))
    }
}

/// Errors reading or writing the persisted replay cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// File system error.
    #[error("cache file io error: {0}")]
    Io(#[from] std::io::Error),

    /// File was not the expected JSON document.
    #[error("cache file is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// File is older than the restore window.
    #[error("cache file expired: {age} seconds old (limit {limit})")]
    Expired {
        /// Age of the snapshot in seconds.
        age: u64,
        /// Configured maximum age in seconds.
        limit: u64,
    },

    /// File was already restored once.
    #[error("cache file has already been used")]
    AlreadyUsed,

    /// File parsed but its contents are inconsistent.
    #[error("cache file is inconsistent: {0}")]
    Inconsistent(String),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A consumer-authored command that was refused before reaching the wire.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Rejection {
    /// No registered session to send on.
    #[error("not connected")]
    NotConnected,

    /// JOIN for a channel that is already joined.
    #[error("already joined {0}")]
    AlreadyJoined(String),

    /// JOIN with a channel name that cannot be valid.
    #[error("channel name too short: {0:?}")]
    ChannelNameTooShort(String),

    /// PRIVMSG/NOTICE to a channel the consumer has not joined.
    #[error("not joined to {0}")]
    NotJoined(String),

    /// Command text contained a line break.
    #[error("command contains a line break")]
    LineBreak,

    /// Command was empty.
    #[error("empty command")]
    Empty,

    /// Writer refused the line.
    #[error("invalid line: {0}")]
    Invalid(#[from] ProtocolError),
}

/// Result of a consumer command in the shape the session layer expects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Whether the command was refused.
    pub rejected: bool,
    /// Why it was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<std::result::Result<(), Rejection>> for Submission {
    fn from(res: std::result::Result<(), Rejection>) -> Self {
        match res {
            Ok(()) => Submission::default(),
            Err(e) => Submission {
                rejected: true,
                reason: Some(e.to_string()),
            },
        }
    }
}

/// Top-level errors returned by lifecycle and administrative requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// Connect requested while a session is already active.
    #[error("connection already active ({0:?})")]
    AlreadyActive(ConnectionState),

    /// Disconnect requested with no active session.
    #[error("not connected")]
    NotConnected,

    /// Prune requested for a channel that is still joined.
    #[error("channel {0} is still joined")]
    ChannelJoined(String),

    /// The driver task has exited.
    #[error("bridge has stopped")]
    Stopped,

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cache persistence error.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Registration failure.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::MessageTooLong {
            actual: 600,
            limit: 512,
        };
        assert_eq!(format!("{}", err), "line too long: 600 bytes (limit 512)");

        let err = RegistrationError::NickMismatch {
            expected: "me".into(),
            got: "other".into(),
        };
        assert_eq!(
            format!("{}", err),
            "welcome reply names other, expected me"
        );
    }

    #[test]
    fn test_error_source_chaining() {
        let inner = ProtocolError::NullByte(3);
        let rejection = Rejection::from(inner);
        let source = std::error::Error::source(&rejection);
        // `#[from]` on a tuple variant with #[error("..{0}")] also marks it as source
        assert!(source.is_some());
        assert_eq!(
            source.unwrap().to_string(),
            "line contains a NUL byte at offset 3"
        );
    }

    #[test]
    fn test_submission_from_result() {
        let ok: Submission = Ok(()).into();
        assert!(!ok.rejected);
        assert!(ok.reason.is_none());

        let rejected: Submission = Err(Rejection::NotJoined("#x".into())).into();
        assert!(rejected.rejected);
        assert_eq!(rejected.reason.as_deref(), Some("not joined to #x"));
    }

    #[test]
    fn test_nick_collision() {
        assert!(RegistrationError::NicknameInUse("a".into()).is_nick_collision());
        assert!(!RegistrationError::NotRegistered.is_nick_collision());
    }

    #[test]
    fn test_error_conversion() {
        let io_err =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Io(_)));

        let persist: BridgeError = PersistError::AlreadyUsed.into();
        assert_eq!(persist.to_string(), "cache file has already been used");
    }
}
