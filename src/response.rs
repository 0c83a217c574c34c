//! IRC numeric replies the bridge reacts to.
//!
//! Only the numerics that drive registration, the roster, or the replay
//! exclusion list are named here; everything else is forwarded as-is.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 331 - No topic is set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 333 - Who set the topic and when
    RPL_TOPICWHOTIME = 333,
    /// 353 - Names reply
    RPL_NAMREPLY = 353,
    /// 366 - End of names
    RPL_ENDOFNAMES = 366,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
    /// 451 - You have not registered
    ERR_NOTREGISTERED = 451,
}

impl Response {
    /// Get the numeric code.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Look up a known numeric.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::RPL_WELCOME,
            331 => Self::RPL_NOTOPIC,
            332 => Self::RPL_TOPIC,
            333 => Self::RPL_TOPICWHOTIME,
            353 => Self::RPL_NAMREPLY,
            366 => Self::RPL_ENDOFNAMES,
            432 => Self::ERR_ERRONEUSNICKNAME,
            433 => Self::ERR_NICKNAMEINUSE,
            451 => Self::ERR_NOTREGISTERED,
            _ => return None,
        })
    }
}

/// Numerics never written to the replay cache.
///
/// Directory, WHO, WHOIS, LIST, ADMIN and LINKS output is bulky and
/// request-driven; topic metadata and names lists are redundant with the
/// roster.
const REPLAY_EXCLUDED: &[u16] = &[
    // LUSERS directory counts
    251, 252, 253, 254, 255, 265, 266,
    // ADMIN
    256, 257, 258, 259,
    // WHOIS / WHOWAS
    276, 301, 307, 311, 312, 313, 314, 317, 318, 319, 320, 330, 338, 369, 378, 379, 671,
    // WHO / WHOX
    315, 352, 354,
    // LIST
    321, 322, 323,
    // topic metadata
    333,
    // LINKS
    364, 365,
    // NAMES
    353, 366,
];

/// Whether a numeric is kept out of the replay cache.
pub fn is_replay_excluded(code: u16) -> bool {
    REPLAY_EXCLUDED.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in [1, 331, 332, 333, 353, 366, 432, 433, 451] {
            assert_eq!(Response::from_code(code).map(Response::code), Some(code));
        }
        assert_eq!(Response::from_code(2), None);
    }

    #[test]
    fn test_exclusions() {
        assert!(is_replay_excluded(353));
        assert!(is_replay_excluded(333));
        assert!(is_replay_excluded(322));
        assert!(!is_replay_excluded(332));
        assert!(!is_replay_excluded(1));
    }
}
