//! # slirc-bridge
//!
//! The core of a stateful IRC bridge: one upstream connection, many
//! downstream consumers that only see derived state and cached history.
//!
//! ## Features
//!
//! - Lenient wire parsing with IRCv3 tag tolerance and legacy-encoding fallback
//! - Stream framing with a per-line limit
//! - A sans-IO connection state machine with generation-guarded timers
//!   and reconnect backoff
//! - Channel roster tracking with privilege markers
//! - A per-channel replay cache with QUIT/NICK fan-out and one-shot
//!   persistence
//! - A rate-limited CTCP responder
//! - An outbound filter and writer that validate consumer commands and
//!   redact secrets from mirrored copies
//! - Optional Tokio driver and TCP/TLS transport
//!
//! ## Quick Start
//!
//! ```rust
//! use slirc_bridge::config::{BridgeConfig, ServerProfile};
//! use slirc_bridge::session::{Action, BridgeSession, ConnectionState, Timer, TimerKind};
//!
//! let profile = ServerProfile::new("irc.example.net", 6667, "mynick");
//! let mut session = BridgeSession::new(BridgeConfig::with_server(profile));
//!
//! session.connect(None).unwrap();
//! let generation = session.generation();
//! session.on_connected(generation);
//! session.on_timer(Timer { generation, kind: TimerKind::Register });
//!
//! let actions = session.on_bytes(
//!     generation,
//!     b":irc.example.net 001 mynick :Welcome mynick!ident@host\r\n",
//! );
//! assert_eq!(session.state(), ConnectionState::Registered);
//! assert!(actions.iter().any(|a| matches!(a, Action::Notify(_))));
//! ```
//!
//! ### Parsing lines
//!
//! ```rust
//! use slirc_bridge::ParsedLine;
//!
//! let line = ParsedLine::parse(":a!b@c PRIVMSG #rust :hello there");
//! assert_eq!(line.nick.as_deref(), Some("a"));
//! assert_eq!(line.params, vec!["#rust", "hello there"]);
//! ```

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod casemap;
pub mod config;
pub mod ctcp;
pub mod error;
pub mod event;
pub mod framer;
pub mod message;
pub mod mode;
pub mod response;
pub mod roster;
pub mod session;
pub mod writer;

#[cfg(feature = "tokio")]
pub mod bridge;
#[cfg(feature = "tokio")]
pub mod transport;

pub use self::cache::{CacheInfo, CacheSnapshot, MessageCache};
pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::config::{BridgeConfig, ServerProfile};
pub use self::ctcp::CtcpResponder;
pub use self::error::{
    BridgeError, ConfigError, PersistError, ProtocolError, RegistrationError, Rejection, Submission,
};
pub use self::event::{BridgeEvent, DiagnosticKind, Notifier};
pub use self::framer::{LineFramer, MAX_LINE_LEN};
pub use self::message::{decode_line, parse_line, ParsedLine};
pub use self::response::Response;
pub use self::roster::{ChannelEntry, Member, Privilege, Roster};
pub use self::session::{Action, BridgeSession, ConnectionState, SessionSnapshot};
pub use self::writer::{redact, SocketWriter};

#[cfg(feature = "tokio")]
pub use self::bridge::Bridge;
#[cfg(feature = "tokio")]
pub use self::transport::Transport;
