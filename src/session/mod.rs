//! Sans-IO bridge session.
//!
//! [`BridgeSession`] owns the connection state, roster, replay cache and
//! CTCP responder for one upstream server. It consumes transport events,
//! timer expiries and consumer requests, and answers with a list of
//! [`Action`]s for the caller to perform. It never touches a socket or a
//! clock beyond reading `Instant`s it is handed.
//!
//! ```
//! use slirc_bridge::config::{BridgeConfig, ServerProfile};
//! use slirc_bridge::session::{Action, BridgeSession, ConnectionState};
//!
//! let config = BridgeConfig::with_server(ServerProfile::new("irc.example.net", 6667, "mynick"));
//! let mut session = BridgeSession::new(config);
//!
//! let actions = session.connect(None).unwrap();
//! assert!(matches!(actions[0], Action::Open { .. }));
//! assert_eq!(session.state(), ConnectionState::Connecting);
//! ```
//!
//! Every transport event and every timer carries the generation it was
//! created for. The generation advances whenever a connection starts or
//! ends, so events from a previous socket, or timers armed before a
//! disconnect, fall through as no-ops.

mod lifecycle;
mod outbound;
mod router;
mod state;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheInfo, CacheSnapshot, MessageCache};
use crate::config::{BridgeConfig, ProfileSummary, ServerProfile};
use crate::ctcp::CtcpResponder;
use crate::error::{BridgeError, PersistError, Result};
use crate::event::{BridgeEvent, DiagnosticKind};
use crate::framer::LineFramer;
use crate::roster::Roster;
use crate::writer::SocketWriter;

pub use self::state::{Action, ConnectionState, Timer, TimerKind};

/// Read-only view for consumers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub nick: String,
    /// Active profile. Its `nick` is the live nickname; registration
    /// after a reconnect still starts from the configured one.
    pub profile: ProfileSummary,
    pub roster: Roster,
    /// Whether an automatic reconnect is scheduled.
    pub reconnect_pending: bool,
    /// Auto-reconnect is off after a ban or kill until the next connect.
    pub aborted: bool,
    /// Registration failures since start.
    pub error_count: u32,
}

#[derive(Debug)]
pub struct BridgeSession {
    config: BridgeConfig,
    state: ConnectionState,
    generation: u64,
    /// Live nickname; follows our own NICK changes.
    nick: String,
    /// Nickname sent in the current registration.
    sent_nick: String,
    /// `nick!user@host` as the server sees us.
    self_mask: Option<String>,
    use_alt_nick: bool,
    roster: Roster,
    cache: MessageCache,
    ctcp: CtcpResponder,
    writer: SocketWriter,
    framer: LineFramer,
    /// Index into the reconnect delay table.
    attempt: usize,
    reconnect_pending: bool,
    user_closed: bool,
    aborted: bool,
    error_count: u32,
    /// Joined channels remembered from the last registered connection.
    rejoin: Option<Vec<String>>,
}

impl BridgeSession {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            nick: config.server.nick.clone(),
            sent_nick: config.server.nick.clone(),
            cache: MessageCache::from_config(&config.cache),
            ctcp: CtcpResponder::new(&config.ctcp),
            config,
            state: ConnectionState::Idle,
            generation: 0,
            self_mask: None,
            use_alt_nick: false,
            roster: Roster::new(),
            writer: SocketWriter::default(),
            framer: LineFramer::new(),
            attempt: 0,
            reconnect_pending: false,
            user_closed: false,
            aborted: false,
            error_count: 0,
            rejoin: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn profile(&self) -> &ServerProfile {
        &self.config.server
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut profile = self.config.server.summary();
        profile.nick = self.nick.clone();
        SessionSnapshot {
            state: self.state,
            nick: self.nick.clone(),
            profile,
            roster: self.roster.clone(),
            reconnect_pending: self.reconnect_pending,
            aborted: self.aborted,
            error_count: self.error_count,
        }
    }

    /// Every cached line for replay.
    pub fn cached_history(&self) -> Vec<String> {
        self.cache.all_messages(&self.roster)
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    pub fn erase_cached_history(&mut self) {
        debug!("erasing cached history");
        self.cache.erase_all();
    }

    /// Forget a channel that is no longer joined: its roster entry and its
    /// cache buffer.
    pub fn prune_channel(&mut self, name: &str) -> Result<Vec<Action>> {
        if self.roster.is_joined(name) {
            return Err(BridgeError::ChannelJoined(name.to_string()));
        }
        let had_entry = self.roster.remove(name).is_some();
        let had_buffer = self.cache.prune_channel(name);
        debug!(channel = %name, had_entry, had_buffer, "pruned channel");
        let mut actions = Vec::new();
        if had_entry {
            actions.push(Action::Notify(BridgeEvent::RosterChanged));
        }
        Ok(actions)
    }

    pub fn cache_snapshot(&self, timestamp: i64) -> CacheSnapshot {
        self.cache.to_snapshot(timestamp)
    }

    pub fn restore_cache(&mut self, snapshot: CacheSnapshot) {
        self.cache.restore(snapshot);
    }

    /// Apply the outcome of a startup restore. A failure leaves the cache
    /// as it is and is reported to consumers.
    pub fn apply_restore(
        &mut self,
        outcome: Result<Option<CacheSnapshot>, PersistError>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        match outcome {
            Ok(Some(snapshot)) => self.restore_cache(snapshot),
            Ok(None) => {}
            Err(e) => self.diagnostic(
                DiagnosticKind::Persist,
                format!("cached history not restored: {}", e),
                &mut actions,
            ),
        }
        actions
    }

    /// `nick!user@host` used for locally synthesized lines.
    fn self_mask(&self) -> String {
        match &self.self_mask {
            Some(mask) => mask.clone(),
            None => format!("{}!{}@*", self.nick, self.config.server.user),
        }
    }

    fn notify_state(&self, actions: &mut Vec<Action>) {
        actions.push(Action::Notify(BridgeEvent::StateChanged {
            state: self.state,
            nick: self.nick.clone(),
        }));
    }

    fn diagnostic(&self, kind: DiagnosticKind, text: impl Into<String>, actions: &mut Vec<Action>) {
        actions.push(Action::Notify(BridgeEvent::diagnostic(kind, text)));
    }

    /// Validate and queue a line we authored, mirroring it to consumers.
    fn send(&self, line: &str, actions: &mut Vec<Action>) {
        self.send_inner(line, true, actions);
    }

    /// As [`send`](Self::send) without the consumer mirror.
    fn send_quiet(&self, line: &str, actions: &mut Vec<Action>) {
        self.send_inner(line, false, actions);
    }

    fn send_inner(&self, line: &str, mirror: bool, actions: &mut Vec<Action>) {
        match self.writer.prepare(line.as_bytes()) {
            Ok(prepared) => {
                debug!(generation = self.generation, line = %prepared.mirror, "send");
                actions.push(Action::Send {
                    generation: self.generation,
                    line: prepared.wire,
                });
                if mirror {
                    actions.push(Action::Notify(BridgeEvent::Outgoing {
                        line: prepared.mirror,
                    }));
                }
            }
            Err(e) => {
                warn!(error = %e, "dropping invalid outbound line");
                self.diagnostic(DiagnosticKind::Protocol, format!("not sent: {}", e), actions);
            }
        }
    }
}
