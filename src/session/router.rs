//! Inbound line routing.
//!
//! Every line is cached before the roster is touched, so QUIT and NICK
//! fan-out sees the membership that held when the line was sent.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{Action, BridgeSession, ConnectionState};
use crate::casemap::irc_eq;
use crate::ctcp::DELIM;
use crate::error::RegistrationError;
use crate::event::{BridgeEvent, DiagnosticKind};
use crate::message::{decode_line, ParsedLine};
use crate::response::Response;
use crate::roster::is_channel_name;

/// ERROR text fragments that mean we were banned or killed.
const ABORT_MARKERS: &[&str] = &["banned", "k-lined", "g-lined", "z-lined", "d-lined", "killed"];

/// Commands the router acts on. Everything else is cached and forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InboundCommand {
    Ping,
    Pong,
    Error,
    Join,
    Part,
    Kick,
    Quit,
    Nick,
    Topic,
    Mode,
    Privmsg,
    Notice,
    Reply(Response),
    Other,
}

impl InboundCommand {
    fn classify(line: &ParsedLine) -> Self {
        if let Some(code) = line.numeric() {
            return Response::from_code(code).map_or(Self::Other, Self::Reply);
        }
        match line.command.to_ascii_uppercase().as_str() {
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "ERROR" => Self::Error,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "KICK" => Self::Kick,
            "QUIT" => Self::Quit,
            "NICK" => Self::Nick,
            "TOPIC" => Self::Topic,
            "MODE" => Self::Mode,
            "PRIVMSG" => Self::Privmsg,
            "NOTICE" => Self::Notice,
            _ => Self::Other,
        }
    }
}

impl BridgeSession {
    /// Feed raw socket bytes read on `generation`.
    pub fn on_bytes(&mut self, generation: u64, data: &[u8]) -> Vec<Action> {
        if !self.is_current(generation, "data") || !self.accepts_lines() {
            return Vec::new();
        }
        let dropped = self.framer.dropped();
        let lines = self.framer.feed(data);
        let count = self.framer.dropped() - dropped;
        let mut actions = self.on_dropped(generation, count);
        for line in lines {
            // a line may have ended this connection
            if self.generation != generation {
                break;
            }
            actions.extend(self.handle_line(&decode_line(&line)));
        }
        actions
    }

    /// Report inbound lines the framer discarded for exceeding the limit.
    pub fn on_dropped(&mut self, generation: u64, count: usize) -> Vec<Action> {
        let mut actions = Vec::new();
        if count == 0 || !self.is_current(generation, "dropped") {
            return actions;
        }
        let text = match count {
            1 => "oversized inbound line dropped".to_string(),
            n => format!("{} oversized inbound lines dropped", n),
        };
        self.diagnostic(DiagnosticKind::Protocol, text, &mut actions);
        actions
    }

    /// Handle one already framed line read on `generation`.
    pub fn on_line(&mut self, generation: u64, line: &[u8]) -> Vec<Action> {
        if !self.is_current(generation, "line") || !self.accepts_lines() {
            return Vec::new();
        }
        self.handle_line(&decode_line(line))
    }

    fn accepts_lines(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::SocketOpen | ConnectionState::Registering | ConnectionState::Registered
        )
    }

    fn handle_line(&mut self, line: &str) -> Vec<Action> {
        let parsed = ParsedLine::parse(line);
        let mut actions = Vec::new();
        if parsed.command.is_empty() {
            warn!(line = %line, "dropping line without command");
            self.diagnostic(
                DiagnosticKind::Protocol,
                format!("malformed line dropped: {}", line),
                &mut actions,
            );
            return actions;
        }

        let command = InboundCommand::classify(&parsed);
        match command {
            InboundCommand::Ping => {
                let pong = match parsed.trailing() {
                    Some(token) => format!("PONG :{}", token),
                    None => "PONG".to_string(),
                };
                self.send_quiet(&pong, &mut actions);
                return actions;
            }
            InboundCommand::Pong => return actions,
            _ => {}
        }

        self.cache.add_message(line, &self.roster, &self.nick);
        actions.push(Action::Notify(BridgeEvent::Line {
            line: line.to_string(),
        }));

        let actor = parsed
            .nick
            .as_deref()
            .or_else(|| parsed.prefix.as_deref().map(|p| p.split('!').next().unwrap_or(p)))
            .unwrap_or("");

        let roster_changed = match command {
            InboundCommand::Join => match parsed.param(0) {
                Some(channels) => {
                    for channel in channels.split(',').filter(|c| !c.is_empty()) {
                        self.roster.on_join(channel, actor, &self.nick);
                    }
                    true
                }
                None => false,
            },
            InboundCommand::Part => match parsed.param(0) {
                Some(channels) => {
                    for channel in channels.split(',').filter(|c| !c.is_empty()) {
                        self.roster.on_part(channel, actor, &self.nick);
                    }
                    true
                }
                None => false,
            },
            InboundCommand::Kick => match (parsed.param(0), parsed.param(1)) {
                (Some(channel), Some(target)) => {
                    if irc_eq(target, &self.nick) {
                        info!(channel = %channel, by = %actor, "kicked");
                    }
                    self.roster.on_kick(channel, target, &self.nick);
                    true
                }
                _ => false,
            },
            InboundCommand::Quit => {
                self.roster.on_quit(actor);
                true
            }
            InboundCommand::Nick => match parsed.param(0) {
                Some(new) => {
                    if irc_eq(actor, &self.nick) {
                        self.rename_self(new, &mut actions);
                    }
                    self.roster.on_nick_change(actor, new);
                    true
                }
                None => false,
            },
            InboundCommand::Topic => match parsed.param(0) {
                Some(channel) => {
                    self.roster.on_topic(channel, parsed.param(1).unwrap_or(""));
                    true
                }
                None => false,
            },
            InboundCommand::Mode => match (parsed.param(0), parsed.param(1)) {
                (Some(channel), Some(modes)) if is_channel_name(channel) => {
                    let targets: Vec<&str> = parsed.params[2..].iter().map(String::as_str).collect();
                    self.roster.on_mode_change(channel, modes, &targets);
                    true
                }
                _ => false,
            },
            InboundCommand::Privmsg => {
                self.answer_ctcp(actor, &parsed, &mut actions);
                false
            }
            InboundCommand::Error => {
                self.check_abort(&parsed, &mut actions);
                false
            }
            InboundCommand::Reply(reply) => self.handle_reply(reply, &parsed, &mut actions),
            InboundCommand::Notice
            | InboundCommand::Other
            | InboundCommand::Ping
            | InboundCommand::Pong => false,
        };

        if roster_changed {
            actions.push(Action::Notify(BridgeEvent::RosterChanged));
        }
        actions
    }

    fn handle_reply(&mut self, reply: Response, parsed: &ParsedLine, actions: &mut Vec<Action>) -> bool {
        match reply {
            Response::RPL_WELCOME => {
                let welcomed = parsed.param(0).unwrap_or("");
                let text = parsed.param(1).unwrap_or("");
                actions.extend(self.complete_registration(welcomed, text));
                false
            }
            Response::RPL_TOPIC => match (parsed.param(1), parsed.param(2)) {
                (Some(channel), Some(topic)) => {
                    self.roster.on_topic(channel, topic);
                    true
                }
                _ => false,
            },
            Response::RPL_NOTOPIC => match parsed.param(1) {
                Some(channel) => {
                    self.roster.on_topic(channel, "");
                    true
                }
                None => false,
            },
            Response::RPL_NAMREPLY => {
                // `<me> [symbol] <channel> :<names>`
                let n = parsed.params.len();
                if n >= 3 {
                    self.roster.on_names_reply(&parsed.params[n - 2], &parsed.params[n - 1]);
                }
                false
            }
            Response::RPL_ENDOFNAMES => true,
            Response::ERR_NICKNAMEINUSE | Response::ERR_ERRONEUSNICKNAME
                if self.state.is_registering() =>
            {
                let nick = parsed.param(1).unwrap_or(self.sent_nick.as_str()).to_string();
                let error = if reply == Response::ERR_NICKNAMEINUSE {
                    RegistrationError::NicknameInUse(nick)
                } else {
                    RegistrationError::ErroneousNickname(nick)
                };
                actions.extend(self.fail_registration(error));
                false
            }
            Response::ERR_NOTREGISTERED if self.state.is_registering() => {
                actions.extend(self.fail_registration(RegistrationError::NotRegistered));
                false
            }
            _ => false,
        }
    }

    fn rename_self(&mut self, new: &str, actions: &mut Vec<Action>) {
        info!(old = %self.nick, new = %new, "own nick changed");
        if let Some(mask) = &self.self_mask {
            if let Some(bang) = mask.find('!') {
                self.self_mask = Some(format!("{}{}", new, &mask[bang..]));
            }
        }
        self.nick = new.to_string();
        self.notify_state(actions);
    }

    fn answer_ctcp(&mut self, requester: &str, parsed: &ParsedLine, actions: &mut Vec<Action>) {
        if self.state != ConnectionState::Registered || requester.is_empty() {
            return;
        }
        let Some(text) = parsed.param(1).filter(|t| t.starts_with(DELIM)) else {
            return;
        };
        if irc_eq(requester, &self.nick) {
            return;
        }
        let mask = self.self_mask();
        let Some(reply) = self.ctcp.handle(requester, text, &mask, Instant::now()) else {
            return;
        };
        debug!(requester = %requester, "answering ctcp");
        self.send_quiet(&reply.line, actions);
        if matches!(actions.last(), Some(Action::Send { .. })) {
            self.cache.add_message(&reply.echo, &self.roster, &self.nick);
            actions.push(Action::Notify(BridgeEvent::Line { line: reply.echo }));
        }
    }

    fn check_abort(&mut self, parsed: &ParsedLine, actions: &mut Vec<Action>) {
        let text = parsed.trailing().unwrap_or("");
        let lower = text.to_ascii_lowercase();
        if ABORT_MARKERS.iter().any(|marker| lower.contains(marker)) {
            self.aborted = true;
            warn!(reason = %text, "ban or kill detected");
            self.diagnostic(
                DiagnosticKind::Abort,
                format!("server error: {}; auto-reconnect disabled", text),
                actions,
            );
        } else {
            info!(reason = %text, "server error");
            self.diagnostic(DiagnosticKind::Transport, format!("server error: {}", text), actions);
        }
    }
}
