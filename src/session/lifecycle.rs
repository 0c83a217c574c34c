//! Connect, register, close and reconnect.

use std::fmt;

use tracing::{debug, info, warn};

use super::{Action, BridgeSession, ConnectionState, Timer, TimerKind};
use crate::casemap::irc_eq;
use crate::config::ServerProfile;
use crate::error::{BridgeError, RegistrationError, Result};
use crate::event::{BridgeEvent, DiagnosticKind};
use crate::message::split_prefix;

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CloseCause {
    /// Requested by the consumer.
    User,
    /// Registration refused or timed out. Never retried automatically.
    Registration,
    /// Socket closed or failed under us.
    Remote,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Registration => "registration",
            Self::Remote => "remote",
        })
    }
}

impl BridgeSession {
    /// Start a connection, optionally switching to a new profile first.
    ///
    /// Succeeds as soon as the request is accepted; the outcome arrives
    /// later as state-change events. An explicit connect resets the
    /// backoff and re-enables auto-reconnect after an abort.
    pub fn connect(&mut self, profile: Option<ServerProfile>) -> Result<Vec<Action>> {
        match self.state {
            ConnectionState::Closed => return Err(BridgeError::Stopped),
            state if state.is_active() => return Err(BridgeError::AlreadyActive(state)),
            _ => {}
        }
        if let Some(profile) = profile {
            profile.validate()?;
            self.config.server = profile;
            self.use_alt_nick = false;
        }

        self.aborted = false;
        self.attempt = 0;
        self.rejoin = None;
        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            tls = self.config.server.tls,
            "connect requested"
        );
        Ok(self.begin_connect())
    }

    /// Close the connection, or cancel a pending automatic reconnect.
    pub fn disconnect(&mut self) -> Result<Vec<Action>> {
        match self.state {
            ConnectionState::Closed => Err(BridgeError::Stopped),
            ConnectionState::Idle if self.reconnect_pending => {
                self.generation += 1;
                self.reconnect_pending = false;
                self.attempt = 0;
                info!("pending reconnect cancelled");
                let mut actions = Vec::new();
                self.diagnostic(DiagnosticKind::Info, "reconnect cancelled", &mut actions);
                self.notify_state(&mut actions);
                Ok(actions)
            }
            ConnectionState::Idle => Err(BridgeError::NotConnected),
            state => {
                info!(%state, "disconnect requested");
                let mut actions = Vec::new();
                if state == ConnectionState::Registered {
                    self.send("QUIT", &mut actions);
                }
                actions.extend(self.close(CloseCause::User));
                Ok(actions)
            }
        }
    }

    /// Close for good. Later connects fail with [`BridgeError::Stopped`].
    pub fn shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state.is_active() {
            if self.state == ConnectionState::Registered {
                self.send("QUIT", &mut actions);
            }
            actions.extend(self.close(CloseCause::User));
        }
        self.generation += 1;
        self.reconnect_pending = false;
        self.state = ConnectionState::Closed;
        info!("session shut down");
        self.notify_state(&mut actions);
        actions
    }

    /// The transport for `generation` is up.
    pub fn on_connected(&mut self, generation: u64) -> Vec<Action> {
        if !self.is_current(generation, "connected") || self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.state = ConnectionState::SocketOpen;
        info!(generation, "socket open");

        let timing = &self.config.timing;
        let register_delay = timing.register_delay();
        let timeout = register_delay + timing.registration_timeout();
        let mut actions = Vec::new();
        self.notify_state(&mut actions);
        actions.push(self.schedule(TimerKind::Register, register_delay));
        actions.push(self.schedule(TimerKind::RegistrationTimeout, timeout));
        actions
    }

    /// The transport for `generation` could not be opened.
    pub fn on_connect_failed(&mut self, generation: u64, reason: &str) -> Vec<Action> {
        if !self.is_current(generation, "connect failed") || self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        let server = &self.config.server;
        warn!(host = %server.host, port = server.port, error = %reason, "connect failed");
        let text = format!("connect to {}:{} failed: {}", server.host, server.port, reason);

        let mut actions = Vec::new();
        self.diagnostic(DiagnosticKind::Transport, text, &mut actions);
        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.notify_state(&mut actions);
        if self.attempt > 0 && self.may_reconnect() {
            actions.extend(self.schedule_reconnect());
        }
        actions
    }

    /// The transport for `generation` closed, cleanly or with `error`.
    pub fn on_closed(&mut self, generation: u64, error: Option<&str>) -> Vec<Action> {
        if !self.is_current(generation, "closed") || !self.state.is_active() {
            return Vec::new();
        }
        let mut actions = Vec::new();
        let text = match error {
            Some(e) => {
                warn!(generation, error = %e, "connection lost");
                format!("connection lost: {}", e)
            }
            None => {
                info!(generation, "server closed connection");
                "server closed connection".to_string()
            }
        };
        self.diagnostic(DiagnosticKind::Transport, text, &mut actions);
        let cause = if self.user_closed {
            CloseCause::User
        } else {
            CloseCause::Remote
        };
        actions.extend(self.close(cause));
        actions
    }

    /// A scheduled timer fired. Timers from an older generation, or whose
    /// precondition no longer holds, do nothing.
    pub fn on_timer(&mut self, timer: Timer) -> Vec<Action> {
        if !self.is_current(timer.generation, "timer") {
            return Vec::new();
        }
        match timer.kind {
            TimerKind::Register => self.begin_registration(),
            TimerKind::RegistrationTimeout if self.state.is_registering() => {
                let secs = self.config.timing.registration_timeout_secs;
                self.fail_registration(RegistrationError::Timeout(secs))
            }
            TimerKind::RegistrationTimeout => Vec::new(),
            TimerKind::Identify => self.identify(),
            TimerKind::AutoJoin => self.auto_join(),
            TimerKind::Reconnect => self.reconnect(),
            TimerKind::Stable => {
                if self.state == ConnectionState::Registered && self.attempt > 0 {
                    debug!(attempts = self.attempt, "registration held, backoff reset");
                    self.attempt = 0;
                }
                Vec::new()
            }
        }
    }

    pub(super) fn is_current(&self, generation: u64, event: &'static str) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, event, "ignoring stale event");
            return false;
        }
        true
    }

    fn schedule(&self, kind: TimerKind, delay: std::time::Duration) -> Action {
        Action::Schedule {
            timer: Timer {
                generation: self.generation,
                kind,
            },
            delay,
        }
    }

    fn registration_nick(&self) -> String {
        match (&self.config.server.alt_nick, self.use_alt_nick) {
            (Some(alt), true) => alt.clone(),
            _ => self.config.server.nick.clone(),
        }
    }

    fn begin_connect(&mut self) -> Vec<Action> {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.reconnect_pending = false;
        self.user_closed = false;
        self.framer.reset();
        self.sent_nick = self.registration_nick();
        self.nick = self.sent_nick.clone();
        self.self_mask = None;

        let server = &self.config.server;
        debug!(generation = self.generation, nick = %self.sent_nick, "opening transport");
        let mut actions = vec![Action::Open {
            generation: self.generation,
            host: server.host.clone(),
            port: server.port,
            tls: server.tls,
            timeout: self.config.timing.connect_timeout(),
        }];
        self.notify_state(&mut actions);
        actions
    }

    fn begin_registration(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::SocketOpen {
            return Vec::new();
        }
        self.state = ConnectionState::Registering;
        self.roster.clear();
        info!(generation = self.generation, nick = %self.sent_nick, "registering");

        let mut actions = vec![Action::Notify(BridgeEvent::RosterChanged)];
        self.notify_state(&mut actions);
        let server = &self.config.server;
        if let Some(password) = server.password.as_deref().filter(|p| !p.is_empty()) {
            self.send(&format!("PASS {}", password), &mut actions);
        }
        self.send(&format!("NICK {}", self.sent_nick), &mut actions);
        self.send(
            &format!("USER {} 0 * :{}", server.user, server.real_name),
            &mut actions,
        );
        actions
    }

    /// Handle RPL_WELCOME naming `welcomed`, with the reply's text.
    pub(super) fn complete_registration(&mut self, welcomed: &str, text: &str) -> Vec<Action> {
        if self.state != ConnectionState::Registering {
            debug!(state = %self.state, "ignoring welcome outside registration");
            return Vec::new();
        }
        if !irc_eq(welcomed, &self.sent_nick) {
            return self.fail_registration(RegistrationError::NickMismatch {
                expected: self.sent_nick.clone(),
                got: welcomed.to_string(),
            });
        }

        self.state = ConnectionState::Registered;
        self.nick = welcomed.to_string();
        self.use_alt_nick = false;
        self.self_mask = text
            .rsplit(' ')
            .next()
            .filter(|mask| split_prefix(mask).map_or(false, |(nick, _)| irc_eq(nick, welcomed)))
            .map(str::to_string);
        info!(generation = self.generation, nick = %self.nick, "registered");

        let mut actions = Vec::new();
        self.notify_state(&mut actions);
        if self.attempt > 0 {
            actions.push(self.schedule(TimerKind::Stable, self.config.reconnect.stable_after()));
        }
        let server = &self.config.server;
        if let Some(modes) = server.modes.as_deref().filter(|m| !m.is_empty()) {
            self.send(&format!("MODE {} {}", self.nick, modes), &mut actions);
        }
        if server.identify_nick.is_some() && server.identify_command.is_some() {
            actions.push(self.schedule(TimerKind::Identify, self.config.timing.identify_delay()));
        }
        let channels = self.rejoin.as_ref().unwrap_or(&server.channels);
        if !channels.is_empty() {
            actions.push(self.schedule(TimerKind::AutoJoin, self.config.timing.join_delay()));
        }
        actions
    }

    /// End the attempt after a registration error. No retry is scheduled.
    pub(super) fn fail_registration(&mut self, error: RegistrationError) -> Vec<Action> {
        warn!(error = %error, nick = %self.sent_nick, "registration failed");
        self.error_count += 1;
        let mut text = error.to_string();
        if error.is_nick_collision() {
            if let Some(alt) = &self.config.server.alt_nick {
                self.use_alt_nick = !self.use_alt_nick;
                let next = self.registration_nick();
                text = format!("{}; next connect will use {}", text, next);
                debug!(alt = %alt, next = %next, "toggled alternate nick");
            }
        }
        self.attempt = 0;

        let mut actions = Vec::new();
        self.diagnostic(DiagnosticKind::Registration, text, &mut actions);
        actions.extend(self.close(CloseCause::Registration));
        actions
    }

    /// Tear down the current connection and decide whether to retry.
    pub(super) fn close(&mut self, cause: CloseCause) -> Vec<Action> {
        let was_registered = self.state == ConnectionState::Registered;
        if was_registered {
            self.rejoin = Some(self.roster.joined_channels());
        }

        let mut actions = Vec::new();
        self.state = ConnectionState::Closing;
        self.notify_state(&mut actions);
        actions.push(Action::Close {
            generation: self.generation,
        });

        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.user_closed = false;
        self.framer.reset();
        self.roster.detach_all();
        info!(%cause, was_registered, "connection closed");
        actions.push(Action::Notify(BridgeEvent::RosterChanged));
        self.notify_state(&mut actions);

        if cause == CloseCause::Remote {
            if self.aborted {
                self.diagnostic(
                    DiagnosticKind::Abort,
                    "auto-reconnect disabled until the next explicit connect",
                    &mut actions,
                );
            } else if (was_registered || self.attempt > 0) && self.may_reconnect() {
                actions.extend(self.schedule_reconnect());
            }
        }
        actions
    }

    fn may_reconnect(&self) -> bool {
        self.config.reconnect.enabled && !self.aborted
    }

    fn schedule_reconnect(&mut self) -> Vec<Action> {
        let delay = self.config.reconnect.delay(self.attempt);
        self.attempt += 1;
        self.reconnect_pending = true;
        info!(attempt = self.attempt, delay_secs = delay.as_secs(), "reconnect scheduled");

        let mut actions = Vec::new();
        self.diagnostic(
            DiagnosticKind::Info,
            format!("reconnecting in {}s", delay.as_secs()),
            &mut actions,
        );
        actions.push(self.schedule(TimerKind::Reconnect, delay));
        actions
    }

    fn reconnect(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Idle || !self.reconnect_pending || self.aborted {
            return Vec::new();
        }
        info!(attempt = self.attempt, "reconnecting");
        self.begin_connect()
    }

    fn identify(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Registered {
            return Vec::new();
        }
        let server = &self.config.server;
        let (Some(target), Some(command)) = (&server.identify_nick, &server.identify_command) else {
            return Vec::new();
        };
        info!(target = %target, "identifying with services");
        let mut actions = Vec::new();
        self.send_quiet(&format!("PRIVMSG {} :{}", target, command), &mut actions);
        if matches!(actions.first(), Some(Action::Send { .. })) {
            // the target may not be literally NickServ, so mask by hand
            let verb = command.split(' ').next().unwrap_or_default();
            actions.push(Action::Notify(BridgeEvent::Outgoing {
                line: format!("PRIVMSG {} :{} ********", target, verb),
            }));
        }
        actions
    }

    fn auto_join(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Registered {
            return Vec::new();
        }
        let channels = match self.rejoin.take() {
            Some(channels) => channels,
            None => self.config.server.channels.clone(),
        };
        let mut actions = Vec::new();
        for channel in channels.iter().filter(|c| !self.roster.is_joined(c)) {
            self.send(&format!("JOIN {}", channel), &mut actions);
        }
        debug!(count = channels.len(), "auto-join sent");
        actions
    }
}
