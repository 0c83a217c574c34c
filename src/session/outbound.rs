//! Consumer command filtering.
//!
//! A consumer line is planned first, then validated by the writer, and
//! only then are its side effects applied, so a rejected line leaves no
//! trace in the roster or the cache.

use tracing::debug;

use super::{Action, BridgeSession, ConnectionState};
use crate::error::Rejection;
use crate::event::BridgeEvent;
use crate::message::parse_line;
use crate::roster::is_channel_name;
use crate::writer::redact;

/// Shortest channel name worth sending, prefix included.
const MIN_CHANNEL_LEN: usize = 2;

#[derive(Debug, Default)]
struct OutboundPlan {
    /// Replacement line when some targets were filtered out.
    rewritten: Option<String>,
    /// Channels whose member lists a NAMES reply will refill.
    clear_members: Vec<String>,
    /// Per-target lines to echo back as self-authored, one per target.
    echoes: Vec<String>,
    quits: bool,
}

impl BridgeSession {
    /// Filter, validate and queue a consumer-authored line.
    pub fn submit(&mut self, text: &str) -> Result<Vec<Action>, Rejection> {
        let text = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);
        if text.contains(['\r', '\n']) {
            return Err(Rejection::LineBreak);
        }
        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }
        if self.state != ConnectionState::Registered {
            return Err(Rejection::NotConnected);
        }

        let plan = self.plan(text)?;
        let line = plan.rewritten.as_deref().unwrap_or(text);
        let prepared = self.writer.prepare(line.as_bytes())?;
        debug!(generation = self.generation, line = %prepared.mirror, "consumer send");

        let mut actions = vec![
            Action::Send {
                generation: self.generation,
                line: prepared.wire,
            },
            Action::Notify(BridgeEvent::Outgoing {
                line: prepared.mirror,
            }),
        ];

        let mut cleared = false;
        for channel in &plan.clear_members {
            cleared |= self.roster.clear_members(channel);
        }
        if cleared {
            actions.push(Action::Notify(BridgeEvent::RosterChanged));
        }
        for body in &plan.echoes {
            let echo = format!(":{} {}", self.self_mask(), redact(body));
            self.cache.add_message(&echo, &self.roster, &self.nick);
            actions.push(Action::Notify(BridgeEvent::Line { line: echo }));
        }
        if plan.quits {
            self.user_closed = true;
        }
        Ok(actions)
    }

    fn plan(&self, line: &str) -> Result<OutboundPlan, Rejection> {
        let raw = parse_line(line);
        let mut plan = OutboundPlan::default();

        match raw.command.to_ascii_uppercase().as_str() {
            "JOIN" => {
                let Some(targets) = raw.params.first() else {
                    return Ok(plan);
                };
                let keys: Vec<&str> = raw
                    .params
                    .get(1)
                    .map(|k| k.split(',').collect())
                    .unwrap_or_default();
                let mut kept = Vec::new();
                let mut kept_keys = Vec::new();
                let mut refused = None;
                for (i, channel) in targets.split(',').enumerate() {
                    match self.check_join(channel) {
                        Ok(()) => {
                            kept.push(channel);
                            if let Some(key) = keys.get(i) {
                                kept_keys.push(*key);
                            }
                        }
                        Err(e) => {
                            debug!(channel = %channel, reason = %e, "join target filtered");
                            refused.get_or_insert(e);
                        }
                    }
                }
                if kept.is_empty() {
                    return Err(refused.unwrap_or(Rejection::Empty));
                }
                if refused.is_some() {
                    let mut rewritten = format!("{} {}", raw.command, kept.join(","));
                    if !kept_keys.is_empty() {
                        rewritten.push(' ');
                        rewritten.push_str(&kept_keys.join(","));
                    }
                    plan.rewritten = Some(rewritten);
                }
                plan.clear_members = kept.iter().map(|c| c.to_string()).collect();
            }
            "NAMES" => {
                if let Some(targets) = raw.params.first() {
                    plan.clear_members = targets
                        .split(',')
                        .filter(|c| self.roster.contains(c))
                        .map(str::to_string)
                        .collect();
                }
            }
            "PRIVMSG" | "NOTICE" => {
                if let Some(targets) = raw.params.first() {
                    for target in targets.split(',') {
                        if is_channel_name(target) && !self.roster.is_joined(target) {
                            return Err(Rejection::NotJoined(target.to_string()));
                        }
                    }
                    if self.config.outbound.synthesize_echo && raw.params.len() >= 2 {
                        let body = raw.params[1..].join(" ");
                        plan.echoes = targets
                            .split(',')
                            .filter(|t| !t.is_empty())
                            .map(|t| format!("{} {} :{}", raw.command, t, body))
                            .collect();
                    }
                }
            }
            "QUIT" => plan.quits = true,
            _ => {}
        }
        Ok(plan)
    }

    fn check_join(&self, channel: &str) -> Result<(), Rejection> {
        if channel.chars().count() < MIN_CHANNEL_LEN {
            return Err(Rejection::ChannelNameTooShort(channel.to_string()));
        }
        if self.roster.is_joined(channel) {
            return Err(Rejection::AlreadyJoined(channel.to_string()));
        }
        Ok(())
    }
}
