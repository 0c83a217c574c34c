//! CTCP auto-responder.
//!
//! Answers CLIENTINFO, PING, TIME and VERSION requests embedded in a
//! PRIVMSG. Replies are rate limited per fixed window; excess requests
//! are ignored without error.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CtcpConfig;

/// CTCP framing byte.
pub const DELIM: char = '\x01';

/// Commands answered, as listed in the CLIENTINFO reply.
pub const SUPPORTED: &[&str] = &["ACTION", "CLIENTINFO", "PING", "TIME", "VERSION"];

/// A CTCP request split into its command and argument text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtcpRequest<'a> {
    pub command: &'a str,
    pub argument: &'a str,
}

impl<'a> CtcpRequest<'a> {
    /// Parse message text. `None` unless it starts with the delimiter.
    pub fn parse(text: &'a str) -> Option<Self> {
        let body = text.strip_prefix(DELIM)?;
        let body = match body.find(DELIM) {
            Some(end) => &body[..end],
            None => body,
        };
        let (command, argument) = match body.split_once(' ') {
            Some((command, argument)) => (command, argument),
            None => (body, ""),
        };
        if command.is_empty() {
            return None;
        }
        Some(Self { command, argument })
    }
}

/// Lines to emit for one answered request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CtcpReply {
    /// NOTICE to send upstream.
    pub line: String,
    /// Copy attributed to ourselves, for the cache and consumers.
    pub echo: String,
}

#[derive(Debug)]
pub struct CtcpResponder {
    enabled: bool,
    window: Duration,
    max_replies: u32,
    version: String,
    window_start: Option<Instant>,
    sent: u32,
}

impl CtcpResponder {
    pub fn new(config: &CtcpConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_secs(config.window_secs),
            max_replies: config.max_replies,
            version: config.version.clone(),
            window_start: None,
            sent: 0,
        }
    }

    /// Answer `text` sent by `requester`, if it is a supported request and
    /// the flood window allows it. `self_mask` is our own `nick!user@host`.
    pub fn handle(
        &mut self,
        requester: &str,
        text: &str,
        self_mask: &str,
        now: Instant,
    ) -> Option<CtcpReply> {
        if !self.enabled {
            return None;
        }
        let request = CtcpRequest::parse(text)?;
        let body = self.answer(&request)?;

        if !self.allow(now) {
            debug!(requester, command = request.command, "ctcp reply suppressed by flood control");
            return None;
        }

        let notice = format!("NOTICE {} :{}{}{}", requester, DELIM, body, DELIM);
        Some(CtcpReply {
            echo: format!(":{} {}", self_mask, notice),
            line: notice,
        })
    }

    fn answer(&self, request: &CtcpRequest<'_>) -> Option<String> {
        let command = request.command.to_ascii_uppercase();
        let body = match command.as_str() {
            "CLIENTINFO" => format!("CLIENTINFO {}", SUPPORTED.join(" ")),
            "PING" if request.argument.is_empty() => "PING".to_string(),
            "PING" => format!("PING {}", request.argument),
            "TIME" => format!("TIME {}", chrono::Local::now().format("%a %b %e %H:%M:%S %Y")),
            "VERSION" => format!("VERSION {}", self.version),
            _ => return None,
        };
        Some(body)
    }

    fn allow(&mut self, now: Instant) -> bool {
        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < self.window => {}
            _ => {
                self.window_start = Some(now);
                self.sent = 0;
            }
        }
        if self.sent >= self.max_replies {
            return false;
        }
        self.sent += 1;
        true
    }
}
