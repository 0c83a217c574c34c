//! Channel and membership state.
//!
//! The [`Roster`] is the authoritative model of the channels this session
//! knows about. Only a self-JOIN creates an entry; every other event that
//! names an unknown channel is logged and dropped.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::casemap::{irc_eq, irc_to_lower};
use crate::mode::parse_channel_modes;

/// Channel membership privilege, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Owner,
    Admin,
    Op,
    HalfOp,
    Voice,
}

impl Privilege {
    /// Every marker in rank order.
    pub const MARKERS: &'static str = "~&@%+";

    pub fn marker(self) -> char {
        match self {
            Self::Owner => '~',
            Self::Admin => '&',
            Self::Op => '@',
            Self::HalfOp => '%',
            Self::Voice => '+',
        }
    }

    pub fn mode_letter(self) -> char {
        match self {
            Self::Owner => 'q',
            Self::Admin => 'a',
            Self::Op => 'o',
            Self::HalfOp => 'h',
            Self::Voice => 'v',
        }
    }

    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            '~' => Some(Self::Owner),
            '&' => Some(Self::Admin),
            '@' => Some(Self::Op),
            '%' => Some(Self::HalfOp),
            '+' => Some(Self::Voice),
            _ => None,
        }
    }

    pub fn from_mode_letter(c: char) -> Option<Self> {
        match c {
            'q' => Some(Self::Owner),
            'a' => Some(Self::Admin),
            'o' => Some(Self::Op),
            'h' => Some(Self::HalfOp),
            'v' => Some(Self::Voice),
            _ => None,
        }
    }
}

/// A channel member with at most one privilege marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub nick: String,
    pub privilege: Option<Privilege>,
}

impl Member {
    pub fn new(nick: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            privilege: None,
        }
    }

    /// Parse a NAMES entry such as `@bob`, `@+bob` or `+bob!u@h`.
    ///
    /// With several markers the first (highest) one is kept.
    pub fn parse(name: &str) -> Self {
        let bare = name.trim_start_matches(|c| Privilege::MARKERS.contains(c));
        let privilege = name.chars().next().and_then(Privilege::from_marker);
        let nick = bare.split('!').next().unwrap_or(bare);
        Self {
            nick: nick.to_string(),
            privilege,
        }
    }

    /// Identity comparison: case-insensitive, marker-insensitive.
    pub fn is(&self, nick: &str) -> bool {
        irc_eq(&self.nick, strip_marker(nick))
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = self.privilege {
            write!(f, "{}", p.marker())?;
        }
        f.write_str(&self.nick)
    }
}

impl Serialize for Member {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Characters a channel name may start with.
pub const CHANNEL_PREFIXES: &[char] = &['#', '&'];

/// Whether `target` names a channel rather than a nick.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(CHANNEL_PREFIXES)
}

/// Strip any leading privilege markers from a nick.
pub fn strip_marker(nick: &str) -> &str {
    nick.trim_start_matches(|c| Privilege::MARKERS.contains(c))
}

/// One channel the session knows about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    /// Canonical lower-cased key.
    pub name: String,
    /// Name as the server sent it.
    pub display_name: String,
    /// Empty means no topic.
    pub topic: String,
    pub members: Vec<Member>,
    pub joined: bool,
    /// Set by a self-KICK, cleared by the next self-JOIN.
    pub kicked: bool,
}

impl ChannelEntry {
    fn new(display_name: &str) -> Self {
        Self {
            name: irc_to_lower(display_name),
            display_name: display_name.to_string(),
            topic: String::new(),
            members: Vec::new(),
            joined: false,
            kicked: false,
        }
    }

    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.is(nick))
    }

    pub fn has_member(&self, nick: &str) -> bool {
        self.member(nick).is_some()
    }

    fn member_mut(&mut self, nick: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.is(nick))
    }

    fn remove_member(&mut self, nick: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| !m.is(nick));
        self.members.len() != before
    }

    fn leave(&mut self, kicked: bool) {
        self.topic.clear();
        self.members.clear();
        self.joined = false;
        self.kicked = kicked;
    }
}

/// All channels, in the order they were first joined.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Roster {
    channels: Vec<ChannelEntry>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> &[ChannelEntry] {
        &self.channels
    }

    pub fn get(&self, name: &str) -> Option<&ChannelEntry> {
        self.channels.iter().find(|c| irc_eq(&c.name, name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ChannelEntry> {
        self.channels.iter_mut().find(|c| irc_eq(&c.name, name))
    }

    /// Look up a channel an event refers to, logging when it is unknown.
    fn known_mut(&mut self, name: &str, event: &'static str) -> Option<&mut ChannelEntry> {
        let entry = self.channels.iter_mut().find(|c| irc_eq(&c.name, name));
        if entry.is_none() {
            warn!(channel = %name, event, "dropping event for unknown channel");
        }
        entry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_joined(&self, name: &str) -> bool {
        self.get(name).map_or(false, |c| c.joined)
    }

    /// Display names of every joined channel.
    pub fn joined_channels(&self) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| c.joined)
            .map(|c| c.display_name.clone())
            .collect()
    }

    /// Canonical names of the channels where `nick` is a member.
    pub fn channels_with_member(&self, nick: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| c.has_member(nick))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Drop every channel. Called when a new registration begins.
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    /// Mark every channel parted after the connection is lost. Members and
    /// topics stay visible until the next registration clears them.
    pub fn detach_all(&mut self) {
        for entry in &mut self.channels {
            entry.joined = false;
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ChannelEntry> {
        let idx = self.channels.iter().position(|c| irc_eq(&c.name, name))?;
        Some(self.channels.remove(idx))
    }

    /// Forget a channel's member list ahead of a fresh NAMES reply.
    pub fn clear_members(&mut self, name: &str) -> bool {
        match self.get_mut(name) {
            Some(entry) => {
                entry.members.clear();
                true
            }
            None => false,
        }
    }

    pub fn on_join(&mut self, channel: &str, actor: &str, own_nick: &str) {
        if irc_eq(actor, own_nick) {
            let idx = match self.channels.iter().position(|c| irc_eq(&c.name, channel)) {
                Some(idx) => idx,
                None => {
                    self.channels.push(ChannelEntry::new(channel));
                    self.channels.len() - 1
                }
            };
            let entry = &mut self.channels[idx];
            entry.display_name = channel.to_string();
            entry.topic.clear();
            entry.members.clear();
            entry.joined = true;
            entry.kicked = false;
            debug!(channel = %channel, "joined");
        } else if let Some(entry) = self.known_mut(channel, "JOIN") {
            if !entry.has_member(actor) {
                entry.members.push(Member::new(strip_marker(actor)));
            }
        }
    }

    pub fn on_part(&mut self, channel: &str, actor: &str, own_nick: &str) {
        let is_self = irc_eq(actor, own_nick);
        if let Some(entry) = self.known_mut(channel, "PART") {
            if is_self {
                entry.leave(false);
            } else {
                entry.remove_member(actor);
            }
        }
    }

    pub fn on_kick(&mut self, channel: &str, target: &str, own_nick: &str) {
        let is_self = irc_eq(target, own_nick);
        if let Some(entry) = self.known_mut(channel, "KICK") {
            if is_self {
                entry.leave(true);
            } else {
                entry.remove_member(target);
            }
        }
    }

    pub fn on_quit(&mut self, nick: &str) {
        for entry in &mut self.channels {
            entry.remove_member(nick);
        }
    }

    /// Rename `old` to `new` everywhere, keeping markers.
    pub fn on_nick_change(&mut self, old: &str, new: &str) {
        let new = strip_marker(new);
        for entry in &mut self.channels {
            if let Some(member) = entry.member_mut(old) {
                member.nick = new.to_string();
            }
        }
    }

    pub fn on_topic(&mut self, channel: &str, topic: &str) {
        if let Some(entry) = self.known_mut(channel, "TOPIC") {
            entry.topic = topic.to_string();
        }
    }

    /// Accumulate one 353 reply's space-separated names.
    pub fn on_names_reply(&mut self, channel: &str, names: &str) {
        if let Some(entry) = self.known_mut(channel, "NAMES") {
            for name in names.split(' ').filter(|n| !n.is_empty()) {
                let member = Member::parse(name);
                if member.nick.is_empty() {
                    continue;
                }
                match entry.member_mut(&member.nick) {
                    Some(existing) => existing.privilege = member.privilege,
                    None => entry.members.push(member),
                }
            }
        }
    }

    /// Apply the privilege letters of a channel MODE change.
    pub fn on_mode_change(&mut self, channel: &str, modes: &str, targets: &[&str]) {
        let Some(entry) = self.known_mut(channel, "MODE") else {
            return;
        };
        for change in parse_channel_modes(modes, targets) {
            let (Some(privilege), Some(nick)) =
                (Privilege::from_mode_letter(change.letter), change.arg.as_deref())
            else {
                continue;
            };
            let Some(member) = entry.member_mut(nick) else {
                debug!(channel = %channel, nick = %nick, "mode target not in member list");
                continue;
            };
            if change.grant {
                member.privilege = Some(privilege);
            } else if member.privilege == Some(privilege) {
                member.privilege = None;
            }
        }
    }
}
