//! Per-channel replay cache.
//!
//! Recently seen lines are kept in bounded rings so a reconnecting
//! consumer can be brought up to date. Lines are routed to a buffer keyed
//! by canonical channel name, or to the `default` buffer when they carry
//! no channel or when the channel-buffer cap is reached.
//!
//! QUIT and NICK name no channel, so they are copied into the buffer of
//! every channel the nick is in, with the command rewritten to
//! `cachedQUIT <channel>` / `cachedNICK <channel>` so replay can attribute
//! them. The roster must therefore still hold the pre-event membership
//! when [`MessageCache::add_message`] is called.

mod persist;
mod ring;

use serde::Serialize;
use tracing::{debug, warn};

use crate::casemap::{irc_eq, irc_to_lower};
use crate::config::CacheConfig;
use crate::message::{parse_line, RawLine};
use crate::response::is_replay_excluded;
use crate::roster::{is_channel_name, Roster};

pub use self::persist::{load_snapshot, restore_on_startup, save_snapshot, CacheSnapshot};
pub use self::ring::RingBuffer;

/// Key of the catch-all buffer.
pub const DEFAULT_KEY: &str = "default";

/// Commands whose first parameter is the channel they belong to.
const CHANNEL_SCOPED: &[&str] = &["JOIN", "KICK", "MODE", "NOTICE", "PART", "PRIVMSG", "TOPIC"];

/// Cache occupancy summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Lines per buffer.
    pub capacity: usize,
    /// Buffers in use, `default` included.
    pub buffer_count: usize,
    pub used_lines: usize,
    pub total_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct MessageCache {
    capacity: usize,
    max_channel_buffers: usize,
    default: RingBuffer,
    channels: Vec<(String, RingBuffer)>,
}

impl MessageCache {
    pub fn new(capacity: usize, max_channel_buffers: usize) -> Self {
        Self {
            capacity,
            max_channel_buffers,
            default: RingBuffer::new(capacity),
            channels: Vec::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.max_channel_buffers)
    }

    /// Route and store one raw line.
    pub fn add_message(&mut self, line: &str, roster: &Roster, own_nick: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        let raw = parse_line(line);
        if raw.command.is_empty() {
            debug!(line = %line, "not caching line without command");
            return;
        }
        if is_excluded(raw.command) {
            return;
        }

        let command = raw.command.to_ascii_uppercase();
        match command.as_str() {
            "QUIT" => {
                let nick = source_nick(&raw);
                let channels = roster.channels_with_member(nick);
                if channels.is_empty() {
                    self.write(DEFAULT_KEY, line.to_string());
                }
                for channel in channels {
                    let tagged = retag(line, &raw, "cachedQUIT", &channel);
                    self.write(&channel, tagged);
                }
            }
            "NICK" => {
                let nick = source_nick(&raw);
                let channels = roster.channels_with_member(nick);
                let is_self = irc_eq(nick, own_nick);
                if is_self || channels.is_empty() {
                    self.write(DEFAULT_KEY, line.to_string());
                }
                for channel in channels {
                    let tagged = retag(line, &raw, "cachedNICK", &channel);
                    self.write(&channel, tagged);
                }
            }
            cmd if CHANNEL_SCOPED.contains(&cmd) => match raw.params.first() {
                // a target list never names a single buffer
                Some(target) if is_channel_name(target) && !target.contains(',') => {
                    self.write(&irc_to_lower(target), line.to_string());
                }
                _ => self.write(DEFAULT_KEY, line.to_string()),
            },
            _ => self.write(DEFAULT_KEY, line.to_string()),
        }
    }

    /// Drop one channel's buffer. Returns whether it existed.
    pub fn prune_channel(&mut self, name: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|(key, _)| !irc_eq(key, name));
        self.channels.len() != before
    }

    /// Drop every line and every channel buffer.
    pub fn erase_all(&mut self) {
        self.default.clear();
        self.channels.clear();
    }

    /// Every cached line, `default` first, then each channel still in the
    /// roster, each buffer oldest first.
    pub fn all_messages(&self, roster: &Roster) -> Vec<String> {
        let live = self
            .channels
            .iter()
            .filter(|(key, _)| roster.contains(key))
            .map(|(_, ring)| ring);
        std::iter::once(&self.default)
            .chain(live)
            .flat_map(RingBuffer::iter)
            .map(str::to_string)
            .collect()
    }

    /// Lines of a single buffer, oldest first.
    pub fn buffer(&self, key: &str) -> Option<&RingBuffer> {
        if key == DEFAULT_KEY {
            Some(&self.default)
        } else {
            self.channels
                .iter()
                .find(|(k, _)| irc_eq(k, key))
                .map(|(_, ring)| ring)
        }
    }

    pub fn info(&self) -> CacheInfo {
        let rings = || std::iter::once(&self.default).chain(self.channels.iter().map(|(_, r)| r));
        CacheInfo {
            capacity: self.capacity,
            buffer_count: 1 + self.channels.len(),
            used_lines: rings().map(RingBuffer::used).sum(),
            total_bytes: rings().map(RingBuffer::bytes).sum(),
        }
    }

    fn write(&mut self, key: &str, line: String) {
        if key == DEFAULT_KEY {
            self.default.push(line);
            return;
        }
        if let Some((_, ring)) = self.channels.iter_mut().find(|(k, _)| k == key) {
            ring.push(line);
            return;
        }
        if self.channels.len() < self.max_channel_buffers {
            debug!(channel = %key, "creating cache buffer");
            let mut ring = RingBuffer::new(self.capacity);
            ring.push(line);
            self.channels.push((key.to_string(), ring));
        } else {
            debug!(channel = %key, "channel buffer cap reached, using default");
            self.default.push(line);
        }
    }

    /// Capture buffers and cursors for persistence.
    pub fn to_snapshot(&self, timestamp: i64) -> CacheSnapshot {
        let mut snapshot = CacheSnapshot::new(timestamp);
        snapshot.insert(DEFAULT_KEY, &self.default);
        for (key, ring) in &self.channels {
            snapshot.insert(key, ring);
        }
        snapshot
    }

    /// Replace contents with a persisted snapshot.
    ///
    /// Buffers whose stored size differs from the configured capacity are
    /// replayed line by line, so a capacity change keeps the newest lines.
    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.erase_all();
        for (key, slots, cursor) in snapshot.into_buffers() {
            let ring = if slots.len() == self.capacity && cursor < slots.len() {
                RingBuffer::from_parts(slots, cursor)
                    .unwrap_or_else(|| RingBuffer::new(self.capacity))
            } else {
                replay_into(&slots, cursor, self.capacity)
            };

            if key == DEFAULT_KEY {
                self.default = ring;
            } else if !is_channel_name(&key) {
                warn!(key = %key, "skipping persisted buffer with invalid key");
            } else if self.channels.len() < self.max_channel_buffers {
                self.channels.push((irc_to_lower(&key), ring));
            } else {
                warn!(channel = %key, "skipping persisted buffer beyond channel cap");
            }
        }
    }
}

fn replay_into(slots: &[Option<String>], cursor: usize, capacity: usize) -> RingBuffer {
    let mut ring = RingBuffer::new(capacity);
    let (newer, older) = slots.split_at(cursor.min(slots.len()));
    for line in older.iter().chain(newer).flatten() {
        ring.push(line.clone());
    }
    ring
}

fn is_excluded(command: &str) -> bool {
    if command.eq_ignore_ascii_case("PING") || command.eq_ignore_ascii_case("PONG") {
        return true;
    }
    command.len() == 3
        && command
            .parse::<u16>()
            .map_or(false, is_replay_excluded)
}

fn source_nick<'a>(raw: &RawLine<'a>) -> &'a str {
    raw.prefix
        .map(|p| p.split('!').next().unwrap_or(p))
        .unwrap_or("")
}

/// Replace the command token with `<tag> <channel>`.
fn retag(line: &str, raw: &RawLine<'_>, tag: &str, channel: &str) -> String {
    let start = raw.command_offset;
    let end = start + raw.command.len();
    format!("{}{} {}{}", &line[..start], tag, channel, &line[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "me";

    fn roster() -> Roster {
        let mut roster = Roster::new();
        for channel in ["#a", "#b", "#c"] {
            roster.on_join(channel, ME, ME);
        }
        roster.on_names_reply("#a", "@bob me");
        roster.on_names_reply("#b", "+bob me");
        roster.on_names_reply("#c", "carol me");
        roster
    }

    fn lines(ring: Option<&RingBuffer>) -> Vec<&str> {
        ring.map(|r| r.iter().collect()).unwrap_or_default()
    }

    #[test]
    fn test_channel_scoped_routing() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":bob!u@h PRIVMSG #A :hi", &roster, ME);
        cache.add_message(":bob!u@h JOIN #b", &roster, ME);
        cache.add_message(":bob!u@h JOIN :#c", &roster, ME);
        cache.add_message(":bob!u@h PRIVMSG me :psst", &roster, ME);
        cache.add_message(":srv MODE me +i", &roster, ME);

        assert_eq!(lines(cache.buffer("#a")), vec![":bob!u@h PRIVMSG #A :hi"]);
        assert_eq!(lines(cache.buffer("#b")), vec![":bob!u@h JOIN #b"]);
        assert_eq!(lines(cache.buffer("#c")), vec![":bob!u@h JOIN :#c"]);
        assert_eq!(
            lines(cache.buffer(DEFAULT_KEY)),
            vec![":bob!u@h PRIVMSG me :psst", ":srv MODE me +i"]
        );
    }

    #[test]
    fn test_quit_fan_out() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":bob!u@h QUIT :gone fishing", &roster, ME);

        assert_eq!(lines(cache.buffer("#a")), vec![":bob!u@h cachedQUIT #a :gone fishing"]);
        assert_eq!(lines(cache.buffer("#b")), vec![":bob!u@h cachedQUIT #b :gone fishing"]);
        assert!(cache.buffer("#c").is_none());
        assert!(lines(cache.buffer(DEFAULT_KEY)).is_empty());
    }

    #[test]
    fn test_quit_unknown_nick_goes_default() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":zed!u@h QUIT :bye", &roster, ME);
        assert_eq!(lines(cache.buffer(DEFAULT_KEY)), vec![":zed!u@h QUIT :bye"]);
    }

    #[test]
    fn test_nick_fan_out_and_self_copy() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":bob!u@h NICK :robert", &roster, ME);
        assert_eq!(lines(cache.buffer("#a")), vec![":bob!u@h cachedNICK #a :robert"]);
        assert!(lines(cache.buffer(DEFAULT_KEY)).is_empty());

        cache.add_message(":me!u@h NICK :myself", &roster, ME);
        assert_eq!(lines(cache.buffer(DEFAULT_KEY)), vec![":me!u@h NICK :myself"]);
        assert_eq!(lines(cache.buffer("#c")), vec![":me!u@h cachedNICK #c :myself"]);
    }

    #[test]
    fn test_exclusions() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":srv 353 me = #a :@bob me", &roster, ME);
        cache.add_message(":srv 366 me #a :End of /NAMES list.", &roster, ME);
        cache.add_message(":srv 333 me #a bob 1700000000", &roster, ME);
        cache.add_message("PING :srv", &roster, ME);
        cache.add_message(":srv 332 me #a :topic", &roster, ME);
        assert_eq!(cache.info().used_lines, 1);
    }

    #[test]
    fn test_ring_keeps_last_capacity_lines() {
        let roster = roster();
        let mut cache = MessageCache::new(4, 5);
        for i in 0..7 {
            cache.add_message(&format!(":bob!u@h PRIVMSG #a :{}", i), &roster, ME);
        }
        let expected: Vec<String> = (3..7).map(|i| format!(":bob!u@h PRIVMSG #a :{}", i)).collect();
        assert_eq!(cache.all_messages(&roster), expected);
    }

    #[test]
    fn test_buffer_cap_falls_back_to_default() {
        let mut roster = Roster::new();
        let mut cache = MessageCache::new(10, 2);
        for channel in ["#one", "#two", "#three"] {
            roster.on_join(channel, ME, ME);
            cache.add_message(&format!(":me!u@h JOIN {}", channel), &roster, ME);
        }
        assert_eq!(cache.info().buffer_count, 3);
        assert!(cache.buffer("#three").is_none());
        assert_eq!(lines(cache.buffer(DEFAULT_KEY)), vec![":me!u@h JOIN #three"]);

        assert!(cache.prune_channel("#ONE"));
        cache.add_message(":me!u@h PRIVMSG #three :now", &roster, ME);
        assert_eq!(lines(cache.buffer("#three")), vec![":me!u@h PRIVMSG #three :now"]);
    }

    #[test]
    fn test_all_messages_filters_by_roster() {
        let mut roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":srv NOTICE * :hello", &roster, ME);
        cache.add_message(":bob!u@h PRIVMSG #a :in a", &roster, ME);
        cache.add_message(":carol!u@h PRIVMSG #c :in c", &roster, ME);
        roster.remove("#a");
        assert_eq!(
            cache.all_messages(&roster),
            vec![":srv NOTICE * :hello", ":carol!u@h PRIVMSG #c :in c"]
        );
    }

    #[test]
    fn test_info_and_erase() {
        let roster = roster();
        let mut cache = MessageCache::new(10, 5);
        cache.add_message(":bob!u@h PRIVMSG #a :hey", &roster, ME);
        cache.add_message("NOTICE x :y", &roster, ME);
        let info = cache.info();
        assert_eq!(info.capacity, 10);
        assert_eq!(info.buffer_count, 2);
        assert_eq!(info.used_lines, 2);
        assert_eq!(info.total_bytes, ":bob!u@h PRIVMSG #a :hey".len() + "NOTICE x :y".len());

        cache.erase_all();
        assert_eq!(cache.info().used_lines, 0);
        assert_eq!(cache.info().buffer_count, 1);
    }

    #[test]
    fn test_snapshot_restore_resizes() {
        let roster = roster();
        let mut cache = MessageCache::new(4, 5);
        for i in 0..6 {
            cache.add_message(&format!(":bob!u@h PRIVMSG #a :{}", i), &roster, ME);
        }
        let snapshot = cache.to_snapshot(0);

        let mut same = MessageCache::new(4, 5);
        same.restore(snapshot.clone());
        assert_eq!(same.all_messages(&roster), cache.all_messages(&roster));

        let mut smaller = MessageCache::new(2, 5);
        smaller.restore(snapshot);
        assert_eq!(
            smaller.all_messages(&roster),
            vec![":bob!u@h PRIVMSG #a :4", ":bob!u@h PRIVMSG #a :5"]
        );
    }

    #[test]
    fn test_target_list_stays_in_default() {
        let roster = roster();
        let mut cache = MessageCache::new(4, 5);
        cache.add_message(":me!u@h PRIVMSG #a,bob :hi", &roster, ME);
        assert_eq!(cache.info().buffer_count, 1);
        assert_eq!(lines(Some(&cache.default)), vec![":me!u@h PRIVMSG #a,bob :hi"]);
    }
}
