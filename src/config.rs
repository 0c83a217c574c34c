//! Bridge configuration.
//!
//! Loaded from TOML. Only `[server]` is required; every other section has
//! defaults.
//!
//! ```toml
//! [server]
//! host = "irc.libera.chat"
//! port = 6697
//! tls = true
//! nick = "bridgebot"
//! user = "bridge"
//! real_name = "IRC bridge"
//! channels = ["#rust"]
//!
//! [reconnect]
//! delays_secs = [10, 60, 120]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Full bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub server: ServerProfile,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ctcp: CtcpConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the server.
    pub fn with_server(server: ServerProfile) -> Self {
        Self {
            server,
            reconnect: ReconnectConfig::default(),
            timing: TimingConfig::default(),
            cache: CacheConfig::default(),
            ctcp: CtcpConfig::default(),
            outbound: OutboundConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be positive".into()));
        }
        if self.reconnect.enabled && self.reconnect.delays_secs.is_empty() {
            return Err(ConfigError::Invalid(
                "reconnect.delays_secs must not be empty when reconnect is enabled".into(),
            ));
        }
        if self.ctcp.window_secs == 0 {
            return Err(ConfigError::Invalid("ctcp.window_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Upstream server and identity.
///
/// Read-only at runtime except for the live nickname, which the session
/// tracks separately.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerProfile {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Server password sent as PASS.
    pub password: Option<String>,
    pub nick: String,
    /// Used on the next explicit connect after a nickname collision.
    pub alt_nick: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_real_name")]
    pub real_name: String,
    /// User mode string applied after registration, e.g. `+i`.
    pub modes: Option<String>,
    /// Services nick to identify with, e.g. `NickServ`.
    pub identify_nick: Option<String>,
    /// Text sent to `identify_nick`, e.g. `IDENTIFY secret`.
    pub identify_command: Option<String>,
    /// Channels joined after the first registration.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_port() -> u16 {
    6667
}

fn default_user() -> String {
    "bridge".to_string()
}

fn default_real_name() -> String {
    "slirc-bridge".to_string()
}

impl ServerProfile {
    /// A profile with only the required fields set.
    pub fn new(host: impl Into<String>, port: u16, nick: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            password: None,
            nick: nick.into(),
            alt_nick: None,
            user: default_user(),
            real_name: default_real_name(),
            modes: None,
            identify_nick: None,
            identify_command: None,
            channels: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.nick.is_empty() || self.nick.contains([' ', '\r', '\n']) {
            return Err(ConfigError::Invalid(format!(
                "server.nick is not a valid nickname: {:?}",
                self.nick
            )));
        }
        Ok(())
    }

    /// Secret-free view for state snapshots.
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
            nick: self.nick.clone(),
            alt_nick: self.alt_nick.clone(),
            user: self.user.clone(),
            real_name: self.real_name.clone(),
            modes: self.modes.clone(),
            identify_nick: self.identify_nick.clone(),
            channels: self.channels.clone(),
        }
    }
}

/// [`ServerProfile`] without password or identify command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub nick: String,
    pub alt_nick: Option<String>,
    pub user: String,
    pub real_name: String,
    pub modes: Option<String>,
    pub identify_nick: Option<String>,
    pub channels: Vec<String>,
}

/// Automatic reconnect policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Retry delays; the last one repeats once the table is exhausted.
    #[serde(default = "default_delays")]
    pub delays_secs: Vec<u64>,
    /// How long a registration must hold before the delay table restarts.
    #[serde(default = "default_stable_secs")]
    pub stable_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delays_secs: default_delays(),
            stable_secs: default_stable_secs(),
        }
    }
}

impl ReconnectConfig {
    /// Delay for the `attempt`-th consecutive retry (0-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        let secs = self
            .delays_secs
            .get(attempt)
            .or_else(|| self.delays_secs.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_delays() -> Vec<u64> {
    vec![10, 60, 120, 180, 300, 600, 900]
}

fn default_stable_secs() -> u64 {
    60
}

/// Lifecycle delays and timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_timeout_secs: u64,
    /// Pause between socket open and sending registration.
    pub register_delay_ms: u64,
    pub registration_timeout_secs: u64,
    pub identify_delay_secs: u64,
    pub join_delay_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 20,
            register_delay_ms: 1500,
            registration_timeout_secs: 30,
            identify_delay_secs: 5,
            join_delay_secs: 8,
        }
    }
}

impl TimingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn register_delay(&self) -> Duration {
        Duration::from_millis(self.register_delay_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn identify_delay(&self) -> Duration {
        Duration::from_secs(self.identify_delay_secs)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_secs(self.join_delay_secs)
    }
}

/// Replay cache sizing and persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lines per buffer.
    pub capacity: usize,
    /// Channel buffers beyond `default`.
    pub max_channel_buffers: usize,
    /// Where to persist the cache on shutdown. Unset disables persistence.
    pub persist_path: Option<PathBuf>,
    /// Oldest snapshot accepted on startup.
    pub max_restore_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_channel_buffers: 5,
            persist_path: None,
            max_restore_age_secs: 300,
        }
    }
}

/// CTCP auto-responder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CtcpConfig {
    pub enabled: bool,
    /// Flood-control window.
    pub window_secs: u64,
    /// Replies allowed per window.
    pub max_replies: u32,
    /// VERSION reply text.
    pub version: String,
}

impl Default for CtcpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 5,
            max_replies: 3,
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Consumer command handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboundConfig {
    /// Echo our own PRIVMSG/NOTICE locally. Turn off for servers that
    /// echo them back (IRCv3 `echo-message`).
    pub synthesize_echo: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            synthesize_echo: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        host = "irc.example.net"
        nick = "bridgebot"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = BridgeConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.server.port, 6667);
        assert!(!config.server.tls);
        assert_eq!(config.server.user, "bridge");
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.max_channel_buffers, 5);
        assert!(config.reconnect.enabled);
        assert_eq!(config.reconnect.stable_secs, 60);
        assert_eq!(config.ctcp.max_replies, 3);
        assert!(config.outbound.synthesize_echo);
    }

    #[test]
    fn test_full_config() {
        let config = BridgeConfig::from_toml(
            r##"
            [server]
            host = "irc.example.net"
            port = 6697
            tls = true
            password = "pw"
            nick = "bot"
            alt_nick = "bot_"
            modes = "+i"
            identify_nick = "NickServ"
            identify_command = "IDENTIFY hunter2"
            channels = ["#a", "#b"]

            [reconnect]
            delays_secs = [1, 2]

            [cache]
            capacity = 10
            persist_path = "/tmp/cache.json"

            [outbound]
            synthesize_echo = false
            "##,
        )
        .unwrap();
        assert_eq!(config.server.channels, vec!["#a", "#b"]);
        assert_eq!(config.reconnect.delays_secs, vec![1, 2]);
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.max_channel_buffers, 5);
        assert!(!config.outbound.synthesize_echo);
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = BridgeConfig::from_toml(
            r#"
            [server]
            host = "h"
            nick = "n"
            password = "secret"
            identify_command = "IDENTIFY secret"
            "#,
        )
        .unwrap();
        let json = serde_json::to_string(&config.server.summary()).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            BridgeConfig::from_toml("[server]\nhost = \"\"\nnick = \"n\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("[server]\nhost = \"h\"\nnick = \"a b\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("[server]\nhost = \"h\"\nnick = \"n\"\n[reconnect]\ndelays_secs = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("[server]\nhost = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_reconnect_delay_holds_last() {
        let reconnect = ReconnectConfig::default();
        let delays: Vec<u64> = (0..9).map(|i| reconnect.delay(i).as_secs()).collect();
        assert_eq!(delays, vec![10, 60, 120, 180, 300, 600, 900, 900, 900]);
    }
}
