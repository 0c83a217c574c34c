use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle of the single upstream connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Idle,
    /// Transport connect in flight.
    Connecting,
    /// Socket up, registration not yet sent.
    SocketOpen,
    /// PASS/NICK/USER sent, awaiting 001.
    Registering,
    /// Received 001.
    Registered,
    /// Tearing the socket down.
    Closing,
    /// Shut down for good; no further connects.
    Closed,
}

impl ConnectionState {
    /// Whether a connection exists or is being established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::SocketOpen | Self::Registering | Self::Registered | Self::Closing
        )
    }

    /// Whether registration is underway but not complete.
    pub fn is_registering(self) -> bool {
        matches!(self, Self::SocketOpen | Self::Registering)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::SocketOpen => "socket-open",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Delayed work, tagged with the connection generation it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timer {
    pub generation: u64,
    pub kind: TimerKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Send PASS/NICK/USER.
    Register,
    /// Give up on a registration that has not completed.
    RegistrationTimeout,
    /// Send the services identify command.
    Identify,
    /// Join the remembered channel list.
    AutoJoin,
    /// Retry after an unsolicited disconnect.
    Reconnect,
    /// Registration has held long enough to restart the backoff table.
    Stable,
}

/// Effects requested by [`BridgeSession`](super::BridgeSession). The
/// caller performs them; the session never does I/O itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Open a transport. Report the outcome with the same generation.
    Open {
        generation: u64,
        host: String,
        port: u16,
        tls: bool,
        timeout: Duration,
    },
    /// Write one validated line, without terminator.
    Send { generation: u64, line: bytes::Bytes },
    /// Tear down the transport of this generation.
    Close { generation: u64 },
    /// Deliver `timer` back to the session after `delay`.
    Schedule { timer: Timer, delay: Duration },
    Notify(crate::event::BridgeEvent),
}
