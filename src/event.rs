//! Events pushed to consumers.

use serde::Serialize;

use crate::session::ConnectionState;

/// Category of a human-readable diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// Lifecycle progress worth showing in a transcript.
    Info,
    /// Connect failure or socket loss.
    Transport,
    /// Malformed, oversized or invalid line.
    Protocol,
    /// Registration refused or timed out.
    Registration,
    /// Ban or kill detected; auto-reconnect is off.
    Abort,
    /// Cache file problem.
    Persist,
    /// Consumer command refused by the outbound filter.
    Rejected,
}

/// Something consumers should hear about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// An inbound line, or a locally synthesized echo of our own.
    Line { line: String },
    /// Redacted copy of a line written upstream.
    Outgoing { line: String },
    #[serde(rename_all = "camelCase")]
    StateChanged {
        state: ConnectionState,
        nick: String,
    },
    /// Roster content changed; consumers re-read state.
    RosterChanged,
    Diagnostic { kind: DiagnosticKind, text: String },
}

impl BridgeEvent {
    pub fn diagnostic(kind: DiagnosticKind, text: impl Into<String>) -> Self {
        Self::Diagnostic {
            kind,
            text: text.into(),
        }
    }
}

/// Fan-out seam for [`BridgeEvent`]s.
///
/// Delivery is best effort; an implementation with no listeners drops the
/// event.
pub trait Notifier {
    fn notify(&self, event: BridgeEvent);
}

#[cfg(feature = "tokio")]
mod channels {
    use tokio::sync::{broadcast, mpsc};

    use super::{BridgeEvent, Notifier};

    impl Notifier for broadcast::Sender<BridgeEvent> {
        fn notify(&self, event: BridgeEvent) {
            // Err only means nobody is subscribed right now.
            let _ = self.send(event);
        }
    }

    impl Notifier for mpsc::UnboundedSender<BridgeEvent> {
        fn notify(&self, event: BridgeEvent) {
            let _ = self.send(event);
        }
    }
}
