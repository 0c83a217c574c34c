//! Fuzz target for the session's inbound path
//!
//! Feeds arbitrary server output to a registered session. Routing, roster
//! updates and caching must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bridge::config::{BridgeConfig, ServerProfile};
use slirc_bridge::session::{BridgeSession, Timer, TimerKind};

fuzz_target!(|data: &[u8]| {
    let profile = ServerProfile::new("irc.example.net", 6667, "me");
    let mut session = BridgeSession::new(BridgeConfig::with_server(profile));
    if session.connect(None).is_err() {
        return;
    }
    let generation = session.generation();
    session.on_connected(generation);
    session.on_timer(Timer {
        generation,
        kind: TimerKind::Register,
    });
    session.on_bytes(generation, b":irc.example.net 001 me :Welcome me!me@host\r\n");
    session.on_bytes(generation, data);

    let _ = session.cached_history();
    let _ = session.snapshot();
});
