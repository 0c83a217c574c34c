//! slirc-bridge - a minimal consumer for the bridge core.
//!
//! Reads consumer commands from stdin and prints pushed events as JSON
//! lines on stdout. Lines starting with `/` are administrative:
//!
//! - `/state`, `/history`, `/info`
//! - `/erase`, `/prune <channel>`
//! - `/connect`, `/disconnect`, `/quit`
//!
//! Anything else is submitted upstream through the outbound filter.

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slirc_bridge::cache::{restore_on_startup, save_snapshot};
use slirc_bridge::event::Notifier;
use slirc_bridge::session::Action;
use slirc_bridge::{Bridge, BridgeConfig, BridgeEvent, BridgeSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "bridge.toml".to_string());
    let config = BridgeConfig::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        nick = %config.server.nick,
        "Starting slirc-bridge"
    );

    let persist_path = config.cache.persist_path.clone();
    let mut session = BridgeSession::new(config.clone());

    let (events, mut rx) = broadcast::channel::<BridgeEvent>(1024);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_json(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Some(path) = &persist_path {
        let outcome = restore_on_startup(path, config.cache.max_restore_age_secs);
        for action in session.apply_restore(outcome) {
            if let Action::Notify(event) = action {
                events.notify(event);
            }
        }
    }

    let (bridge, driver) = Bridge::spawn(session, events);
    bridge.connect(None).await?;

    tokio::select! {
        res = consume_stdin(&bridge) => res?,
        _ = shutdown_signal() => info!("Received shutdown signal"),
    }

    let snapshot = bridge.shutdown().await?;
    if let Some(path) = &persist_path {
        // persistence was asked for, so losing it is fatal
        save_snapshot(path, &snapshot)
            .with_context(|| format!("saving cache to {}", path.display()))?;
    }
    if let Err(e) = driver.await {
        warn!(error = %e, "driver task ended abnormally");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Forward stdin lines until EOF or `/quit`.
async fn consume_stdin(bridge: &Bridge) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let Some(admin) = line.strip_prefix('/') else {
            let submission = bridge.submit(line).await?;
            if submission.rejected {
                print_json(&submission);
            }
            continue;
        };

        let (verb, arg) = admin.split_once(' ').unwrap_or((admin, ""));
        let outcome = match verb {
            "state" => bridge.state().await.map(|s| print_json(&s)),
            "history" => bridge.cached_history().await.map(|h| print_json(&h)),
            "info" => bridge.cache_info().await.map(|i| print_json(&i)),
            "erase" => bridge.erase_cached_history().await,
            "prune" => bridge.prune_channel(arg.trim()).await,
            "connect" => bridge.connect(None).await,
            "disconnect" => bridge.disconnect().await,
            "quit" => return Ok(()),
            other => {
                warn!(verb = %other, "unknown command");
                Ok(())
            }
        };
        if let Err(e) = outcome {
            warn!(verb = %verb, error = %e, "command failed");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "failed to serialize output"),
    }
}
