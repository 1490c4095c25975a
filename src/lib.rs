// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod server;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{FaultKind, SessionContext};
use crate::exec::SystemBackend;
use crate::server::{AppState, build_app};

/// Load the config named by `args` and apply CLI overrides.
pub fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let path = args.config.as_path();
    let mut cfg = load_or_default(path)
        .with_context(|| format!("loading config {}", path.display()))?;

    if let Some(bind) = args.bind {
        cfg.set_bind_addr(bind);
    }

    Ok(cfg)
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the shared session context (registry, fault monitor, process backend)
/// - the panic hook that turns panics into fault broadcasts
/// - the HTTP server
/// - Ctrl-C handling (broadcasts a shutdown fault so every session kills
///   its own process before the server exits)
pub async fn run(args: CliArgs, cfg: ConfigFile) -> Result<()> {
    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let sessions = SessionContext::new(Arc::new(SystemBackend), cfg.stream.session_options());
    sessions.faults.install_panic_hook();

    let state = Arc::new(AppState::new(sessions.clone(), &cfg));
    let app = build_app(state, cfg.server.cors);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr())
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr()))?;
    info!(
        bind = %cfg.bind_addr(),
        docs = %format!("http://{}/api-docs", cfg.bind_addr()),
        "cmdstream listening"
    );

    let faults = sessions.faults.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            faults.raise(FaultKind::Shutdown, "server shutting down");
        })
        .await
        .context("serve")?;

    info!(remaining = sessions.registry.len(), "server stopped");
    Ok(())
}

/// Simple dry-run output: print the effective settings.
fn print_dry_run(cfg: &ConfigFile) {
    println!("cmdstream dry-run");
    println!("  server.bind = {}", cfg.bind_addr());
    println!("  server.cors = {}", cfg.server.cors);
    println!("  stream.channel_capacity = {}", cfg.stream.channel_capacity);
    println!("  stream.keep_alive_secs = {}", cfg.stream.keep_alive_secs);
    println!("  stream.exit_drain_grace_ms = {}", cfg.stream.exit_drain_grace_ms);
    println!("  stream.max_line_bytes = {}", cfg.stream.max_line_bytes);
    println!("  logging.level = {}", cfg.log_level());
    if let Some(ref dir) = cfg.logging.dir {
        println!("  logging.dir = {}", dir.display());
    }

    debug!("dry-run complete (not serving)");
}
