// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Development server command with hot reload support.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::Config;
use crate::server::http::{hmr_router, router, AppState, HMR_PATH};
use crate::watcher::FileWatcher;

/// Directories besides the app directory whose changes trigger a rebuild.
const SHARED_DIRS: &[&str] = &["lib", "components"];

/// Runs the development server with hot reload.
pub async fn run(host: Option<String>, port: Option<u16>, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let root = std::env::current_dir()?;
    let host = host.unwrap_or_else(|| config.dev.host.clone());
    let port = port.unwrap_or(config.dev.port);
    let hmr_port = config.hmr_port(port);

    let state = Arc::new(AppState::dev(&root, config)?);
    let routes = state.routes().await;
    if !quiet {
        println!(
            "{} {} route(s) in {}",
            style("Discovered").cyan(),
            routes.len(),
            state.config.app.dir
        );
        for conflict in &routes.conflicts {
            println!("  {} {}", style("!").yellow(), conflict);
        }
        for warning in &routes.warnings {
            println!("  {} {}", style("!").yellow(), warning);
        }
    }

    let mut watch_dirs: Vec<PathBuf> = vec![state.config.app_dir(&state.root)];
    watch_dirs.extend(SHARED_DIRS.iter().map(|d| state.root.join(d)));
    let (_watcher, mut changes) = FileWatcher::spawn(&watch_dirs, &state.config.app.extensions)?;

    let watch_state = state.clone();
    tokio::spawn(async move {
        while let Some(paths) = changes.recv().await {
            let start = Instant::now();
            let display = paths
                .iter()
                .map(|p| p.strip_prefix(&watch_state.root).unwrap_or(p).display().to_string())
                .collect::<Vec<_>>()
                .join(", ");

            let pb = if quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new_spinner()
            };
            if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} folio {msg}") {
                pb.set_style(spinner);
            }
            pb.set_message(display.clone());
            pb.enable_steady_tick(Duration::from_millis(80));

            let outcome = watch_state.apply_changes(&paths).await;
            let elapsed = format!("{}ms", start.elapsed().as_millis());
            match outcome {
                Ok(_) => pb.finish_with_message(format!(
                    "{} {} {}",
                    style("✓").green(),
                    style(&display).dim(),
                    style(elapsed).dim()
                )),
                Err(payload) => pb.finish_with_message(format!(
                    "{} {} {}",
                    style("✗").red(),
                    style(&display).dim(),
                    style(payload.message).red()
                )),
            }
        }
    });

    let hmr_addr = format!("{}:{}", host, hmr_port);
    match tokio::net::TcpListener::bind(&hmr_addr).await {
        Ok(listener) => {
            let hmr_app = hmr_router(state.clone());
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, hmr_app).await {
                    warn!("HMR server stopped: {}", e);
                }
            });
        }
        Err(e) => warn!(
            "HMR port {} unavailable ({}); clients use {} on the main port",
            hmr_port, e, HMR_PATH
        ),
    }

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if !quiet {
        println!(
            "{} {}",
            style("Server:").cyan(),
            style(format!("http://{}", addr)).green().bold()
        );
        println!(
            "{} {}",
            style("HMR:").cyan(),
            style(format!("ws://{}", hmr_addr)).dim()
        );
        println!(
            "{} {}",
            style("Status:").cyan(),
            style("Watching for changes...").dim()
        );
        println!();
    }

    axum::serve(listener, router(state)).await?;
    Ok(())
}
