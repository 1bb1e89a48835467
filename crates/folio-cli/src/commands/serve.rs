// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Production server command.
//!
//! Serves the application from the build output: routes come from the
//! manifest, pre-rendered pages from memory, everything else renders on
//! demand. No hot reload.

use console::style;
use folio::manifest::MANIFEST_FILE;
use std::sync::Arc;

use crate::config::Config;
use crate::server::http::{router, AppState, Mode};

/// Runs the production server using the build output.
///
/// `output` overrides `[build] output_dir`, matching `folio build --output`.
pub async fn run(host: Option<String>, port: Option<u16>, output: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?.with_output_dir(output);
    let root = std::env::current_dir()?;
    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(config.dev.port);

    let manifest_path = config.output_dir(&root).join(MANIFEST_FILE);
    if !manifest_path.exists() {
        println!(
            "{}",
            style(format!("Error: {} not found!", manifest_path.display())).red().bold()
        );
        println!();
        println!("Run {} first to build your application.", style("folio build").cyan());
        println!();
        return Ok(());
    }

    println!("{}", style("Starting production server...").cyan().bold());
    let state = Arc::new(AppState::prod(&root, config)?);
    let routes = state.routes().await;
    let prerendered = match &state.mode {
        Mode::Prod { pages, .. } => pages.len(),
        Mode::Dev { .. } => 0,
    };
    println!(
        "{} {} route(s), {} pre-rendered page(s)",
        style("Loaded").green(),
        routes.len(),
        prerendered
    );

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!();
    println!(
        "{} {}",
        style("Production server running at").green().bold(),
        style(format!("http://{}", addr)).cyan().underlined()
    );

    axum::serve(listener, router(state)).await?;
    Ok(())
}
