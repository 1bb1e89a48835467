// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use folio_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "File-system routed Lua SSR with a hot-reloading dev server", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Quiet mode: only show errors (useful for CI)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start development server with hot reload
    Dev {
        /// Port to run the dev server on (default: [dev] port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: [dev] host)
        #[arg(long)]
        host: Option<String>,
    },
    /// Pre-render pages and write the route manifest
    Build {
        /// Output directory (default: [build] output_dir)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Serve production build (no hot reload)
    Serve {
        /// Port to run the server on (default: [dev] port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Build output directory to serve (default: [build] output_dir)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print the discovered routes
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Dev { port, host } => commands::dev::run(host, port, cli.quiet).await,
        Commands::Build { output } => commands::build::run(output, cli.quiet).await,
        Commands::Serve { port, host, output } => commands::serve::run(host, port, output).await,
        Commands::Routes => commands::routes::run(),
    }
}
