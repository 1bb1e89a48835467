// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! folio CLI library.
//!
//! This crate provides the command-line interface for folio: the hot
//! reloading development server, the production build and the production
//! server.
//!
//! # Usage
//!
//! This crate is primarily used through the `folio` binary:
//!
//! ```bash
//! folio dev      # Start development server
//! folio build    # Pre-render pages and write the manifest
//! folio serve    # Serve production build
//! folio routes   # Print the route table
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `folio.toml` at the project root.

/// CLI commands (dev, build, serve, routes).
pub mod commands;
/// Project configuration from `folio.toml`.
pub mod config;
/// HTTP server, HMR and request parsing.
pub mod server;
/// File system watching for hot reload.
pub mod watcher;
