// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! This module contains the implementations for all folio CLI commands:
//!
//! - `build`: Pre-render pages and write the route manifest
//! - `dev`: Start development server with hot reload
//! - `routes`: Print the discovered route table
//! - `serve`: Serve a production build

/// Production build command.
pub mod build;
/// Development server command.
pub mod dev;
/// Route listing command.
pub mod routes;
/// Production server command.
pub mod serve;
