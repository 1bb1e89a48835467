// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP serving for `folio dev` and `folio serve`.
//!
//! # Components
//!
//! - `http`: shared state, the axum router and the request handler
//! - `hmr`: WebSocket hot reload notifications
//! - `pages`: pre-rendered page cache for production
//! - `body_parser`: request parsing for API routes

/// Request body parsing for form data and JSON.
pub mod body_parser;
/// Hot reload WebSocket server.
pub mod hmr;
/// HTTP server implementation using Axum.
pub mod http;
/// Pre-rendered page cache.
pub mod pages;
