// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]
// FolioError carries source frames and tracebacks for the dev overlay.
#![allow(clippy::result_large_err)]

//! # folio
//!
//! File-system routed server-side rendering on an embedded Lua runtime.
//!
//! An `app/` directory of Lua modules describes the site:
//!
//! - `page.lua` renders a URL, `layout.lua` wraps every page below it
//! - `route.lua` answers HTTP methods with `GET`, `POST`, ... handlers
//! - `error.lua` renders failures below it
//! - `[id]`, `[...rest]` and `[[...rest]]` directories capture URL segments
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use folio::{render_page, scan, LoaderConfig, LuaTranspiler, ModuleLoader, RenderOptions, ScanOptions};
//! use std::sync::Arc;
//!
//! let table = scan("./app".as_ref(), &ScanOptions::default())?;
//! let loader = ModuleLoader::new(".", Arc::new(LuaTranspiler::new()), LoaderConfig::default())?;
//!
//! let matched = table.match_path("/users/42");
//! if let Some(route) = matched.route {
//!     let html = render_page(&loader, route, &matched.params, &RenderOptions::default()).await?;
//! }
//! ```

/// API route invocation.
pub mod api;
/// Module caches and fingerprints.
pub mod cache;
/// Error types and reporting.
pub mod error;
/// Layout and error boundary chains.
pub mod layouts;
/// Module loading and compile caching.
pub mod loader;
/// Build manifest.
pub mod manifest;
/// URL matching.
pub mod matcher;
/// Document metadata.
pub mod metadata;
/// Evaluated modules.
pub mod module;
/// Server-side rendering.
pub mod render;
/// Import resolution.
pub mod resolver;
/// Route types and pattern parsing.
pub mod route;
/// Sandboxed Lua state.
pub mod runtime;
/// File-based route discovery.
pub mod scanner;
/// Source transformation.
pub mod transpiler;

pub use api::{invoke_api, ApiBody, ApiRequest, ApiResponse};
pub use cache::{CacheConfig, Fingerprint, ModuleCache, TransformCache};
pub use error::{ErrorPayload, FolioError, Result, SourceContext};
pub use layouts::{resolve_error_boundary, resolve_layouts};
pub use loader::{LoaderConfig, ModuleLoader};
pub use manifest::{page_output_path, BuildInfo, Manifest, ManifestRoute};
pub use matcher::{match_route, RouteMatch};
pub use metadata::{merge_metadata, Metadata, Robots, Title};
pub use module::LoadedModule;
pub use render::{
    error_document, escape_html, not_found_document, render_error, render_page, render_page_stream,
    status_text, Document, DocumentOptions, RenderOptions, RenderStream, DEFAULT_RENDER_TIMEOUT,
};
pub use resolver::{ImportResolver, ResolvedImport};
pub use route::{Route, RouteType, RoutingError};
pub use runtime::LuaRuntime;
pub use scanner::{scan, RouteConflict, RouteTable, ScanOptions};
pub use transpiler::{LuaTranspiler, TransformOutput, TransformRequest, Transpiler};
