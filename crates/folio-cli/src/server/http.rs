// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server for development and production.
//!
//! Both modes share one request handler: public files are tried first, then
//! the request path is matched against the current route table and either a
//! page is rendered or an API handler is invoked. The modes differ in caching
//! headers, pre-rendered pages and how failures are reported.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State, WebSocketUpgrade},
    handler::Handler,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use folio::manifest::MANIFEST_FILE;
use folio::route::normalize_pattern;
use folio::{
    error_document, invoke_api, not_found_document, render_error, render_page,
    render_page_stream, scan, status_text, ApiResponse, Document, DocumentOptions, ErrorPayload,
    FolioError, LuaTranspiler, Manifest, Metadata, ModuleLoader, RenderOptions, RenderStream,
    Route, RouteTable, RouteType, RoutingError, Title,
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use super::body_parser::{self, BodyParseError};
use super::hmr::{handle_websocket, HmrHub, HmrMessage};
use super::pages::PageCache;
use crate::config::Config;

/// WebSocket path for HMR on the main port.
pub const HMR_PATH: &str = "/__folio/hmr";

/// Cache-Control for every dev response.
pub const DEV_CACHE_CONTROL: &str = "no-cache";
/// Cache-Control for pre-rendered pages.
pub const PRERENDERED_CACHE_CONTROL: &str = "public, s-maxage=3600, stale-while-revalidate";
/// Cache-Control for pages rendered on demand in production.
pub const ON_DEMAND_CACHE_CONTROL: &str = "public, s-maxage=60, stale-while-revalidate=30";
const ERROR_CACHE_CONTROL: &str = "no-store";

/// What the server is running as.
#[derive(Debug)]
pub enum Mode {
    /// `folio dev`: rescans on change and reports errors over HMR.
    Dev {
        /// Connected HMR clients.
        hmr: HmrHub,
    },
    /// `folio serve`: routes from the manifest, pre-rendered pages from disk.
    Prod {
        /// Pre-rendered pages.
        pages: PageCache,
        /// Build output directory.
        output_dir: PathBuf,
    },
}

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Canonical project root.
    pub root: PathBuf,
    /// Project configuration.
    pub config: Config,
    /// Module loader for pages, layouts and API routes.
    pub loader: ModuleLoader,
    /// Serving mode.
    pub mode: Mode,
    routes: RwLock<Arc<RouteTable>>,
}

impl AppState {
    /// Development state: scans the app directory.
    pub fn dev(root: &Path, config: Config) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(root)?;
        let table = scan(&config.app_dir(&root), &config.scan_options())?;
        log_table(&table);
        Self::new(root, config, table, Mode::Dev { hmr: HmrHub::new() })
    }

    /// Production state: reads the manifest and pre-rendered pages from the build output.
    pub fn prod(root: &Path, config: Config) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(root)?;
        let output_dir = config.output_dir(&root);
        let manifest = Manifest::load(&output_dir.join(MANIFEST_FILE))?;
        let pages = PageCache::load(&output_dir, &manifest);
        let table = manifest.into_route_table(&root);
        info!(routes = table.len(), prerendered = pages.len(), "loaded build manifest");
        Self::new(root, config, table, Mode::Prod { pages, output_dir })
    }

    fn new(root: PathBuf, config: Config, table: RouteTable, mode: Mode) -> anyhow::Result<Self> {
        let loader = ModuleLoader::new(
            &root,
            Arc::new(LuaTranspiler::new()),
            config.loader_config(&root),
        )?;
        Ok(Self {
            root,
            config,
            loader,
            mode,
            routes: RwLock::new(Arc::new(table)),
        })
    }

    /// True in development mode.
    pub fn is_dev(&self) -> bool {
        matches!(self.mode, Mode::Dev { .. })
    }

    /// The HMR hub, in development mode.
    pub fn hmr(&self) -> Option<&HmrHub> {
        match &self.mode {
            Mode::Dev { hmr } => Some(hmr),
            Mode::Prod { .. } => None,
        }
    }

    /// The current route table.
    pub async fn routes(&self) -> Arc<RouteTable> {
        self.routes.read().await.clone()
    }

    /// Scans the app directory again and swaps the new table in.
    pub async fn rescan(&self) -> Result<Arc<RouteTable>, RoutingError> {
        let table = Arc::new(scan(&self.config.app_dir(&self.root), &self.config.scan_options())?);
        log_table(&table);
        *self.routes.write().await = table.clone();
        Ok(table)
    }

    /// Reacts to changed files: invalidates them, rescans and recompiles the
    /// changed sources, and tells HMR clients the outcome.
    ///
    /// Returns the number of routes on success.
    pub async fn apply_changes(&self, changed: &[PathBuf]) -> Result<usize, ErrorPayload> {
        let hmr = self.hmr();
        notify(hmr, HmrMessage::building());

        for path in changed {
            self.loader.invalidate(Some(path));
        }

        let table = match self.rescan().await {
            Ok(table) => table,
            Err(e) => {
                let payload = routing_payload(&e);
                notify(hmr, HmrMessage::error(payload.clone()));
                return Err(payload);
            }
        };

        for path in changed.iter().filter(|p| self.is_source(p) && p.is_file()) {
            if let Err(e) = self.loader.load(path).await {
                warn!(file = %path.display(), "Rebuild failed: {}", e);
                let payload = e.payload();
                notify(hmr, HmrMessage::error(payload.clone()));
                return Err(payload);
            }
        }

        notify(hmr, HmrMessage::clear_errors());
        notify(hmr, HmrMessage::reload());
        Ok(table.len())
    }

    fn is_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.app.extensions.iter().any(|e| e == ext))
    }

    fn render_options(&self, search_params: BTreeMap<String, String>) -> RenderOptions {
        RenderOptions {
            is_dev: self.is_dev(),
            search_params,
            hmr_url: None,
        }
    }

    fn page_cache_control(&self) -> &'static str {
        if self.is_dev() {
            DEV_CACHE_CONTROL
        } else {
            ON_DEMAND_CACHE_CONTROL
        }
    }
}

fn notify(hmr: Option<&HmrHub>, message: HmrMessage) {
    if let Some(hmr) = hmr {
        hmr.send(message);
    }
}

fn routing_payload(e: &RoutingError) -> ErrorPayload {
    ErrorPayload {
        kind: "routing".to_string(),
        file: None,
        message: e.to_string(),
        stack: None,
        frame: None,
        line: None,
        column: None,
        hint: None,
    }
}

fn log_table(table: &RouteTable) {
    info!(routes = table.len(), "route table ready");
    for conflict in &table.conflicts {
        debug!(pattern = %conflict.pattern, "conflict: {}", conflict);
    }
}

/// Builds the application router.
///
/// Public files (and in production the build's static files) are served
/// first; everything else goes to the route handler.
pub fn router(state: Arc<AppState>) -> Router {
    let app = handle_request.with_state(state.clone());
    let public = ServeDir::new(state.config.public_dir(&state.root))
        .append_index_html_on_directories(false)
        .call_fallback_on_method_not_allowed(true)
        .fallback(app);

    match &state.mode {
        Mode::Dev { .. } => Router::new()
            .route(HMR_PATH, get(hmr_handler))
            .fallback_service(public)
            .with_state(state),
        Mode::Prod { output_dir, .. } => {
            let built = ServeDir::new(output_dir.join("static"))
                .append_index_html_on_directories(false)
                .call_fallback_on_method_not_allowed(true)
                .fallback(public);
            Router::new().fallback_service(built).with_state(state)
        }
    }
}

/// Router for the standalone HMR port: the WebSocket at `/`.
pub fn hmr_router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(hmr_handler)).with_state(state)
}

async fn hmr_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    match state.hmr() {
        Some(hub) => {
            let rx = hub.subscribe();
            ws.on_upgrade(move |socket| handle_websocket(socket, rx))
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Matches the request and renders a page or invokes an API handler.
async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let is_read = request.method() == Method::GET || request.method() == Method::HEAD;

    if let Mode::Prod { pages, .. } = &state.mode {
        if is_read {
            if let Some(html) = pages.get(&path) {
                debug!(path = %path, "serving pre-rendered page");
                return html_response(StatusCode::OK, html.to_string(), PRERENDERED_CACHE_CONTROL);
            }
        }
    }

    let routes = state.routes().await;
    let matched = routes.match_path(&path);
    let Some(route) = matched.route else {
        return not_found(&state, &routes, &path).await;
    };
    let params = matched.params.clone();

    match route.route_type {
        RouteType::Api => handle_api(&state, route, &params, request).await,
        _ if !is_read => json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        _ => {
            let query = body_parser::parse_query(request.uri().query());
            handle_page(&state, &routes, route, &params, query).await
        }
    }
}

async fn handle_page(
    state: &AppState,
    routes: &RouteTable,
    route: &Route,
    params: &BTreeMap<String, String>,
    query: BTreeMap<String, String>,
) -> Response {
    let options = state.render_options(query);
    let cache_control = state.page_cache_control();

    if state.config.dev.streaming {
        return match render_page_stream(
            &state.loader,
            route,
            params,
            &options,
            state.config.render_timeout(),
        )
        .await
        {
            Ok(stream) => streamed_response(stream, cache_control),
            Err(e) => page_error(state, routes, route, params, &options, e).await,
        };
    }

    match render_page(&state.loader, route, params, &options).await {
        Ok(html) => html_response(StatusCode::OK, html, cache_control),
        Err(e) => page_error(state, routes, route, params, &options, e).await,
    }
}

async fn page_error(
    state: &AppState,
    routes: &RouteTable,
    route: &Route,
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
    err: FolioError,
) -> Response {
    let status = status_code(err.status_code());
    error!(pattern = %route.url_pattern, "Render failed: {}", err);

    if let Some(hmr) = state.hmr() {
        let payload = err.payload();
        hmr.send(HmrMessage::error(payload.clone()));
        return html_response(
            status,
            error_document(&payload, &options.document_options()),
            DEV_CACHE_CONTROL,
        );
    }

    if let Some(boundary) = routes.error_boundary_for(&route.url_pattern) {
        match render_error(&state.loader, boundary, status.as_u16(), status_text(status.as_u16()), params, options).await {
            Ok(html) => return html_response(status, html, ERROR_CACHE_CONTROL),
            Err(e) => error!(boundary = %boundary.display(), "Error boundary failed: {}", e),
        }
    }
    html_response(status, status_page(status.as_u16()), ERROR_CACHE_CONTROL)
}

async fn not_found(state: &AppState, routes: &RouteTable, path: &str) -> Response {
    debug!(path = %path, "no route matched");
    let options = state.render_options(BTreeMap::new());

    if state.is_dev() {
        let expected = expected_page_file(&state.config, path);
        return html_response(
            StatusCode::NOT_FOUND,
            not_found_document(path, &expected, &options.document_options()),
            DEV_CACHE_CONTROL,
        );
    }

    if let Some(boundary) = routes.error_boundary_for(path) {
        match render_error(&state.loader, boundary, 404, status_text(404), &BTreeMap::new(), &options).await {
            Ok(html) => return html_response(StatusCode::NOT_FOUND, html, ERROR_CACHE_CONTROL),
            Err(e) => error!(boundary = %boundary.display(), "Error boundary failed: {}", e),
        }
    }
    html_response(StatusCode::NOT_FOUND, status_page(404), ERROR_CACHE_CONTROL)
}

/// File that would serve `path`, relative to the project root.
fn expected_page_file(config: &Config, path: &str) -> String {
    let base = normalize_pattern(&config.app.base_path);
    let mut relative = normalize_pattern(path);
    if base != "/" {
        if relative == base {
            relative = "/".to_string();
        } else if let Some(rest) = relative.strip_prefix(&format!("{}/", base)) {
            relative = normalize_pattern(rest);
        }
    }
    let ext = config.app.extensions.first().map(String::as_str).unwrap_or("lua");
    let dir = config.app.dir.trim_end_matches('/');
    if relative == "/" {
        format!("{}/page.{}", dir, ext)
    } else {
        format!("{}{}/page.{}", dir, relative, ext)
    }
}

async fn handle_api(
    state: &AppState,
    route: &Route,
    params: &BTreeMap<String, String>,
    request: Request,
) -> Response {
    let module = match state.loader.load(&route.absolute_file_path).await {
        Ok(module) => module,
        Err(e) => return api_error(state, route, e),
    };
    let api_request = match body_parser::parse_request(request).await {
        Ok(request) => request,
        Err(e @ BodyParseError::TooLarge) => {
            return json_error(StatusCode::PAYLOAD_TOO_LARGE, &e.to_string())
        }
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match invoke_api(&state.loader, &module, &api_request, params).await {
        Ok(response) => api_response(response),
        Err(e) => api_error(state, route, e),
    }
}

fn api_error(state: &AppState, route: &Route, err: FolioError) -> Response {
    if let FolioError::MethodNotAllowed(method) = &err {
        debug!(pattern = %route.url_pattern, method = %method, "method not allowed");
        return json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    error!(pattern = %route.url_pattern, "API handler failed: {}", err);
    if let Some(hmr) = state.hmr() {
        hmr.send(HmrMessage::error(err.payload()));
    }
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn api_response(response: ApiResponse) -> Response {
    let body = match response.body_bytes() {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize API response: {}", e);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let mut builder = Response::builder().status(status_code(response.status));
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    if !response.headers.contains_key("content-type") {
        if let Some(content_type) = response.content_type() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
    }

    builder.body(Body::from(body)).unwrap_or_else(|e| {
        error!("Invalid API response: {}", e);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn html_response(status: StatusCode, html: String, cache_control: &'static str) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, cache_control),
        ],
        html,
    )
        .into_response()
}

fn streamed_response(stream: RenderStream, cache_control: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from_stream(stream.map(Ok::<_, Infallible>)),
    )
        .into_response()
}

/// Minimal page for a status without an error boundary. Never includes error details.
fn status_page(status: u16) -> String {
    let heading = format!("{} - {}", status, status_text(status));
    let metadata = Metadata {
        title: Some(Title::Plain(heading.clone())),
        ..Metadata::default()
    };
    Document::new(&metadata, &DocumentOptions::default()).wrap(&format!(
        "<main style=\"max-width:640px;margin:15vh auto;padding:0 24px\"><h1>{}</h1></main>",
        heading
    ))
}
