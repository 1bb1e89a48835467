// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP-level tests for the dev and production servers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::tempdir;

use folio_cli::commands::build::build_project;
use folio_cli::config::Config;
use folio_cli::server::hmr::HmrKind;
use folio_cli::server::http::{
    router, AppState, DEV_CACHE_CONTROL, ON_DEMAND_CACHE_CONTROL, PRERENDERED_CACHE_CONTROL,
};

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// A small site: root layout, home, dynamic users, an API and an error boundary.
fn setup_project(root: &Path) {
    write(
        root,
        "app/layout.lua",
        r#"return {
  metadata = { title = { default = "Site", template = "%s | Site" } },
  default = function(props) return "<div id=\"layout\">" .. props.children .. "</div>" end,
}"#,
    );
    write(
        root,
        "app/page.lua",
        r#"return { metadata = { title = "Home" }, default = function() return "<h1>Hi</h1>" end }"#,
    );
    write(
        root,
        "app/users/[id]/page.lua",
        r#"return {
  generateMetadata = function(ctx) return { title = "User " .. ctx.params.id } end,
  default = function(props)
    return "<p>user " .. props.params.id .. " tab=" .. (props.searchParams.tab or "none") .. "</p>"
  end,
}"#,
    );
    write(
        root,
        "app/broken/page.lua",
        "return function() error('secret database password') end",
    );
    write(
        root,
        "app/error.lua",
        r#"return function(props) return "<h1>Oops " .. props.error.status .. "</h1>" end"#,
    );
    write(
        root,
        "app/api/users/[id]/route.lua",
        r#"return {
  GET = function(req, ctx) return { json = { id = ctx.params.id, q = req.query.q } } end,
  POST = function(req, ctx) return { status = 201, json = { received = req.body } } end,
  PUT = function() error("handler exploded") end,
}"#,
    );
    write(root, "public/robots.txt", "User-agent: *");
}

fn config() -> Config {
    let mut config = Config::default();
    config.cache.persistent = false;
    config
}

fn dev_server(root: &Path) -> (Arc<AppState>, TestServer) {
    let state = Arc::new(AppState::dev(root, config()).unwrap());
    let server = TestServer::new(router(state.clone())).unwrap();
    (state, server)
}

#[tokio::test]
async fn test_dev_renders_page_in_layout() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (_state, server) = dev_server(dir.path());

    let response = server.get("/").await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), DEV_CACHE_CONTROL);
    let html = response.text();
    assert!(html.contains("<title>Home | Site</title>"));
    assert!(html.contains("<div id=\"layout\"><h1>Hi</h1></div>"));
    assert!(html.contains("/__folio/hmr"));
    assert!(html.contains("content: 'DEV'"));
}

#[tokio::test]
async fn test_dev_dynamic_page_with_search_params() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (_state, server) = dev_server(dir.path());

    let html = server.get("/users/42?tab=posts").await.text();
    assert!(html.contains("<title>User 42 | Site</title>"));
    assert!(html.contains("<p>user 42 tab=posts</p>"));
}

#[tokio::test]
async fn test_dev_404_names_the_file_to_create() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (_state, server) = dev_server(dir.path());

    let response = server.get("/missing").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.text().contains("app/missing/page.lua"));
}

#[tokio::test]
async fn test_public_files_are_served_before_routes() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (_state, server) = dev_server(dir.path());

    let response = server.get("/robots.txt").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "User-agent: *");
}

#[tokio::test]
async fn test_dev_render_error_shows_diagnostics_and_notifies_hmr() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (state, server) = dev_server(dir.path());
    let mut rx = state.hmr().unwrap().subscribe();

    let response = server.get("/broken").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let html = response.text();
    assert!(html.contains("__FOLIO_ERROR__"));
    assert!(html.contains("secret database password"));

    let message = rx.recv().await.unwrap();
    assert_eq!(message.kind, HmrKind::Error);
    assert_eq!(message.error.unwrap().kind, "runtime");
}

#[tokio::test]
async fn test_api_methods() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (_state, server) = dev_server(dir.path());

    let response = server.get("/api/users/7?q=x").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "id": "7", "q": "x" }));

    let response = server
        .post("/api/users/7")
        .json(&json!({ "name": "Ada" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>(), json!({ "received": { "name": "Ada" } }));

    let response = server.method(Method::DELETE, "/api/users/7").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.json::<Value>(), json!({ "error": "Method not allowed" }));

    let response = server.put("/api/users/7").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>(), json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn test_apply_changes_rescans_and_reloads() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (state, server) = dev_server(dir.path());
    let mut rx = state.hmr().unwrap().subscribe();

    server.get("/new").await.assert_status(StatusCode::NOT_FOUND);

    write(dir.path(), "app/new/page.lua", "return function() return 'fresh' end");
    let changed = vec![dir.path().join("app/new/page.lua")];
    state.apply_changes(&changed).await.unwrap();

    let kinds: Vec<HmrKind> = vec![
        rx.recv().await.unwrap().kind,
        rx.recv().await.unwrap().kind,
        rx.recv().await.unwrap().kind,
    ];
    assert_eq!(kinds, vec![HmrKind::Building, HmrKind::ClearErrors, HmrKind::Reload]);
    assert!(server.get("/new").await.text().contains("fresh"));
}

#[tokio::test]
async fn test_apply_changes_after_directory_rename() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (state, server) = dev_server(dir.path());
    server.get("/users/1").await.assert_status_ok();

    let from = dir.path().join("app/users");
    let to = dir.path().join("app/members");
    fs::rename(&from, &to).unwrap();
    state.apply_changes(&[from, to]).await.unwrap();

    server.get("/users/1").await.assert_status(StatusCode::NOT_FOUND);
    let response = server.get("/members/1").await;
    response.assert_status_ok();
    assert!(response.text().contains("<p>user 1 tab=none</p>"));
}

#[tokio::test]
async fn test_apply_changes_reports_compile_errors() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    let (state, _server) = dev_server(dir.path());
    let mut rx = state.hmr().unwrap().subscribe();

    write(dir.path(), "app/page.lua", "return function( return 'x' end");
    let payload = state
        .apply_changes(&[dir.path().join("app/page.lua")])
        .await
        .unwrap_err();
    assert_eq!(payload.kind, "compile");

    assert_eq!(rx.recv().await.unwrap().kind, HmrKind::Building);
    let error = rx.recv().await.unwrap();
    assert_eq!(error.kind, HmrKind::Error);
    assert_eq!(error.error.unwrap().kind, "compile");
}

#[tokio::test]
async fn test_production_serving() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_project(root);
    let config = config();
    build_project(root, &config, &config.output_dir(root), true)
        .await
        .unwrap();

    let state = Arc::new(AppState::prod(root, config).unwrap());
    assert!(!state.is_dev());
    let server = TestServer::new(router(state)).unwrap();

    let response = server.get("/").await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), PRERENDERED_CACHE_CONTROL);
    let html = response.text();
    assert!(html.contains("<h1>Hi</h1>"));
    assert!(!html.contains("/__folio/hmr"));

    let response = server.get("/users/9").await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), ON_DEMAND_CACHE_CONTROL);
    assert!(response.text().contains("<p>user 9 tab=none</p>"));

    let response = server.get("/robots.txt").await;
    response.assert_status_ok();

    let response = server.get("/nowhere").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.text().contains("<h1>Oops 404</h1>"));

    let response = server.get("/broken").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let html = response.text();
    assert!(html.contains("<h1>Oops 500</h1>"));
    assert!(!html.contains("secret database password"));

    let response = server.get("/api/users/3").await;
    assert_eq!(response.json::<Value>()["id"], "3");
}

#[tokio::test]
async fn test_production_serves_custom_output_dir() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_project(root);
    let config = config().with_output_dir(Some("dist".to_string()));
    build_project(root, &config, &config.output_dir(root), true)
        .await
        .unwrap();
    assert!(root.join("dist/routes-manifest.json").is_file());
    assert!(!root.join(".folio/routes-manifest.json").exists());

    let state = Arc::new(AppState::prod(root, config).unwrap());
    let server = TestServer::new(router(state)).unwrap();
    let response = server.get("/").await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), PRERENDERED_CACHE_CONTROL);
}

#[tokio::test]
async fn test_production_requires_manifest() {
    let dir = tempdir().unwrap();
    setup_project(dir.path());
    assert!(AppState::prod(dir.path(), config()).is_err());
}
