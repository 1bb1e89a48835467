// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for the scan, match and render pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use folio::{
    render_page, scan, LoaderConfig, LuaTranspiler, ModuleLoader, RenderOptions, RouteTable,
    ScanOptions,
};
use tempfile::tempdir;

/// Writes `files` under `dir`, creating parent directories.
fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
}

fn setup(dir: &Path) -> (RouteTable, ModuleLoader) {
    let table = scan(&dir.join("app"), &ScanOptions::default()).unwrap();
    let loader = ModuleLoader::new(dir, Arc::new(LuaTranspiler::new()), LoaderConfig::default())
        .unwrap();
    (table, loader)
}

async fn render(table: &RouteTable, loader: &ModuleLoader, path: &str) -> String {
    let matched = table.match_path(path);
    let route = matched.route.expect("route should match");
    render_page(loader, route, &matched.params, &RenderOptions::default())
        .await
        .unwrap()
}

const ROOT_LAYOUT: &str = r#"return {
  metadata = { title = { default = "Site", template = "%s | Site" }, description = "A site" },
  default = function(props)
    return "<div class=\"root\">" .. props.children .. "</div>"
  end,
}"#;

#[tokio::test]
async fn test_home_page_inside_root_layout() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            ("app/layout.lua", "return function(props) return '<body>' .. props.children .. '</body>' end"),
            (
                "app/page.lua",
                r#"return {
  metadata = { title = "Home" },
  default = function() return "<h1>Hi</h1>" end,
}"#,
            ),
        ],
    );
    let (table, loader) = setup(dir.path());

    let html = render(&table, &loader, "/").await;
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<title>Home</title>"));
    assert!(html.contains("<body><h1>Hi</h1></body>"));
    assert!(html.contains("<meta name=\"generator\" content=\"folio\">"));
}

#[tokio::test]
async fn test_dynamic_page_with_generated_metadata() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[(
            "app/users/[id]/page.lua",
            r#"return {
  generateMetadata = function(ctx) return { title = "User " .. ctx.params.id } end,
  default = function(props) return "<p>id=" .. props.params.id .. "</p>" end,
}"#,
        )],
    );
    let (table, loader) = setup(dir.path());

    let html = render(&table, &loader, "/users/42").await;
    assert!(html.contains("<title>User 42</title>"));
    assert!(html.contains("<p>id=42</p>"));
}

#[tokio::test]
async fn test_layouts_compose_root_outermost() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            ("app/layout.lua", "return function(p) return '[root ' .. p.children .. ']' end"),
            ("app/docs/layout.lua", "return function(p) return '[docs ' .. p.children .. ']' end"),
            (
                "app/docs/guide/layout.lua",
                "return function(p) return '[guide ' .. p.children .. ']' end",
            ),
            ("app/docs/guide/intro/page.lua", "return function() return 'intro' end"),
        ],
    );
    let (table, loader) = setup(dir.path());

    let html = render(&table, &loader, "/docs/guide/intro").await;
    assert!(html.contains("[root [docs [guide intro]]]"));
}

#[tokio::test]
async fn test_metadata_precedence() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            ("app/layout.lua", ROOT_LAYOUT),
            (
                "app/static/page.lua",
                r#"return {
  metadata = { title = "Static" },
  default = function() return "s" end,
}"#,
            ),
            (
                "app/generated/page.lua",
                r#"return {
  metadata = { title = "Ignored" },
  generate_metadata = function() return { title = "Generated", description = "Own" } end,
  default = function() return "g" end,
}"#,
            ),
            (
                "app/fallback/page.lua",
                r#"return {
  metadata = { title = "Fallback" },
  generateMetadata = function() return nil end,
  default = function() return "f" end,
}"#,
            ),
            ("app/bare/page.lua", "return function() return 'b' end"),
        ],
    );
    let (table, loader) = setup(dir.path());

    let html = render(&table, &loader, "/static").await;
    assert!(html.contains("<title>Static | Site</title>"));
    assert!(html.contains("<meta name=\"description\" content=\"A site\">"));

    let html = render(&table, &loader, "/generated").await;
    assert!(html.contains("<title>Generated | Site</title>"));
    assert!(html.contains("content=\"Own\""));
    assert!(!html.contains("Ignored"));

    let html = render(&table, &loader, "/fallback").await;
    assert!(html.contains("<title>Fallback | Site</title>"));

    let html = render(&table, &loader, "/bare").await;
    assert!(html.contains("<title>Site</title>"));
}

#[tokio::test]
async fn test_metadata_values_are_escaped() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[(
            "app/page.lua",
            r#"return {
  metadata = {
    title = "<script>alert('x')</script>",
    description = "\"quoted\" & more",
    openGraph = { title = "<b>og</b>" },
  },
  default = function() return "ok" end,
}"#,
        )],
    );
    let (table, loader) = setup(dir.path());

    let html = render(&table, &loader, "/").await;
    assert!(!html.contains("<script>alert"));
    assert!(html.contains("<title>&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;</title>"));
    assert!(html.contains("content=\"&quot;quoted&quot; &amp; more\""));
    assert!(html.contains("content=\"&lt;b&gt;og&lt;/b&gt;\""));
}

#[tokio::test]
async fn test_catch_all_and_api_routes_in_one_table() {
    let dir = tempdir().unwrap();
    write_files(
        dir.path(),
        &[
            ("app/page.lua", "return function() return 'home' end"),
            ("app/docs/[...slug]/page.lua", "return function(p) return 'doc:' .. p.params.slug end"),
            ("app/shop/[[...rest]]/page.lua", "return function(p) return 'shop:' .. (p.params.rest or '') end"),
            ("app/api/users/[id]/route.lua", "return { GET = function() return 'x' end }"),
        ],
    );
    let (table, loader) = setup(dir.path());

    assert!(render(&table, &loader, "/docs/a/b").await.contains("doc:a/b"));
    assert!(render(&table, &loader, "/shop").await.contains("shop:"));
    assert!(render(&table, &loader, "/shop/hats/red").await.contains("shop:hats/red"));

    let api = table.match_path("/api/users/7");
    assert_eq!(api.route.unwrap().url_pattern, "/api/users/:id");
    assert_eq!(api.params, BTreeMap::from([("id".to_string(), "7".to_string())]));
    assert!(table.match_path("/nope").route.is_none());
}

#[tokio::test]
async fn test_edit_is_picked_up_on_next_render() {
    let dir = tempdir().unwrap();
    write_files(dir.path(), &[("app/page.lua", "return function() return 'v1' end")]);
    let (table, loader) = setup(dir.path());
    assert!(render(&table, &loader, "/").await.contains("v1"));

    let page = dir.path().join("app/page.lua");
    fs::write(&page, "return function() return 'version two' end").unwrap();
    assert!(render(&table, &loader, "/").await.contains("version two"));
}
