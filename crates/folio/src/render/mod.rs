// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Server-side rendering.
//!
//! Rendering a page loads the page and its layout chain, resolves metadata,
//! composes an [`Element`] tree with the page innermost and the root layout
//! outermost, renders it to a string and wraps it in a [`Document`].

mod document;
mod stream;

pub use document::{error_document, escape_html, not_found_document, Document, DocumentOptions};
pub use stream::{render_page_stream, RenderStream, DEFAULT_RENDER_TIMEOUT};

use mlua::{Function, Table, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{FolioError, Result};
use crate::loader::ModuleLoader;
use crate::metadata::{merge_metadata, Metadata, Title};
use crate::module::LoadedModule;
use crate::route::Route;
use crate::runtime::{call, lua_to_json, runtime_error, LuaRuntime};

/// Per-request rendering options.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Development mode: adds the HMR client, indicator, overlay and DEV badge.
    pub is_dev: bool,
    /// Query string parameters, passed to the page as `searchParams`.
    pub search_params: BTreeMap<String, String>,
    /// Websocket URL the HMR client connects to.
    pub hmr_url: Option<String>,
}

impl RenderOptions {
    /// Document options derived from these render options.
    pub fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            is_dev: self.is_dev,
            hmr_url: self.hmr_url.clone(),
            error: None,
        }
    }
}

/// A composed component tree, ready to render.
#[derive(Debug)]
pub(crate) enum Element {
    /// The page component with `{ params, searchParams }`.
    Page {
        file: PathBuf,
        render: Function,
        props: Table,
    },
    /// A layout wrapping `child`; `children` is filled in at render time.
    Layout {
        file: PathBuf,
        render: Function,
        props: Table,
        child: Box<Element>,
    },
}

impl Element {
    /// Renders innermost-first.
    pub(crate) fn render(&self) -> Result<String> {
        match self {
            Element::Page {
                file,
                render,
                props,
            } => to_html(file, call(file, render, props.clone())?),
            Element::Layout {
                file,
                render,
                props,
                child,
            } => {
                let children = child.render()?;
                props.set("children", children)?;
                to_html(file, call(file, render, props.clone())?)
            }
        }
    }
}

fn to_html(file: &Path, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.to_str()?.to_string()),
        Value::Nil => Ok(String::new()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(FolioError::Runtime {
            file: file.to_path_buf(),
            message: format!(
                "component must return an HTML string, got {}",
                other.type_name()
            ),
        }),
    }
}

fn string_table(runtime: &LuaRuntime, values: &BTreeMap<String, String>) -> Result<Table> {
    let table = runtime.create_table()?;
    for (key, value) in values {
        table.set(key.as_str(), value.as_str())?;
    }
    Ok(table)
}

/// A page with its modules loaded and metadata resolved.
pub(crate) struct Prepared {
    pub(crate) element: Element,
    pub(crate) document: Document,
}

/// Loads every module and resolves metadata. Nothing is rendered yet.
pub(crate) async fn prepare(
    loader: &ModuleLoader,
    route: &Route,
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
) -> Result<Prepared> {
    let page = loader.load(&route.absolute_file_path).await?;
    let page_render = page.require_default()?;

    let mut layouts = Vec::with_capacity(route.applicable_layouts.len());
    for path in &route.applicable_layouts {
        let layout = loader.load(path).await?;
        let render = layout.require_default()?;
        layouts.push((layout, render));
    }

    let runtime = loader.runtime();
    let page_props = runtime.create_table()?;
    page_props.set("params", string_table(runtime, params)?)?;
    page_props.set("searchParams", string_table(runtime, &options.search_params)?)?;

    let metadata = resolve_metadata(runtime, &page, &layouts, params, options).await?;
    let document = Document::new(&metadata, &options.document_options());

    let mut element = Element::Page {
        file: page.path().to_path_buf(),
        render: page_render,
        props: page_props,
    };
    for (layout, render) in layouts.into_iter().rev() {
        let props = runtime.create_table()?;
        props.set("params", string_table(runtime, params)?)?;
        element = Element::Layout {
            file: layout.path().to_path_buf(),
            render,
            props,
            child: Box::new(element),
        };
    }

    Ok(Prepared { element, document })
}

/// Page metadata merged over the layouts' static metadata.
///
/// `generateMetadata` wins over a static `metadata` table; a `nil` result
/// falls back to the static table.
async fn resolve_metadata(
    runtime: &LuaRuntime,
    page: &LoadedModule,
    layouts: &[(Arc<LoadedModule>, Function)],
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
) -> Result<Metadata> {
    let mut page_value = Value::Nil;
    if let Some(generate) = page.generate_metadata() {
        let ctx = runtime.create_table()?;
        ctx.set("params", string_table(runtime, params)?)?;
        ctx.set("searchParams", string_table(runtime, &options.search_params)?)?;
        page_value = generate
            .call_async::<Value>(ctx)
            .await
            .map_err(|e| runtime_error(page.path(), e))?;
    }
    if page_value.is_nil() {
        if let Some(metadata) = page.metadata() {
            page_value = Value::Table(metadata);
        }
    }

    let page_json = lua_to_json(&page_value).map_err(|e| runtime_error(page.path(), e))?;
    let mut layout_json = Vec::with_capacity(layouts.len());
    for (layout, _) in layouts {
        if let Some(metadata) = layout.metadata() {
            layout_json.push(
                lua_to_json(&Value::Table(metadata)).map_err(|e| runtime_error(layout.path(), e))?,
            );
        }
    }

    merge_metadata(&layout_json, &page_json).map_err(|e| FolioError::Runtime {
        file: page.path().to_path_buf(),
        message: format!("invalid metadata: {}", e),
    })
}

/// Renders a page route to a complete HTML document.
pub async fn render_page(
    loader: &ModuleLoader,
    route: &Route,
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
) -> Result<String> {
    debug!(pattern = %route.url_pattern, "rendering page");
    let prepared = prepare(loader, route, params, options).await?;
    let body = prepared.element.render()?;
    Ok(prepared.document.wrap(&body))
}

/// Renders an `error` boundary module for a failed request.
///
/// The boundary's `default` receives `{ error = { status, message }, params }`.
pub async fn render_error(
    loader: &ModuleLoader,
    boundary: &Path,
    status: u16,
    message: &str,
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
) -> Result<String> {
    let module = loader.load(boundary).await?;
    let render = module.require_default()?;
    let runtime = loader.runtime();

    let error = runtime.create_table()?;
    error.set("status", status)?;
    error.set("message", message)?;
    let props = runtime.create_table()?;
    props.set("error", error)?;
    props.set("params", string_table(runtime, params)?)?;

    let body = to_html(module.path(), call(module.path(), &render, props)?)?;

    let page_json = match module.metadata() {
        Some(metadata) => {
            lua_to_json(&Value::Table(metadata)).map_err(|e| runtime_error(module.path(), e))?
        }
        None => JsonValue::Null,
    };
    let mut metadata = merge_metadata(&[], &page_json).unwrap_or_default();
    if metadata.title.is_none() {
        metadata.title = Some(Title::Plain(format!("{} - {}", status, status_text(status))));
    }

    Ok(Document::new(&metadata, &options.document_options()).wrap(&body))
}

/// Reason phrase for the statuses the serving loop produces.
pub fn status_text(status: u16) -> &'static str {
    match status {
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Error",
    }
}
