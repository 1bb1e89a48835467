// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Streaming rendering.
//!
//! The shell is sent as soon as modules are loaded and metadata is resolved.
//! The body renders on a blocking task under a deadline; if the deadline
//! passes, the stream closes the document without the body and the Lua call
//! is interrupted so the shared state is released.

use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::{prepare, RenderOptions};
use crate::error::Result;
use crate::loader::ModuleLoader;
use crate::route::Route;
use crate::runtime::with_deadline;

/// Deadline for rendering a streamed body.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(10);

/// HTML chunks of a streamed document.
pub type RenderStream = BoxStream<'static, String>;

/// Renders a page as a stream of chunks: shell, body, tail.
///
/// Load, compile and metadata errors are returned before any chunk exists.
/// A body that fails or misses `timeout` is replaced by a marker comment,
/// so the stream always ends with the closing tags.
pub async fn render_page_stream(
    loader: &ModuleLoader,
    route: &Route,
    params: &BTreeMap<String, String>,
    options: &RenderOptions,
    timeout: Duration,
) -> Result<RenderStream> {
    let prepared = prepare(loader, route, params, options).await?;
    let (tx, rx) = mpsc::channel::<String>(4);
    let pattern = route.url_pattern.clone();

    tokio::spawn(async move {
        let document = prepared.document;
        let element = prepared.element;

        if tx.send(document.shell).await.is_err() {
            return;
        }

        let deadline = Instant::now() + timeout;
        let render = tokio::task::spawn_blocking(move || with_deadline(deadline, || element.render()));
        let body = match tokio::time::timeout(timeout, render).await {
            Ok(Ok(Ok(body))) => body,
            Ok(Ok(Err(e))) => {
                error!(pattern = %pattern, "Streaming render failed: {}", e);
                "<!-- folio: render failed -->".to_string()
            }
            Ok(Err(e)) => {
                error!(pattern = %pattern, "Streaming render task panicked: {}", e);
                "<!-- folio: render failed -->".to_string()
            }
            Err(_) => {
                warn!(pattern = %pattern, timeout_ms = timeout.as_millis() as u64, "Streaming render aborted");
                format!("<!-- folio: render aborted after {}ms -->", timeout.as_millis())
            }
        };

        if tx.send(body).await.is_ok() {
            let _ = tx.send(document.tail).await;
        }
    });

    Ok(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed())
}
