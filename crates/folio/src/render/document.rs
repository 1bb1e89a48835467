// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTML document assembly.
//!
//! A [`Document`] is split around the rendered body so the streaming renderer
//! can flush the `<head>` before the body is ready.

use crate::error::ErrorPayload;
use crate::metadata::Metadata;

const DEFAULT_TITLE: &str = "folio";
const DEFAULT_VIEWPORT: &str = "width=device-width, initial-scale=1";

const BASE_STYLES: &str = r#"*, *::before, *::after { box-sizing: border-box; }
html { -webkit-font-smoothing: antialiased; -moz-osx-font-smoothing: grayscale; }
body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; }"#;

const DEV_BADGE_STYLE: &str = r#"body::after {
  content: 'DEV';
  position: fixed; bottom: 8px; right: 8px; z-index: 99999;
  background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
  color: white; font: bold 10px monospace; padding: 4px 8px; border-radius: 4px;
}"#;

/// Reconnecting websocket client for the five HMR message types.
const HMR_CLIENT: &str = r#"(function() {
  var url = window.__FOLIO_HMR_URL__ ||
    ((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '/__folio/hmr');
  var retries = 0;
  function connect() {
    var ws = new WebSocket(url);
    ws.onopen = function() {
      if (retries > 0) { location.reload(); }
      retries = 0;
    };
    ws.onmessage = function(event) {
      var msg;
      try { msg = JSON.parse(event.data); } catch (e) { return; }
      var indicator = window.__folioIndicator, overlay = window.__folioOverlay;
      switch (msg.type) {
        case 'building': if (indicator) indicator.show('Rebuilding...'); break;
        case 'reload':
        case 'update': location.reload(); break;
        case 'error':
          if (indicator) indicator.hide();
          if (overlay) overlay.show(msg.error);
          break;
        case 'clear-errors':
          if (overlay) overlay.hide();
          if (indicator) indicator.hide();
          break;
      }
    };
    ws.onclose = function() {
      retries++;
      setTimeout(connect, Math.min(1000 * retries, 5000));
    };
  }
  connect();
})();"#;

const INDICATOR: &str = r#"(function() {
  var el = null;
  window.__folioIndicator = {
    show: function(text) {
      if (!el) {
        el = document.createElement('div');
        el.id = '__folio-indicator';
        el.style.cssText = 'position:fixed;bottom:8px;left:8px;z-index:99999;padding:6px 10px;' +
          'border-radius:999px;background:#111;color:#fff;font:12px monospace;opacity:.9';
        document.body.appendChild(el);
      }
      el.textContent = text;
      el.style.display = 'block';
    },
    hide: function() { if (el) el.style.display = 'none'; }
  };
})();"#;

const ERROR_OVERLAY: &str = r#"(function() {
  var root = null;
  function field(tag, text, css) {
    var node = document.createElement(tag);
    node.textContent = text;
    node.style.cssText = css || '';
    return node;
  }
  window.__folioOverlay = {
    show: function(error) {
      this.hide();
      error = error || {};
      root = document.createElement('div');
      root.id = '__folio-error-overlay';
      root.style.cssText = 'position:fixed;inset:0;z-index:100000;overflow:auto;padding:32px;' +
        'background:rgba(17,17,17,.96);color:#eee;font:14px/1.5 monospace';
      root.appendChild(field('div', (error.type || 'error').toUpperCase(), 'color:#e94560;font-weight:bold'));
      root.appendChild(field('h2', error.message || 'Unknown error', 'white-space:pre-wrap'));
      if (error.file) root.appendChild(field('div', error.file + (error.line ? ':' + error.line : ''), 'color:#9cdcfe'));
      if (error.frame) root.appendChild(field('pre', error.frame, 'background:#000;padding:12px;border-radius:4px'));
      if (error.stack) root.appendChild(field('pre', error.stack, 'color:#888'));
      if (error.hint) root.appendChild(field('p', error.hint, 'color:#7ec699'));
      document.body.appendChild(root);
    },
    hide: function() { if (root) { root.remove(); root = null; } }
  };
  if (window.__FOLIO_ERROR__) window.__folioOverlay.show(window.__FOLIO_ERROR__);
})();"#;

/// Escapes `& < > " '` for safe interpolation into HTML text and attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Encodes a value as a JavaScript literal that is safe inside `<script>`.
fn script_literal<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

/// Dev-only document additions.
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// Adds the DEV badge, HMR client, status indicator and error overlay.
    pub is_dev: bool,
    /// Websocket URL for the HMR client; defaults to `/__folio/hmr` on the page's host.
    pub hmr_url: Option<String>,
    /// Error shown by the overlay as soon as the page loads.
    pub error: Option<ErrorPayload>,
}

/// A document split around the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Everything up to and including `<div id="__folio">`.
    pub shell: String,
    /// Everything after the body.
    pub tail: String,
}

impl Document {
    /// Builds the shell and tail for `metadata`.
    pub fn new(metadata: &Metadata, options: &DocumentOptions) -> Self {
        let lang = metadata.lang.as_deref().unwrap_or("en");
        let charset = metadata.charset.as_deref().unwrap_or("utf-8");
        let viewport = metadata.viewport.as_deref().unwrap_or(DEFAULT_VIEWPORT);
        let title = metadata
            .title
            .as_ref()
            .map(|t| t.text())
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        let mut shell = String::with_capacity(2048);
        shell.push_str("<!DOCTYPE html>\n");
        shell.push_str(&format!("<html lang=\"{}\">\n<head>\n", escape_html(lang)));
        shell.push_str(&format!("  <meta charset=\"{}\">\n", escape_html(charset)));
        shell.push_str(&format!(
            "  <meta name=\"viewport\" content=\"{}\">\n",
            escape_html(viewport)
        ));
        shell.push_str(&format!("  <title>{}</title>\n", escape_html(title)));
        for tag in head_tags(metadata) {
            shell.push_str("  ");
            shell.push_str(&tag);
            shell.push('\n');
        }
        shell.push_str("  <meta name=\"generator\" content=\"folio\">\n");
        shell.push_str(&format!("  <style>\n{}\n  </style>\n", BASE_STYLES));
        if options.is_dev {
            shell.push_str(&format!("  <style>\n{}\n  </style>\n", DEV_BADGE_STYLE));
        }
        shell.push_str("</head>\n<body>\n  <div id=\"__folio\">");

        let mut tail = String::from("</div>\n");
        if options.is_dev {
            if let Some(url) = &options.hmr_url {
                tail.push_str(&format!(
                    "  <script>window.__FOLIO_HMR_URL__ = {};</script>\n",
                    script_literal(url)
                ));
            }
            if let Some(error) = &options.error {
                tail.push_str(&format!(
                    "  <script>window.__FOLIO_ERROR__ = {};</script>\n",
                    script_literal(error)
                ));
            }
            for script in [HMR_CLIENT, INDICATOR, ERROR_OVERLAY] {
                tail.push_str(&format!("  <script>\n{}\n  </script>\n", script));
            }
        }
        tail.push_str("</body>\n</html>\n");

        Self { shell, tail }
    }

    /// The complete document around `body`.
    pub fn wrap(&self, body: &str) -> String {
        let mut html = String::with_capacity(self.shell.len() + body.len() + self.tail.len());
        html.push_str(&self.shell);
        html.push_str(body);
        html.push_str(&self.tail);
        html
    }
}

/// `<meta>` and `<link>` tags after the title, in document order.
fn head_tags(metadata: &Metadata) -> Vec<String> {
    let mut tags = Vec::new();
    let mut meta = |attr: &str, key: &str, value: &Option<String>| {
        if let Some(value) = value {
            tags.push(format!(
                "<meta {}=\"{}\" content=\"{}\">",
                attr,
                key,
                escape_html(value)
            ));
        }
    };

    meta("name", "description", &metadata.description);
    if let Some(og) = &metadata.open_graph {
        meta("property", "og:title", &og.title);
        meta("property", "og:description", &og.description);
        meta("property", "og:image", &og.image);
        meta("property", "og:url", &og.url);
        meta("property", "og:type", &og.kind);
        meta("property", "og:site_name", &og.site_name);
    }
    if let Some(tw) = &metadata.twitter {
        meta("name", "twitter:card", &tw.card);
        meta("name", "twitter:title", &tw.title);
        meta("name", "twitter:description", &tw.description);
        meta("name", "twitter:image", &tw.image);
        meta("name", "twitter:creator", &tw.creator);
    }
    if let Some(robots) = &metadata.robots {
        meta("name", "robots", &Some(robots.content()));
    }

    let mut link = |rel: &str, href: &Option<String>| {
        if let Some(href) = href {
            tags.push(format!("<link rel=\"{}\" href=\"{}\">", rel, escape_html(href)));
        }
    };
    if let Some(icons) = &metadata.icons {
        link("icon", &icons.icon);
        link("apple-touch-icon", &icons.apple);
        link("shortcut icon", &icons.shortcut);
    }
    link("canonical", &metadata.canonical);

    tags
}

/// Development 404 page naming the file that would serve `path`.
pub fn not_found_document(path: &str, expected_file: &str, options: &DocumentOptions) -> String {
    let metadata = Metadata {
        title: Some(crate::metadata::Title::Plain("404 - Page Not Found".to_string())),
        ..Metadata::default()
    };
    let body = format!(
        r#"<main style="max-width:640px;margin:15vh auto;padding:0 24px">
    <h1>404</h1>
    <p>No route matches <code>{}</code>.</p>
    <p>Create <code>{}</code> to add this page.</p>
  </main>"#,
        escape_html(path),
        escape_html(expected_file)
    );
    Document::new(&metadata, options).wrap(&body)
}

/// Development diagnostic page for a failed render.
///
/// The overlay opens on load with the same payload the HMR channel broadcasts.
pub fn error_document(payload: &ErrorPayload, options: &DocumentOptions) -> String {
    let metadata = Metadata {
        title: Some(crate::metadata::Title::Plain(format!("Error: {}", payload.kind))),
        ..Metadata::default()
    };
    let options = DocumentOptions {
        error: Some(payload.clone()),
        ..options.clone()
    };
    let mut body = format!(
        "<main style=\"padding:32px;font-family:monospace\">\n    <h1>{}</h1>\n    <pre>{}</pre>\n",
        escape_html(&payload.kind),
        escape_html(&payload.message)
    );
    if let Some(file) = &payload.file {
        body.push_str(&format!("    <p>{}</p>\n", escape_html(file)));
    }
    if let Some(frame) = &payload.frame {
        body.push_str(&format!("    <pre>{}</pre>\n", escape_html(frame)));
    }
    body.push_str("  </main>");
    Document::new(&metadata, &options).wrap(&body)
}
