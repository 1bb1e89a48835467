// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Turns an HTTP request into an [`ApiRequest`].

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request};
use folio::ApiRequest;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Maximum body size to accept (1MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Reads and parses a request for an API handler.
///
/// The body is parsed by Content-Type:
/// - `application/json` - JSON body
/// - `application/x-www-form-urlencoded` - URL-encoded form data
/// - anything else - kept as text only; `body` is parsed as JSON when possible
pub async fn parse_request(request: Request<Body>) -> Result<ApiRequest, BodyParseError> {
    let (parts, body) = request.into_parts();

    let body_bytes = axum::body::to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|_| BodyParseError::TooLarge)?;

    let content_type = parts
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let (body, text) = parse_body(&content_type, &body_bytes)?;

    Ok(ApiRequest {
        method: parts.method.as_str().to_string(),
        url: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string()),
        path: parts.uri.path().to_string(),
        query: parse_query(parts.uri.query()),
        headers: header_map(&parts.headers),
        body,
        text,
    })
}

fn parse_body(
    content_type: &str,
    bytes: &Bytes,
) -> Result<(Option<JsonValue>, Option<String>), BodyParseError> {
    if bytes.is_empty() {
        return Ok((None, None));
    }
    let text = String::from_utf8_lossy(bytes).into_owned();

    let body = if content_type.contains("application/json") {
        Some(parse_json(bytes)?)
    } else if content_type.contains("application/x-www-form-urlencoded") {
        Some(parse_form_urlencoded(bytes))
    } else {
        parse_json(bytes).ok()
    };
    Ok((body, Some(text)))
}

/// Parses JSON body.
fn parse_json(bytes: &[u8]) -> Result<JsonValue, BodyParseError> {
    serde_json::from_slice(bytes).map_err(|e| BodyParseError::InvalidJson(e.to_string()))
}

/// Parses URL-encoded form data.
fn parse_form_urlencoded(bytes: &[u8]) -> JsonValue {
    let form: serde_json::Map<String, JsonValue> = form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), JsonValue::String(v.into_owned())))
        .collect();
    JsonValue::Object(form)
}

/// Decodes a query string; the last value of a repeated key wins.
pub fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Error types for body parsing.
#[derive(Debug, thiserror::Error)]
pub enum BodyParseError {
    /// Request body exceeds the maximum allowed size.
    #[error("Request body too large (max {MAX_BODY_SIZE} bytes)")]
    TooLarge,

    /// JSON parsing failed.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}
