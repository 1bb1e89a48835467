// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! API route invocation.
//!
//! An API module exports handlers named by HTTP method (`GET`, `POST`, ...)
//! and optionally a `default` fallback. A handler is called as
//! `handler(request, { params = ... })` and may return:
//!
//! - a table `{ status = 201, headers = {...}, body = ... }`
//! - a table with a `json` field, sent as `application/json`
//! - a string, sent as `text/plain`
//! - `nil`, sent as `204 No Content`

use mlua::{Table, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{FolioError, Result};
use crate::loader::ModuleLoader;
use crate::module::LoadedModule;
use crate::runtime::{lua_to_json, runtime_error, LuaRuntime};

/// An incoming request as seen by an API handler.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// Uppercase HTTP method.
    pub method: String,
    /// Full request URL (path and query).
    pub url: String,
    /// Request path.
    pub path: String,
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// Request headers, lowercase names.
    pub headers: BTreeMap<String, String>,
    /// Parsed body (JSON or form data).
    pub body: Option<JsonValue>,
    /// Raw body text.
    pub text: Option<String>,
}

/// Body of an [`ApiResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    /// Serialized as JSON.
    Json(JsonValue),
    /// Sent verbatim.
    Text(String),
    /// No body.
    Empty,
}

/// A handler's result, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as returned by the handler.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: ApiBody,
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: ApiBody::Empty,
        }
    }
}

impl ApiResponse {
    /// Content type: the handler's `content-type` header, else one implied by the body.
    pub fn content_type(&self) -> Option<String> {
        if let Some(ct) = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
        {
            return Some(ct);
        }
        match self.body {
            ApiBody::Json(_) => Some("application/json".to_string()),
            ApiBody::Text(_) => Some("text/plain; charset=utf-8".to_string()),
            ApiBody::Empty => None,
        }
    }

    /// Serialized body bytes.
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        Ok(match &self.body {
            ApiBody::Json(value) => serde_json::to_vec(value)?,
            ApiBody::Text(text) => text.clone().into_bytes(),
            ApiBody::Empty => Vec::new(),
        })
    }
}

fn string_table(runtime: &LuaRuntime, values: &BTreeMap<String, String>) -> Result<Table> {
    let table = runtime.create_table()?;
    for (key, value) in values {
        table.set(key.as_str(), value.as_str())?;
    }
    Ok(table)
}

fn request_table(runtime: &LuaRuntime, request: &ApiRequest) -> Result<Table> {
    let table = runtime.create_table()?;
    table.set("method", request.method.as_str())?;
    table.set("url", request.url.as_str())?;
    table.set("path", request.path.as_str())?;
    table.set("query", string_table(runtime, &request.query)?)?;
    table.set("headers", string_table(runtime, &request.headers)?)?;
    match &request.body {
        Some(body) => table.set("body", runtime.json_value(body)?)?,
        None => table.set("body", runtime.create_table()?)?,
    }
    if let Some(text) = &request.text {
        table.set("text", text.as_str())?;
    }
    Ok(table)
}

/// Calls the handler for `request.method` in an API module.
///
/// Fails with [`FolioError::MethodNotAllowed`] when the module has neither a
/// matching handler nor a `default`.
pub async fn invoke_api(
    loader: &ModuleLoader,
    module: &LoadedModule,
    request: &ApiRequest,
    params: &BTreeMap<String, String>,
) -> Result<ApiResponse> {
    let handler = module
        .handler(&request.method)
        .ok_or_else(|| FolioError::MethodNotAllowed(request.method.to_ascii_uppercase()))?;
    debug!(method = %request.method, path = %request.path, "invoking api handler");

    let runtime = loader.runtime();
    let ctx = runtime.create_table()?;
    ctx.set("params", string_table(runtime, params)?)?;

    let result: Value = handler
        .call_async((request_table(runtime, request)?, ctx))
        .await
        .map_err(|e| runtime_error(module.path(), e))?;

    parse_api_response(result).map_err(|e| runtime_error(module.path(), e))
}

fn parse_api_response(value: Value) -> mlua::Result<ApiResponse> {
    let mut response = ApiResponse::default();

    match value {
        Value::Nil => response.status = 204,
        Value::String(s) => response.body = ApiBody::Text(s.to_str()?.to_string()),
        Value::Table(table) => {
            if let Ok(status) = table.get::<u16>("status") {
                response.status = status;
            }
            if let Ok(headers) = table.get::<Table>("headers") {
                for (k, v) in headers.pairs::<String, String>().flatten() {
                    response.headers.insert(k.to_ascii_lowercase(), v);
                }
            }

            let json = table.get::<Value>("json")?;
            let body = table.get::<Value>("body")?;
            response.body = if !json.is_nil() {
                response
                    .headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| "application/json".to_string());
                ApiBody::Json(lua_to_json(&json)?)
            } else {
                match body {
                    Value::Nil => table_body(&table)?,
                    Value::String(s) => ApiBody::Text(s.to_str()?.to_string()),
                    other => ApiBody::Json(lua_to_json(&other)?),
                }
            };
        }
        other => response.body = ApiBody::Json(lua_to_json(&other)?),
    }

    Ok(response)
}

/// Without `body` or `json`, every field other than `status` and `headers` is the body.
fn table_body(table: &Table) -> mlua::Result<ApiBody> {
    let mut map = serde_json::Map::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        let key = match key {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Integer(i) => i.to_string(),
            _ => continue,
        };
        if key == "status" || key == "headers" {
            continue;
        }
        map.insert(key, lua_to_json(&value)?);
    }
    Ok(if map.is_empty() {
        ApiBody::Empty
    } else {
        ApiBody::Json(JsonValue::Object(map))
    })
}
