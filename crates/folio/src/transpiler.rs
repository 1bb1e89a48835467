// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Source transformation.
//!
//! The loader hands every cache miss to a [`Transpiler`]. The bundled
//! [`LuaTranspiler`] compiles the unit with the Lua 5.4 compiler to reject
//! syntax errors early, normalizes the source, and lists the `require`
//! specifiers it contains so the loader can build a resolution table before
//! evaluation.

use futures_util::future::BoxFuture;
use mlua::Lua;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{FolioError, Result, SourceContext};

/// Shape of the transformed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// A unit the runtime can evaluate directly, returning its exports.
    ExecutableModule,
}

/// Runtime the output must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRuntime {
    /// Lua 5.4.
    Lua54,
}

/// Parameters of one transformation.
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    /// Source text as read from disk.
    pub source_text: &'a str,
    /// Path the source was read from. Used for diagnostics.
    pub source_file_path: &'a Path,
    /// Requested output shape.
    pub output_format: OutputFormat,
    /// Requested target runtime.
    pub target_runtime: TargetRuntime,
}

impl<'a> TransformRequest<'a> {
    /// Request for an executable Lua 5.4 module.
    pub fn new(source_text: &'a str, source_file_path: &'a Path) -> Self {
        Self {
            source_text,
            source_file_path,
            output_format: OutputFormat::ExecutableModule,
            target_runtime: TargetRuntime::Lua54,
        }
    }
}

/// Result of a transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Executable code.
    pub code: String,
    /// Import specifiers in first-use order, deduplicated.
    pub imports: Vec<String>,
}

/// External compilation service.
pub trait Transpiler: Send + Sync + fmt::Debug {
    /// Transforms one source unit.
    ///
    /// Syntax errors must be reported as [`FolioError::Compile`].
    fn transform<'a>(&'a self, request: TransformRequest<'a>) -> BoxFuture<'a, Result<TransformOutput>>;
}

/// Compiles Lua 5.4 sources in a private Lua state.
pub struct LuaTranspiler {
    lua: Lua,
}

impl fmt::Debug for LuaTranspiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaTranspiler").finish_non_exhaustive()
    }
}

impl Default for LuaTranspiler {
    fn default() -> Self {
        Self::new()
    }
}

impl LuaTranspiler {
    /// Creates a transpiler with its own compile-only Lua state.
    pub fn new() -> Self {
        Self { lua: Lua::new() }
    }

    fn compile(&self, request: TransformRequest<'_>) -> Result<TransformOutput> {
        let code = normalize_source(request.source_text);

        // Compiling checks syntax without running anything.
        if let Err(err) = self
            .lua
            .load(code.as_str())
            .set_name(format!("@{}", request.source_file_path.display()))
            .into_function()
        {
            return Err(compile_error(request.source_file_path, &code, err));
        }

        Ok(TransformOutput {
            imports: scan_requires(&code),
            code,
        })
    }
}

impl Transpiler for LuaTranspiler {
    fn transform<'a>(&'a self, request: TransformRequest<'a>) -> BoxFuture<'a, Result<TransformOutput>> {
        Box::pin(async move { self.compile(request) })
    }
}

/// Strips a byte-order mark and blanks a shebang line, keeping line numbers.
fn normalize_source(source: &str) -> String {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    if source.starts_with("#!") {
        match source.find('\n') {
            Some(end) => source[end..].to_string(),
            None => String::new(),
        }
    } else {
        source.to_string()
    }
}

fn compile_error(file: &Path, source: &str, err: mlua::Error) -> FolioError {
    let raw = match &err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    };

    let (line, message) = split_location(&raw);
    let column = line.and_then(|l| near_column(source, l, &message));
    let frame = line.map(|l| SourceContext::from_source(source, l, column.unwrap_or(1)).format_snippet());

    FolioError::Compile {
        file: file.to_path_buf(),
        message,
        line,
        column,
        frame,
    }
}

/// Splits `"<chunk>:<line>: <message>"` into its line and message.
///
/// Lua abbreviates long chunk names to `...<tail>`, so the location is found
/// by its `:<digits>:` shape rather than by the chunk name.
fn split_location(raw: &str) -> (Option<usize>, String) {
    for (idx, _) in raw.match_indices(':') {
        let rest = &raw[idx + 1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !rest[digits..].starts_with(':') {
            continue;
        }
        if let Ok(line) = rest[..digits].parse::<usize>() {
            return (Some(line), rest[digits + 1..].trim().to_string());
        }
    }
    (None, raw.trim().to_string())
}

/// Column of the token named in `near '<token>'`, if it appears on the line.
fn near_column(source: &str, line: usize, message: &str) -> Option<usize> {
    let start = message.find("near '")? + "near '".len();
    let token = &message[start..];
    let token = &token[..token.rfind('\'')?];
    let text = source.lines().nth(line.checked_sub(1)?)?;
    text.find(token).map(|i| i + 1)
}

/// Collects string-literal `require` specifiers, skipping comments and strings.
///
/// Handles `require "x"`, `require("x")`, `require [[x]]`. Dynamic requires
/// (non-literal arguments) and method calls like `obj.require("x")` are ignored.
pub fn scan_requires(source: &str) -> Vec<String> {
    let bytes = source.as_bytes();
    let mut found: Vec<String> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i += 2;
                if let Some(level) = long_bracket_level(bytes, i) {
                    i = skip_long_bracket(bytes, i, level);
                } else {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                }
            }
            b'"' | b'\'' => {
                i = read_quoted(bytes, i).1;
            }
            b'[' => {
                if let Some(level) = long_bracket_level(bytes, i) {
                    i = skip_long_bracket(bytes, i, level);
                } else {
                    i += 1;
                }
            }
            b if is_ident_start(b) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let preceded_by_access = is_field_access(bytes, start);
                if &source[start..i] == "require" && !preceded_by_access {
                    if let Some((specifier, end)) = require_argument(bytes, i) {
                        if !found.contains(&specifier) {
                            found.push(specifier);
                        }
                        i = end;
                    }
                }
            }
            _ => i += 1,
        }
    }

    found
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// True when the identifier at `start` follows `.` or `:` (but not the `..` operator).
fn is_field_access(bytes: &[u8], start: usize) -> bool {
    let Some(pos) = bytes[..start].iter().rposition(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    match bytes[pos] {
        b':' => true,
        b'.' => pos == 0 || bytes[pos - 1] != b'.',
        _ => false,
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Parses the literal argument after `require`, returning it and the end offset.
fn require_argument(bytes: &[u8], i: usize) -> Option<(String, usize)> {
    let mut i = skip_whitespace(bytes, i);
    let parenthesized = bytes.get(i) == Some(&b'(');
    if parenthesized {
        i = skip_whitespace(bytes, i + 1);
    }

    let (value, end) = match bytes.get(i)? {
        b'"' | b'\'' => read_quoted(bytes, i),
        b'[' => {
            let level = long_bracket_level(bytes, i)?;
            let open = i + level + 2;
            let end = skip_long_bracket(bytes, i, level);
            let close = end.saturating_sub(level + 2).max(open);
            (String::from_utf8_lossy(&bytes[open..close]).into_owned(), end)
        }
        _ => return None,
    };

    if parenthesized {
        let after = skip_whitespace(bytes, end);
        if bytes.get(after) != Some(&b')') {
            // `require("a" .. x)` is dynamic.
            return None;
        }
        return Some((value, after + 1));
    }
    Some((value, end))
}

/// Level of a long bracket (`[[` is 0, `[==[` is 2) starting at `i`.
fn long_bracket_level(bytes: &[u8], i: usize) -> Option<usize> {
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let mut j = i + 1;
    while bytes.get(j) == Some(&b'=') {
        j += 1;
    }
    (bytes.get(j) == Some(&b'[')).then_some(j - i - 1)
}

/// Offset just past the long bracket opened at `i`.
fn skip_long_bracket(bytes: &[u8], i: usize, level: usize) -> usize {
    let mut j = i + level + 2;
    while j < bytes.len() {
        if bytes[j] == b']' {
            let mut k = j + 1;
            let mut eq = 0;
            while bytes.get(k) == Some(&b'=') {
                eq += 1;
                k += 1;
            }
            if eq == level && bytes.get(k) == Some(&b']') {
                return k + 1;
            }
        }
        j += 1;
    }
    bytes.len()
}

/// Reads a quoted string starting at `i`, returning its contents and end offset.
fn read_quoted(bytes: &[u8], i: usize) -> (String, usize) {
    let quote = bytes[i];
    let mut value = Vec::new();
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if j + 1 < bytes.len() => {
                value.push(bytes[j + 1]);
                j += 2;
            }
            b'\n' => break,
            b if b == quote => return (String::from_utf8_lossy(&value).into_owned(), j + 1),
            b => {
                value.push(b);
                j += 1;
            }
        }
    }
    (String::from_utf8_lossy(&value).into_owned(), j)
}
