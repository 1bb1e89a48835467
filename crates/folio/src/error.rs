// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for folio.
//!
//! [`FolioError`] covers everything that can fail while loading, rendering or
//! invoking a route module. Every variant is a per-request failure: the
//! serving loop turns it into an HTTP response via [`FolioError::status_code`]
//! and, in development, into an overlay via [`FolioError::payload`].
//!
//! Scan-time problems are not errors here; the scanner reports them as
//! warnings on the route table (see [`crate::scanner::RouteConflict`]).

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Source context for compile errors.
///
/// Captures a snippet of source code around an error location, with line
/// numbers and a caret under the offending column.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from source code and error location.
    ///
    /// Captures 3 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(3).max(1);
        let snippet_end = (line + 3).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the snippet with line numbers and a caret.
    ///
    /// ```text
    ///    2 | return {
    ///    3 |   default = function(props)
    ///      | ^
    ///    4 | }
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            let Some(line) = self.lines.get(line_num - 1) else {
                break;
            };

            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// The main error type for folio operations.
#[derive(Error, Debug)]
pub enum FolioError {
    /// A module file is absent at load time.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The transpiler rejected a source file.
    #[error("Compile error in {}: {message}", file.display())]
    Compile {
        /// The file that failed to compile.
        file: PathBuf,
        /// The compiler's message.
        message: String,
        /// Line of the error, when the compiler reported one.
        line: Option<usize>,
        /// Column of the error, when the compiler reported one.
        column: Option<usize>,
        /// Formatted source frame around the error.
        frame: Option<String>,
    },

    /// A page or layout module has no `default` export.
    #[error("No default export found in {}", .0.display())]
    NoDefaultExport(PathBuf),

    /// An API module has no handler for the request method.
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    /// Modules import each other in a cycle.
    #[error("Import cycle: {}", display_chain(.0))]
    ImportCycle(Vec<PathBuf>),

    /// An import specifier could not be resolved to a file.
    #[error("Cannot resolve '{specifier}' from {}", from.display())]
    UnresolvedImport {
        /// The specifier as written in `require`.
        specifier: String,
        /// The importing module.
        from: PathBuf,
    },

    /// A module raised an error while rendering or handling a request.
    #[error("Runtime error in {}: {message}", file.display())]
    Runtime {
        /// The module where the error surfaced.
        file: PathBuf,
        /// Error message, including the Lua traceback when available.
        message: String,
    },

    /// Lua state error outside of a specific module.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The build manifest is missing or malformed.
    #[error("Manifest error: {0}")]
    Manifest(String),
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Convenience type alias for Results with [`FolioError`].
pub type Result<T> = std::result::Result<T, FolioError>;

/// Structured error sent to the browser overlay and over HMR.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorPayload {
    /// Error category (`compile`, `runtime`, `not-found`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Offending file, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Stack trace or full error chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Source frame around the error location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    /// Error line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Error column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    /// Suggested fix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FolioError {
    /// HTTP status this error maps to at the serving boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            FolioError::NotFound(_) => 404,
            FolioError::MethodNotAllowed(_) => 405,
            _ => 500,
        }
    }

    /// Short category name used in overlays and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FolioError::NotFound(_) => "not-found",
            FolioError::Compile { .. } => "compile",
            FolioError::NoDefaultExport(_) => "no-default-export",
            FolioError::MethodNotAllowed(_) => "method-not-allowed",
            FolioError::ImportCycle(_) => "import-cycle",
            FolioError::UnresolvedImport { .. } => "unresolved-import",
            FolioError::Runtime { .. } | FolioError::Lua(_) => "runtime",
            FolioError::Io(_) => "io",
            FolioError::Json(_) => "json",
            FolioError::Cache(_) => "cache",
            FolioError::Manifest(_) => "manifest",
        }
    }

    /// Builds the overlay payload for this error.
    pub fn payload(&self) -> ErrorPayload {
        let mut payload = ErrorPayload {
            kind: self.kind().to_string(),
            file: None,
            message: self.to_string(),
            stack: None,
            frame: None,
            line: None,
            column: None,
            hint: None,
        };

        match self {
            FolioError::Compile {
                file,
                message,
                line,
                column,
                frame,
            } => {
                payload.file = Some(file.display().to_string());
                payload.message = message.clone();
                payload.line = *line;
                payload.column = *column;
                payload.frame = frame.clone();
                payload.hint = Some("Fix the syntax error and save the file.".to_string());
            }
            FolioError::NoDefaultExport(file) => {
                payload.file = Some(file.display().to_string());
                payload.hint = Some(
                    "Return a table with a `default` function, e.g. `return { default = function(props) ... end }`."
                        .to_string(),
                );
            }
            FolioError::NotFound(file) => {
                payload.file = Some(file.display().to_string());
            }
            FolioError::UnresolvedImport { from, .. } => {
                payload.file = Some(from.display().to_string());
                payload.hint = Some(
                    "Imports may be relative (./, ../) or use the @/ alias for the project root."
                        .to_string(),
                );
            }
            FolioError::Runtime { file, message } => {
                payload.file = Some(file.display().to_string());
                let mut lines = message.lines();
                payload.message = lines.next().unwrap_or_default().to_string();
                let rest: Vec<&str> = lines.collect();
                if !rest.is_empty() {
                    payload.stack = Some(rest.join("\n"));
                }
            }
            _ => {}
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_context_snippet() {
        let source = "line1\nline2\nline3\nline4\nline5";
        let ctx = SourceContext::from_source(source, 3, 2);
        let snippet = ctx.format_snippet();
        assert!(snippet.contains("   3 | line3\n     |  ^\n"));
        assert!(snippet.starts_with("   1 | line1"));
        assert!(snippet.contains("   5 | line5"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FolioError::NotFound(PathBuf::from("a.lua")).status_code(), 404);
        assert_eq!(FolioError::MethodNotAllowed("PUT".into()).status_code(), 405);
        assert_eq!(FolioError::NoDefaultExport(PathBuf::from("a.lua")).status_code(), 500);
    }

    #[test]
    fn test_compile_payload_serializes_type_field() {
        let err = FolioError::Compile {
            file: PathBuf::from("app/page.lua"),
            message: "'=' expected near 'x'".into(),
            line: Some(3),
            column: None,
            frame: Some("   3 | x\n".into()),
        };
        let value = serde_json::to_value(err.payload()).unwrap();
        assert_eq!(value["type"], "compile");
        assert_eq!(value["file"], "app/page.lua");
        assert_eq!(value["line"], 3);
        assert!(value.get("column").is_none());
    }

    #[test]
    fn test_runtime_payload_splits_stack() {
        let err = FolioError::Runtime {
            file: PathBuf::from("app/page.lua"),
            message: "boom\nstack traceback:\n\t[C]: in ?".into(),
        };
        let payload = err.payload();
        assert_eq!(payload.message, "boom");
        assert!(payload.stack.unwrap().starts_with("stack traceback:"));
    }
}
