// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Types for the file-based routing system.
//!
//! Directory names use bracket syntax, URL patterns use the compact form:
//!
//! | Directory     | Pattern  | Matches                    |
//! |---------------|----------|----------------------------|
//! | `users`       | `users`  | exactly `users`            |
//! | `[id]`        | `:id`    | one segment                |
//! | `[...slug]`   | `*slug`  | one or more segments       |
//! | `[[...slug]]` | `*slug?` | zero or more segments      |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The role a route file plays, determined by its base name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    /// `page.*`: renders an HTML document.
    Page,
    /// `layout.*`: wraps pages below its directory.
    Layout,
    /// `route.*`: HTTP method handlers.
    Api,
    /// `error.*` or `not-found.*`: error boundary.
    Error,
    /// `loading.*`: loading state.
    Loading,
}

impl RouteType {
    /// Maps a reserved file base name to its route type.
    pub fn from_base_name(name: &str) -> Option<Self> {
        match name {
            "page" => Some(RouteType::Page),
            "layout" => Some(RouteType::Layout),
            "route" => Some(RouteType::Api),
            "error" | "not-found" => Some(RouteType::Error),
            "loading" => Some(RouteType::Loading),
            _ => None,
        }
    }

    /// Lowercase name, as written in the manifest.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Page => "page",
            RouteType::Layout => "layout",
            RouteType::Api => "api",
            RouteType::Error => "error",
            RouteType::Loading => "loading",
        }
    }

    /// Pages and API routes are the only types the matcher considers.
    pub fn is_matchable(&self) -> bool {
        matches!(self, RouteType::Page | RouteType::Api)
    }
}

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal segment (e.g., "blog")
    Static(String),

    /// Single dynamic segment (e.g., "[slug]" -> ":slug")
    Dynamic(String),

    /// Catch-all (e.g., "[...rest]" -> "*rest", "[[...rest]]" -> "*rest?")
    CatchAll {
        /// Parameter name.
        name: String,
        /// Whether zero trailing segments also match.
        optional: bool,
    },
}

impl Segment {
    /// Parses a directory name in bracket syntax.
    pub fn parse_dir(segment: &str) -> Result<Self, String> {
        if let Some(inner) = segment.strip_prefix("[[").and_then(|s| s.strip_suffix("]]")) {
            let Some(name) = inner.strip_prefix("...") else {
                return Err("optional segments must be catch-alls, e.g. [[...name]]".to_string());
            };
            return Ok(Segment::CatchAll {
                name: valid_name(name)?,
                optional: true,
            });
        }

        if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(name) = inner.strip_prefix("...") {
                return Ok(Segment::CatchAll {
                    name: valid_name(name)?,
                    optional: false,
                });
            }
            return Ok(Segment::Dynamic(valid_name(inner)?));
        }

        if segment.contains('[') || segment.contains(']') {
            return Err("brackets must wrap the whole segment".to_string());
        }

        Ok(Segment::Static(segment.to_string()))
    }

    /// Parses one segment of a URL pattern (`:id`, `*slug`, `*slug?`).
    pub fn parse_pattern(segment: &str) -> Self {
        if let Some(name) = segment.strip_prefix('*') {
            match name.strip_suffix('?') {
                Some(name) => Segment::CatchAll {
                    name: name.to_string(),
                    optional: true,
                },
                None => Segment::CatchAll {
                    name: name.to_string(),
                    optional: false,
                },
            }
        } else if let Some(name) = segment.strip_prefix(':') {
            Segment::Dynamic(name.to_string())
        } else {
            Segment::Static(segment.to_string())
        }
    }

    /// Pattern form of this segment.
    pub fn to_pattern(&self) -> String {
        match self {
            Segment::Static(s) => s.clone(),
            Segment::Dynamic(name) => format!(":{}", name),
            Segment::CatchAll { name, optional: false } => format!("*{}", name),
            Segment::CatchAll { name, optional: true } => format!("*{}?", name),
        }
    }

    /// Pattern form with the parameter name erased.
    ///
    /// Two routes with the same shape match exactly the same paths.
    pub fn shape(&self) -> String {
        match self {
            Segment::Static(s) => s.clone(),
            Segment::Dynamic(_) => ":".to_string(),
            Segment::CatchAll { optional: false, .. } => "*".to_string(),
            Segment::CatchAll { optional: true, .. } => "*?".to_string(),
        }
    }

    /// Ordering rank: static < dynamic < catch-all.
    pub fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Dynamic(_) => 1,
            Segment::CatchAll { .. } => 2,
        }
    }

    /// Parameter name, if this segment binds one.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Static(_) => None,
            Segment::Dynamic(name) | Segment::CatchAll { name, .. } => Some(name),
        }
    }
}

fn valid_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("parameter name is empty".to_string());
    }
    if name.contains(['[', ']', '.', '/']) {
        return Err(format!("invalid parameter name '{}'", name));
    }
    Ok(name.to_string())
}

/// Normalizes a pattern: leading slash, no repeated slashes, no trailing
/// slash except for the root.
pub fn normalize_pattern(path: &str) -> String {
    let joined = path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

/// A routable file discovered by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// URL pattern, e.g. `/users/:id`, `/docs/*slug`, `/shop/*slug?`.
    pub url_pattern: String,

    /// Path of the file relative to the app directory (e.g. "users/[id]/page.lua").
    pub source_file_path: PathBuf,

    /// Resolved path used for loading.
    pub absolute_file_path: PathBuf,

    /// The file's role.
    pub route_type: RouteType,

    /// Parameter names in left-to-right order.
    pub dynamic_param_names: Vec<String>,

    /// Last segment is a required catch-all.
    pub is_catch_all: bool,

    /// Last segment is an optional catch-all.
    pub is_optional_catch_all: bool,

    /// Layout files wrapping this route, root first. Empty unless `route_type` is `Page`.
    pub applicable_layouts: Vec<PathBuf>,

    /// Parsed pattern segments.
    pub segments: Vec<Segment>,
}

impl Route {
    /// Builds a route from a normalized pattern.
    ///
    /// Parameter names and catch-all flags are derived from the pattern.
    pub fn new(
        url_pattern: impl Into<String>,
        route_type: RouteType,
        source_file_path: impl Into<PathBuf>,
        absolute_file_path: impl Into<PathBuf>,
    ) -> Self {
        let url_pattern = normalize_pattern(&url_pattern.into());
        let segments: Vec<Segment> = url_pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::parse_pattern)
            .collect();

        let dynamic_param_names = segments
            .iter()
            .filter_map(|s| s.param_name().map(str::to_string))
            .collect();
        let (is_catch_all, is_optional_catch_all) = match segments.last() {
            Some(Segment::CatchAll { optional, .. }) => (!optional, *optional),
            _ => (false, false),
        };

        Self {
            url_pattern,
            source_file_path: source_file_path.into(),
            absolute_file_path: absolute_file_path.into(),
            route_type,
            dynamic_param_names,
            is_catch_all,
            is_optional_catch_all,
            applicable_layouts: Vec::new(),
            segments,
        }
    }

    /// Attaches the layout chain.
    pub fn with_layouts(mut self, layouts: Vec<PathBuf>) -> Self {
        self.applicable_layouts = layouts;
        self
    }

    /// True for `page` and `api` routes.
    pub fn is_matchable(&self) -> bool {
        self.route_type.is_matchable()
    }

    /// True when the route binds no parameters and can be pre-rendered.
    pub fn is_static(&self) -> bool {
        self.dynamic_param_names.is_empty()
    }

    /// Pattern with parameter names erased, used for conflict detection.
    pub fn shape(&self) -> String {
        let shape: Vec<String> = self.segments.iter().map(Segment::shape).collect();
        format!("/{}", shape.join("/"))
    }
}

/// Scan-time routing problems. Reported as warnings, never fatal.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RoutingError {
    /// A directory name uses malformed bracket syntax.
    #[error("Invalid segment '{segment}' in {}: {reason}", file.display())]
    InvalidSegment {
        /// File whose path contains the segment.
        file: PathBuf,
        /// The offending directory name.
        segment: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A catch-all directory has further segments below it.
    #[error("Catch-all '{segment}' must be the last segment in {}", file.display())]
    MisplacedCatchAll {
        /// File whose path contains the segment.
        file: PathBuf,
        /// The catch-all directory name.
        segment: String,
    },

    /// Route discovery failed during filesystem scanning.
    #[error("Route discovery failed: {0}")]
    DiscoveryFailed(String),
}
