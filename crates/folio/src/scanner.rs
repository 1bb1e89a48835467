// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File-based route discovery.
//!
//! [`scan`] walks the app directory and turns every file with a reserved base
//! name (`page`, `layout`, `route`, `error`, `not-found`, `loading`) into a
//! [`Route`]. The result is an immutable [`RouteTable`]; a rescan builds a new
//! one rather than patching the old.

use glob::glob;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::layouts::{resolve_error_boundary, resolve_layouts};
use crate::matcher::{match_route, RouteMatch};
use crate::route::{normalize_pattern, Route, RouteType, RoutingError, Segment};

/// Options controlling discovery.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Source extensions that count as route files (without the dot).
    pub extensions: Vec<String>,
    /// Prefix prepended to every pattern (e.g. "/docs").
    pub base_path: String,
    /// Globs, relative to the app directory, for paths to skip.
    pub ignore: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["lua".to_string()],
            base_path: String::new(),
            ignore: default_ignore(),
        }
    }
}

/// Paths skipped by default: dependencies and `_private` folders.
pub fn default_ignore() -> Vec<String> {
    vec!["**/node_modules/**".to_string(), "**/_*/**".to_string()]
}

/// Two files that normalize to the same route. The first one in walk order is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConflict {
    /// Pattern both files map to.
    pub pattern: String,
    /// Type of the conflicting files.
    pub route_type: RouteType,
    /// The file that serves the route.
    pub kept: PathBuf,
    /// The file that was ignored.
    pub ignored: PathBuf,
}

impl fmt::Display for RouteConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} and {} both map to {} ({}); using {}",
            self.kept.display(),
            self.ignored.display(),
            self.pattern,
            self.route_type.as_str(),
            self.kept.display()
        )
    }
}

/// The set of routes produced by one scan.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// All routes in match order.
    pub routes: Vec<Route>,
    /// Layout files keyed by the pattern prefix they own.
    pub layouts: BTreeMap<String, PathBuf>,
    /// Error boundary files keyed by the pattern prefix they own.
    pub error_boundaries: BTreeMap<String, PathBuf>,
    /// Files that lost a conflict.
    pub conflicts: Vec<RouteConflict>,
    /// Files skipped because of malformed paths.
    pub warnings: Vec<RoutingError>,
}

impl RouteTable {
    /// Builds a table from routes, computing the layout lookups, each page's
    /// layout chain and the stable match order.
    pub fn from_routes(routes: Vec<Route>) -> Self {
        let mut layouts = BTreeMap::new();
        let mut error_boundaries = BTreeMap::new();
        for route in &routes {
            match route.route_type {
                RouteType::Layout => {
                    layouts
                        .entry(route.url_pattern.clone())
                        .or_insert_with(|| route.absolute_file_path.clone());
                }
                RouteType::Error => {
                    error_boundaries
                        .entry(route.url_pattern.clone())
                        .or_insert_with(|| route.absolute_file_path.clone());
                }
                _ => {}
            }
        }

        let mut routes: Vec<Route> = routes
            .into_iter()
            .map(|route| match route.route_type {
                RouteType::Page => {
                    let chain = resolve_layouts(&route.url_pattern, &layouts);
                    route.with_layouts(chain)
                }
                _ => route.with_layouts(Vec::new()),
            })
            .collect();
        sort_routes(&mut routes);

        Self {
            routes,
            layouts,
            error_boundaries,
            conflicts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Matches a request path against this table.
    pub fn match_path(&self, path: &str) -> RouteMatch<'_> {
        match_route(&self.routes, path)
    }

    /// Page routes in match order.
    pub fn pages(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| r.route_type == RouteType::Page)
    }

    /// API routes in match order.
    pub fn api_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| r.route_type == RouteType::Api)
    }

    /// Deepest error boundary covering `pattern`, if any.
    pub fn error_boundary_for(&self, pattern: &str) -> Option<&Path> {
        resolve_error_boundary(pattern, &self.error_boundaries)
    }

    /// Number of routes (all types).
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when the scan found nothing.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Sort key: catch-alls last, then fewer params, then static-before-dynamic
/// segment by segment, then lexical pattern.
fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| {
        let a_catch = a.is_catch_all || a.is_optional_catch_all;
        let b_catch = b.is_catch_all || b.is_optional_catch_all;
        let a_ranks: Vec<u8> = a.segments.iter().map(Segment::rank).collect();
        let b_ranks: Vec<u8> = b.segments.iter().map(Segment::rank).collect();

        a_catch
            .cmp(&b_catch)
            .then(a.dynamic_param_names.len().cmp(&b.dynamic_param_names.len()))
            .then(a_ranks.cmp(&b_ranks))
            .then(a.url_pattern.cmp(&b.url_pattern))
            .then(a.route_type.cmp(&b.route_type))
    });
}

/// Files of one class compete for the same pattern shape.
fn conflict_class(route_type: RouteType) -> &'static str {
    if route_type.is_matchable() {
        "matchable"
    } else {
        route_type.as_str()
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, RoutingError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RoutingError::DiscoveryFailed(format!("bad ignore glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RoutingError::DiscoveryFailed(e.to_string()))
}

/// Discovers routes under `root`.
///
/// A missing directory yields an empty table. Malformed paths and conflicts
/// are reported on the table and logged once, never returned as errors.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<RouteTable, RoutingError> {
    if !root.is_dir() {
        debug!(root = %root.display(), "app directory does not exist");
        return Ok(RouteTable::default());
    }
    let root = std::fs::canonicalize(root).map_err(|e| RoutingError::DiscoveryFailed(e.to_string()))?;
    let ignore = build_ignore_set(&options.ignore)?;

    let walk_pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let entries = glob(&walk_pattern).map_err(|e| RoutingError::DiscoveryFailed(e.to_string()))?;

    let mut warnings = Vec::new();
    let mut conflicts = Vec::new();
    let mut kept: HashMap<(&'static str, String), PathBuf> = HashMap::new();
    let mut routes = Vec::new();

    for path in entries.flatten() {
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        if ignore.is_match(relative) {
            continue;
        }
        let Some(route_type) = classify(relative, &options.extensions) else {
            continue;
        };

        let pattern = match dir_to_pattern(relative, &options.base_path) {
            Ok(pattern) => pattern,
            Err(e) => {
                warnings.push(e);
                continue;
            }
        };

        let route = Route::new(pattern, route_type, relative, &path);
        let key = (conflict_class(route_type), route.shape());
        if let Some(winner) = kept.get(&key) {
            conflicts.push(RouteConflict {
                pattern: route.url_pattern.clone(),
                route_type,
                kept: winner.clone(),
                ignored: relative.to_path_buf(),
            });
            continue;
        }
        kept.insert(key, relative.to_path_buf());
        routes.push(route);
    }

    for warning in &warnings {
        warn!("{}", warning);
    }
    for conflict in &conflicts {
        warn!("Route conflict: {}", conflict);
    }

    let mut table = RouteTable::from_routes(routes);
    table.conflicts = conflicts;
    table.warnings = warnings;

    info!(
        routes = table.len(),
        layouts = table.layouts.len(),
        root = %root.display(),
        "scanned routes"
    );
    Ok(table)
}

/// Route type of a file, if its base name is reserved and its extension supported.
fn classify(relative: &Path, extensions: &[String]) -> Option<RouteType> {
    let ext = relative.extension()?.to_str()?;
    if !extensions.iter().any(|e| e.trim_start_matches('.') == ext) {
        return None;
    }
    RouteType::from_base_name(relative.file_stem()?.to_str()?)
}

/// Converts the directory part of a route file path into a URL pattern.
fn dir_to_pattern(relative: &Path, base_path: &str) -> Result<String, RoutingError> {
    let dirs: Vec<&str> = relative
        .parent()
        .map(|parent| parent.components().filter_map(|c| c.as_os_str().to_str()).collect())
        .unwrap_or_default();

    let mut segments = Vec::with_capacity(dirs.len());
    for (index, dir) in dirs.iter().enumerate() {
        let segment = Segment::parse_dir(dir).map_err(|reason| RoutingError::InvalidSegment {
            file: relative.to_path_buf(),
            segment: dir.to_string(),
            reason,
        })?;
        if matches!(segment, Segment::CatchAll { .. }) && index + 1 < dirs.len() {
            return Err(RoutingError::MisplacedCatchAll {
                file: relative.to_path_buf(),
                segment: dir.to_string(),
            });
        }
        segments.push(segment.to_pattern());
    }

    Ok(normalize_pattern(&format!("{}/{}", base_path, segments.join("/"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "return {}").unwrap();
    }

    fn patterns(table: &RouteTable, route_type: RouteType) -> Vec<String> {
        table
            .routes
            .iter()
            .filter(|r| r.route_type == route_type)
            .map(|r| r.url_pattern.clone())
            .collect()
    }

    #[test]
    fn test_dir_to_pattern() {
        let p = |s: &str| dir_to_pattern(Path::new(s), "").unwrap();
        assert_eq!(p("page.lua"), "/");
        assert_eq!(p("about/page.lua"), "/about");
        assert_eq!(p("users/[id]/page.lua"), "/users/:id");
        assert_eq!(p("docs/[...slug]/page.lua"), "/docs/*slug");
        assert_eq!(p("shop/[[...slug]]/page.lua"), "/shop/*slug?");
        assert_eq!(
            dir_to_pattern(Path::new("about/page.lua"), "/base/").unwrap(),
            "/base/about"
        );
    }

    #[test]
    fn test_misplaced_catch_all_is_rejected() {
        let err = dir_to_pattern(Path::new("docs/[...slug]/edit/page.lua"), "").unwrap_err();
        assert!(matches!(err, RoutingError::MisplacedCatchAll { .. }));
    }

    #[test]
    fn test_scan_discovers_all_types() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "page.lua");
        touch(root, "layout.lua");
        touch(root, "error.lua");
        touch(root, "about/page.lua");
        touch(root, "users/[id]/page.lua");
        touch(root, "users/loading.lua");
        touch(root, "api/hello/route.lua");
        touch(root, "components/button.lua");
        touch(root, "about/notes.txt");

        let table = scan(root, &ScanOptions::default()).unwrap();

        assert_eq!(patterns(&table, RouteType::Page), vec!["/", "/about", "/users/:id"]);
        assert_eq!(patterns(&table, RouteType::Api), vec!["/api/hello"]);
        assert_eq!(patterns(&table, RouteType::Layout), vec!["/"]);
        assert_eq!(patterns(&table, RouteType::Error), vec!["/"]);
        assert_eq!(patterns(&table, RouteType::Loading), vec!["/users"]);
        assert!(table.conflicts.is_empty());
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn test_scan_ignores_private_and_node_modules() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "_drafts/page.lua");
        touch(dir.path(), "node_modules/pkg/page.lua");
        touch(dir.path(), "blog/page.lua");

        let table = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/blog"]);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let table = scan(&dir.path().join("nope"), &ScanOptions::default()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_conflicting_params_first_wins() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "users/[id]/page.lua");
        touch(dir.path(), "users/[uid]/page.lua");

        let table = scan(dir.path(), &ScanOptions::default()).unwrap();
        let pages: Vec<&Route> = table.pages().collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source_file_path, Path::new("users/[id]/page.lua"));
        assert_eq!(table.conflicts.len(), 1);
        assert_eq!(table.conflicts[0].ignored, Path::new("users/[uid]/page.lua"));
    }

    #[test]
    fn test_page_and_api_on_same_pattern_conflict() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "feed/page.lua");
        touch(dir.path(), "feed/route.lua");

        let table = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/feed"]);
        assert!(patterns(&table, RouteType::Api).is_empty());
        assert_eq!(table.conflicts.len(), 1);
    }

    #[test]
    fn test_invalid_segments_become_warnings() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "[[tab]]/page.lua");
        touch(dir.path(), "ok/page.lua");

        let table = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/ok"]);
        assert_eq!(table.warnings.len(), 1);
    }

    #[test]
    fn test_extension_list_is_respected() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/page.lua");
        touch(dir.path(), "b/page.luau");

        let options = ScanOptions {
            extensions: vec!["luau".to_string()],
            ..ScanOptions::default()
        };
        let table = scan(dir.path(), &options).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/b"]);
    }

    #[test]
    fn test_base_path_prefixes_every_pattern() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "layout.lua");
        touch(dir.path(), "page.lua");
        touch(dir.path(), "users/[id]/page.lua");
        touch(dir.path(), "api/health/route.lua");

        let options = ScanOptions {
            base_path: "/docs".to_string(),
            ..ScanOptions::default()
        };
        let table = scan(dir.path(), &options).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/docs", "/docs/users/:id"]);
        assert_eq!(patterns(&table, RouteType::Api), vec!["/docs/api/health"]);

        let m = table.match_path("/docs/users/7");
        let route = m.route.unwrap();
        assert_eq!(m.params.get("id").map(String::as_str), Some("7"));
        assert_eq!(route.applicable_layouts.len(), 1);
        assert!(table.match_path("/users/7").route.is_none());
    }

    #[test]
    fn test_parenthesized_directory_is_a_static_segment() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "(marketing)/about/page.lua");
        let table = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(patterns(&table, RouteType::Page), vec!["/(marketing)/about"]);
        assert!(table.match_path("/about").route.is_none());
    }

    #[test]
    fn test_scan_order_is_deterministic() {
        let files = [
            "shop/[[...path]]/page.lua",
            "[category]/[id]/page.lua",
            "blog/[slug]/page.lua",
            "docs/[...slug]/page.lua",
            "about/page.lua",
            "blog/featured/page.lua",
            "page.lua",
        ];
        let forward = tempdir().unwrap();
        for file in files {
            touch(forward.path(), file);
        }
        let reverse = tempdir().unwrap();
        for file in files.iter().rev() {
            touch(reverse.path(), file);
        }

        let first = patterns(&scan(forward.path(), &ScanOptions::default()).unwrap(), RouteType::Page);
        let second = patterns(&scan(forward.path(), &ScanOptions::default()).unwrap(), RouteType::Page);
        let other = patterns(&scan(reverse.path(), &ScanOptions::default()).unwrap(), RouteType::Page);

        assert_eq!(
            first,
            vec![
                "/",
                "/about",
                "/blog/featured",
                "/blog/:slug",
                "/:category/:id",
                "/docs/*slug",
                "/shop/*path?",
            ]
        );
        assert_eq!(first, second);
        assert_eq!(first, other);
    }

    #[test]
    fn test_sort_order() {
        let routes = vec![
            Route::new("/docs/*slug", RouteType::Page, "a", "a"),
            Route::new("/:category/featured", RouteType::Page, "b", "b"),
            Route::new("/blog/:slug", RouteType::Page, "c", "c"),
            Route::new("/users/me", RouteType::Page, "d", "d"),
            Route::new("/users/:id", RouteType::Page, "e", "e"),
            Route::new("/shop/*slug?", RouteType::Page, "f", "f"),
        ];
        let table = RouteTable::from_routes(routes);
        let order: Vec<&str> = table.routes.iter().map(|r| r.url_pattern.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "/users/me",
                "/blog/:slug",
                "/users/:id",
                "/:category/featured",
                "/docs/*slug",
                "/shop/*slug?",
            ]
        );
    }
}
