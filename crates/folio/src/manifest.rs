// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The build manifest.
//!
//! `folio build` records the scanned routes in `routes-manifest.json` so the
//! production server can rebuild its [`RouteTable`] without walking the app
//! directory. File paths are stored relative to the project root, which keeps
//! the output directory relocatable together with the project.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{FolioError, Result};
use crate::route::{Route, RouteType};
use crate::scanner::RouteTable;

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Manifest file name inside the build output directory.
pub const MANIFEST_FILE: &str = "routes-manifest.json";

/// Build summary file name inside the build output directory.
pub const BUILD_INFO_FILE: &str = "build-info.json";

/// One route as persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRoute {
    /// URL pattern.
    pub path: String,
    /// Route role.
    #[serde(rename = "type")]
    pub route_type: RouteType,
    /// Source file relative to the app directory.
    pub file_path: String,
    /// Source file relative to the project root.
    pub absolute_path: String,
    /// Parameter names, left to right.
    pub params: Vec<String>,
    /// Ends in a required catch-all.
    pub is_catch_all: bool,
    /// Ends in an optional catch-all.
    pub is_optional_catch_all: bool,
    /// Layout chain, root first, relative to the project root.
    pub layouts: Vec<String>,
    /// A pre-rendered HTML file exists for this route.
    pub prerendered: bool,
}

/// Contents of `routes-manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Format version, [`MANIFEST_VERSION`].
    pub version: u32,
    /// RFC 3339 build timestamp.
    pub build_time: String,
    /// Every scanned route.
    pub routes: Vec<ManifestRoute>,
    /// Paths with a pre-rendered page.
    pub static_pages: Vec<String>,
    /// Page patterns rendered on demand.
    pub dynamic_routes: Vec<String>,
    /// API patterns.
    pub api_routes: Vec<String>,
}

/// Contents of `build-info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Build duration in milliseconds.
    pub duration: u64,
    /// RFC 3339 completion time.
    pub timestamp: String,
    /// Number of routes in the manifest.
    pub routes: usize,
    /// Number of pre-rendered pages.
    pub pages: usize,
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

impl Manifest {
    /// Describes `table`; `prerendered` holds the patterns that were written to disk.
    pub fn from_table(table: &RouteTable, project_root: &Path, prerendered: &BTreeSet<String>) -> Self {
        let routes = table
            .routes
            .iter()
            .map(|route| ManifestRoute {
                path: route.url_pattern.clone(),
                route_type: route.route_type,
                file_path: route.source_file_path.to_string_lossy().replace('\\', "/"),
                absolute_path: relative(&route.absolute_file_path, project_root),
                params: route.dynamic_param_names.clone(),
                is_catch_all: route.is_catch_all,
                is_optional_catch_all: route.is_optional_catch_all,
                layouts: route
                    .applicable_layouts
                    .iter()
                    .map(|l| relative(l, project_root))
                    .collect(),
                prerendered: prerendered.contains(&route.url_pattern),
            })
            .collect();

        let pages: Vec<&Route> = table.pages().collect();
        Self {
            version: MANIFEST_VERSION,
            build_time: Utc::now().to_rfc3339(),
            routes,
            static_pages: prerendered.iter().cloned().collect(),
            dynamic_routes: pages
                .iter()
                .filter(|r| !prerendered.contains(&r.url_pattern))
                .map(|r| r.url_pattern.clone())
                .collect(),
            api_routes: table.api_routes().map(|r| r.url_pattern.clone()).collect(),
        }
    }

    /// Reads a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FolioError::Manifest(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| FolioError::Manifest(format!("Invalid {}: {}", path.display(), e)))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(FolioError::Manifest(format!(
                "Unsupported manifest version {} (expected {})",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Writes the manifest as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rebuilds the route table with paths anchored at `project_root`.
    pub fn into_route_table(self, project_root: &Path) -> RouteTable {
        let routes = self
            .routes
            .into_iter()
            .map(|r| {
                Route::new(
                    r.path,
                    r.route_type,
                    PathBuf::from(r.file_path),
                    project_root.join(r.absolute_path),
                )
            })
            .collect();
        RouteTable::from_routes(routes)
    }
}

impl BuildInfo {
    /// Summary for a build that took `duration`.
    pub fn new(duration: std::time::Duration, routes: usize, pages: usize) -> Self {
        Self {
            duration: duration.as_millis() as u64,
            timestamp: Utc::now().to_rfc3339(),
            routes,
            pages,
        }
    }
}

/// Output file of a pre-rendered page: `/` is `pages/index.html`,
/// `/about` is `pages/about/index.html`.
pub fn page_output_path(output_dir: &Path, pattern: &str) -> PathBuf {
    let mut path = output_dir.join("pages");
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path.join("index.html")
}
