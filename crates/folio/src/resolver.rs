// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Import specifier resolution.
//!
//! Maps the string passed to `require` to what the loader should provide:
//!
//! 1. **Relative** (`./button`, `../shared/card`): against the importer's directory
//! 2. **Alias** (`@/lib/format`): against the project root
//! 3. **Root-relative** (`/lib/format`): against the project root
//! 4. **Bare** (`json`, `html`): built-in runtime modules, otherwise root-relative
//!
//! Files are found by trying the exact path, then each supported extension,
//! then an `index` file inside the directory. Stylesheets, images and fonts
//! are never read: they resolve to an empty asset.

use std::path::{Component, Path, PathBuf};

use crate::error::{FolioError, Result};

/// Import extensions that resolve to an empty mock during server rendering.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "css", "scss", "sass", "less", "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico",
    "woff", "woff2", "ttf", "otf",
];

/// Modules provided by the runtime itself.
pub const BUILTIN_MODULES: &[&str] = &["json", "html"];

/// What an import specifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedImport {
    /// A source module to compile and evaluate.
    Module(PathBuf),
    /// A JSON document, decoded into a Lua value.
    Json(PathBuf),
    /// A non-code asset, mocked as `{ default = "" }`.
    Asset(String),
    /// A runtime-provided module.
    Builtin(String),
}

impl ResolvedImport {
    /// File backing this import, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedImport::Module(p) | ResolvedImport::Json(p) => Some(p),
            _ => None,
        }
    }
}

/// Resolves import specifiers for one project.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl ImportResolver {
    /// Creates a resolver rooted at the project directory.
    pub fn new<P: AsRef<Path>>(root: P, extensions: &[String]) -> Self {
        let root = root.as_ref();
        Self {
            root: std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// The project root used for `@/` and root-relative imports.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `specifier` as written in `importer`.
    pub fn resolve(&self, importer: &Path, specifier: &str) -> Result<ResolvedImport> {
        let unresolved = || FolioError::UnresolvedImport {
            specifier: specifier.to_string(),
            from: importer.to_path_buf(),
        };

        let base_dir = importer.parent().unwrap_or(&self.root);
        let candidate = if specifier.starts_with("./") || specifier.starts_with("../") {
            base_dir.join(specifier)
        } else if let Some(rest) = specifier.strip_prefix("@/") {
            self.root.join(rest)
        } else if let Some(rest) = specifier.strip_prefix('/') {
            self.root.join(rest)
        } else if BUILTIN_MODULES.contains(&specifier) {
            return Ok(ResolvedImport::Builtin(specifier.to_string()));
        } else {
            self.root.join(specifier)
        };
        let candidate = normalize_path(&candidate);

        let ext = candidate.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return Ok(ResolvedImport::Asset(specifier.to_string()));
        }
        if ext == "json" {
            return if candidate.is_file() {
                Ok(ResolvedImport::Json(canonical(&candidate)))
            } else {
                Err(unresolved())
            };
        }

        self.find_module(&candidate)
            .map(|p| ResolvedImport::Module(canonical(&p)))
            .ok_or_else(unresolved)
    }

    fn find_module(&self, candidate: &Path) -> Option<PathBuf> {
        let has_supported_ext = candidate
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x == e));
        if has_supported_ext && candidate.is_file() {
            return Some(candidate.to_path_buf());
        }

        for ext in &self.extensions {
            let mut with_ext = candidate.as_os_str().to_owned();
            with_ext.push(".");
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if candidate.is_dir() {
            for ext in &self.extensions {
                let index = candidate.join(format!("index.{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lexically resolves `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
