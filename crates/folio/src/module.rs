// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Evaluated route modules.

use mlua::{Function, Table, Value};
use std::path::{Path, PathBuf};

use crate::cache::Fingerprint;
use crate::error::{FolioError, Result};

/// A module after evaluation, as held by the loader's cache.
///
/// The export table stays owned by the loader's Lua state; the handle is cheap
/// to share between requests.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    path: PathBuf,
    exports: Table,
    fingerprint: Fingerprint,
    dependencies: Vec<(PathBuf, Fingerprint)>,
}

impl LoadedModule {
    pub(crate) fn new(
        path: PathBuf,
        exports: Table,
        fingerprint: Fingerprint,
        dependencies: Vec<(PathBuf, Fingerprint)>,
    ) -> Self {
        Self {
            path,
            exports,
            fingerprint,
            dependencies,
        }
    }

    /// Absolute path the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The module's export table.
    pub fn exports(&self) -> &Table {
        &self.exports
    }

    /// Fingerprint of the source when it was compiled.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Every file this module transitively imported, with its fingerprint at load time.
    pub fn dependencies(&self) -> &[(PathBuf, Fingerprint)] {
        &self.dependencies
    }

    fn function(&self, name: &str) -> Option<Function> {
        match self.exports.get::<Value>(name) {
            Ok(Value::Function(f)) => Some(f),
            _ => None,
        }
    }

    /// The `default` export, if it is a function.
    pub fn default_export(&self) -> Option<Function> {
        self.function("default")
    }

    /// The `default` export, or [`FolioError::NoDefaultExport`].
    pub fn require_default(&self) -> Result<Function> {
        self.default_export()
            .ok_or_else(|| FolioError::NoDefaultExport(self.path.clone()))
    }

    /// The static `metadata` table.
    pub fn metadata(&self) -> Option<Table> {
        match self.exports.get::<Value>("metadata") {
            Ok(Value::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// `generateMetadata`, also accepted as `generate_metadata`.
    pub fn generate_metadata(&self) -> Option<Function> {
        self.function("generateMetadata")
            .or_else(|| self.function("generate_metadata"))
    }

    /// Handler for an HTTP method, falling back to `default`.
    pub fn handler(&self, method: &str) -> Option<Function> {
        self.function(&method.to_ascii_uppercase())
            .or_else(|| self.default_export())
    }
}
