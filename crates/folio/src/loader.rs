// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Module loading with compile caching.
//!
//! [`ModuleLoader::load`] returns an evaluated module for an absolute path.
//! A module is served from memory while its own fingerprint and the
//! fingerprints of everything it imported are unchanged; otherwise it is
//! recompiled through the [`Transpiler`] and re-evaluated.
//!
//! Concurrent loads of the same uncached file share one compilation: the
//! compile step runs under a per-path lock and publishes its output before
//! releasing it. Dependencies are loaded after the lock is released, so two
//! requests entering an import cycle from opposite ends cannot deadlock.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::cache::{CacheConfig, Fingerprint, ModuleCache, TransformCache};
use crate::error::{FolioError, Result};
use crate::module::LoadedModule;
use crate::resolver::{ImportResolver, ResolvedImport};
use crate::runtime::LuaRuntime;
use crate::transpiler::{TransformOutput, TransformRequest, Transpiler};

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Source extensions tried during import resolution.
    pub extensions: Vec<String>,
    /// In-memory cache eviction.
    pub cache: CacheConfig,
    /// Directory of the persistent transform cache; `None` disables it.
    pub transform_cache_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["lua".to_string()],
            cache: CacheConfig::default(),
            transform_cache_dir: None,
        }
    }
}

struct Compiled {
    fingerprint: Fingerprint,
    output: std::result::Result<TransformOutput, CompileFailure>,
}

/// A rejected source, kept so waiters on the same fingerprint share it.
#[derive(Clone)]
struct CompileFailure {
    message: String,
    line: Option<usize>,
    column: Option<usize>,
    frame: Option<String>,
}

impl CompileFailure {
    fn from_error(err: &FolioError) -> Option<Self> {
        match err {
            FolioError::Compile {
                message,
                line,
                column,
                frame,
                ..
            } => Some(Self {
                message: message.clone(),
                line: *line,
                column: *column,
                frame: frame.clone(),
            }),
            _ => None,
        }
    }

    fn to_error(&self, file: &Path) -> FolioError {
        FolioError::Compile {
            file: file.to_path_buf(),
            message: self.message.clone(),
            line: self.line,
            column: self.column,
            frame: self.frame.clone(),
        }
    }
}

type InFlight = Arc<tokio::sync::Mutex<()>>;

/// Loads, compiles, caches and evaluates route modules.
pub struct ModuleLoader {
    resolver: ImportResolver,
    runtime: Arc<LuaRuntime>,
    transpiler: Arc<dyn Transpiler>,
    modules: ModuleCache<LoadedModule>,
    compiled: ModuleCache<Compiled>,
    transforms: Option<TransformCache>,
    in_flight: Mutex<HashMap<PathBuf, InFlight>>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("root", &self.resolver.root())
            .field("transpiler", &self.transpiler)
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

impl ModuleLoader {
    /// Creates a loader for the project at `root`.
    ///
    /// Fails if the Lua runtime cannot be initialized. An unusable persistent
    /// cache directory only disables that cache.
    pub fn new<P: AsRef<Path>>(
        root: P,
        transpiler: Arc<dyn Transpiler>,
        config: LoaderConfig,
    ) -> Result<Self> {
        let transforms = config
            .transform_cache_dir
            .as_ref()
            .and_then(|dir| match TransformCache::new(dir) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Persistent transform cache disabled: {}", e);
                    None
                }
            });

        Ok(Self {
            resolver: ImportResolver::new(root, &config.extensions),
            runtime: Arc::new(LuaRuntime::new()?),
            transpiler,
            modules: ModuleCache::new(config.cache),
            compiled: ModuleCache::new(config.cache),
            transforms,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Project root used for alias and root-relative imports.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// The Lua runtime modules are evaluated in.
    pub fn runtime(&self) -> &Arc<LuaRuntime> {
        &self.runtime
    }

    /// Loads the module at `path`, from cache when it is still fresh.
    pub async fn load(&self, path: &Path) -> Result<Arc<LoadedModule>> {
        self.load_inner(path.to_path_buf(), Vec::new()).await
    }

    /// Drops cached state for one file, or for everything when `path` is `None`.
    ///
    /// Modules importing an invalidated file are detected as stale on their
    /// next load through their dependency fingerprints.
    pub fn invalidate(&self, path: Option<&Path>) {
        let result = match path {
            None => self.modules.clear().and_then(|_| self.compiled.clear()),
            Some(path) => {
                let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
                self.modules
                    .remove(&path)
                    .and_then(|_| self.compiled.remove(&path))
            }
        };
        if let Err(e) = result {
            warn!("Failed to invalidate module cache: {}", e);
        }
    }

    /// True when `path` has an evaluated module in memory.
    pub fn is_cached(&self, path: &Path) -> bool {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.modules.contains_key(&path)
    }

    fn load_inner(&self, path: PathBuf, stack: Vec<PathBuf>) -> BoxFuture<'_, Result<Arc<LoadedModule>>> {
        Box::pin(async move {
            let path = match tokio::fs::canonicalize(&path).await {
                Ok(path) => path,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(FolioError::NotFound(path));
                }
                Err(e) => return Err(e.into()),
            };

            if stack.contains(&path) {
                let mut chain = stack;
                chain.push(path);
                return Err(FolioError::ImportCycle(chain));
            }

            let fingerprint = Fingerprint::of(&path).await?;
            if let Some(module) = self.modules.get(&path)? {
                if module.fingerprint() == fingerprint && dependencies_fresh(&module).await {
                    debug!(path = %path.display(), "module cache hit");
                    return Ok(module);
                }
            }
            debug!(path = %path.display(), "module cache miss");

            let output = self.compile(&path, fingerprint).await?;

            let resolutions = self.runtime.create_table()?;
            let mut dependencies = Vec::new();
            let mut chain = stack;
            chain.push(path.clone());

            for specifier in &output.imports {
                let value = match self.resolver.resolve(&path, specifier)? {
                    ResolvedImport::Module(dep_path) => {
                        let dep = self.load_inner(dep_path, chain.clone()).await?;
                        record(&mut dependencies, dep.path().to_path_buf(), dep.fingerprint());
                        for (p, f) in dep.dependencies() {
                            record(&mut dependencies, p.clone(), *f);
                        }
                        mlua::Value::Table(dep.exports().clone())
                    }
                    ResolvedImport::Json(json_path) => {
                        let text = read_source(&json_path).await?;
                        record(&mut dependencies, json_path.clone(), Fingerprint::of(&json_path).await?);
                        let value: serde_json::Value = serde_json::from_str(&text)?;
                        self.runtime.json_value(&value)?
                    }
                    ResolvedImport::Asset(_) => mlua::Value::Table(self.runtime.asset_module()?),
                    ResolvedImport::Builtin(name) => self.runtime.builtin(&name)?,
                };
                resolutions.raw_set(specifier.as_str(), value)?;
            }

            let env = self.runtime.module_env(resolutions)?;
            let exports = self.runtime.evaluate(&output.code, &path, env)?;
            let module = Arc::new(LoadedModule::new(path.clone(), exports, fingerprint, dependencies));
            self.modules.insert(&path, Arc::clone(&module))?;

            Ok(module)
        })
    }

    /// Returns transformed code for `path`, compiling at most once per fingerprint.
    async fn compile(&self, path: &Path, fingerprint: Fingerprint) -> Result<TransformOutput> {
        let lock = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| FolioError::Cache("Failed to acquire in-flight lock".to_string()))?;
            Arc::clone(in_flight.entry(path.to_path_buf()).or_default())
        };
        let _guard = lock.lock().await;

        if let Some(compiled) = self.compiled.get(path)? {
            if compiled.fingerprint == fingerprint {
                return compiled.output.clone().map_err(|failure| failure.to_error(path));
            }
        }

        let result = self.transform(path).await;

        let outcome = match &result {
            Ok(output) => Some(Ok(output.clone())),
            Err(e) => CompileFailure::from_error(e).map(Err),
        };
        if let Some(output) = outcome {
            self.compiled.insert(path, Arc::new(Compiled { fingerprint, output }))?;
        }
        if let Ok(mut in_flight) = self.in_flight.lock() {
            if in_flight.get(path).is_some_and(|entry| Arc::ptr_eq(entry, &lock)) {
                in_flight.remove(path);
            }
        }

        result
    }

    async fn transform(&self, path: &Path) -> Result<TransformOutput> {
        let source = read_source(path).await?;

        let key = self
            .transforms
            .as_ref()
            .map(|_| TransformCache::key(path, &source));
        if let (Some(cache), Some(key)) = (&self.transforms, &key) {
            if let Some(output) = cache.get(key) {
                debug!(path = %path.display(), "transform cache hit");
                return Ok(output);
            }
        }

        let output = self
            .transpiler
            .transform(TransformRequest::new(&source, path))
            .await?;

        if let (Some(cache), Some(key)) = (&self.transforms, &key) {
            if let Err(e) = cache.set(key, &output) {
                warn!(path = %path.display(), "Failed to persist transform: {}", e);
            }
        }

        Ok(output)
    }
}

async fn read_source(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(source) => Ok(source),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FolioError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn record(dependencies: &mut Vec<(PathBuf, Fingerprint)>, path: PathBuf, fingerprint: Fingerprint) {
    if !dependencies.iter().any(|(p, _)| *p == path) {
        dependencies.push((path, fingerprint));
    }
}

async fn dependencies_fresh(module: &LoadedModule) -> bool {
    for (path, recorded) in module.dependencies() {
        match Fingerprint::of(path).await {
            Ok(current) if current == *recorded => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::LuaTranspiler;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Default)]
    struct CountingTranspiler {
        inner: LuaTranspiler,
        calls: AtomicUsize,
    }

    impl CountingTranspiler {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transpiler for CountingTranspiler {
        fn transform<'a>(&'a self, request: TransformRequest<'a>) -> BoxFuture<'a, Result<TransformOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.inner.transform(request).await
            })
        }
    }

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn loader(dir: &TempDir, config: LoaderConfig) -> (ModuleLoader, Arc<CountingTranspiler>) {
        let transpiler = Arc::new(CountingTranspiler::default());
        let loader = ModuleLoader::new(dir.path(), transpiler.clone(), config).unwrap();
        (loader, transpiler)
    }

    fn bump_mtime(path: &Path) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
    }

    #[tokio::test]
    async fn test_second_load_does_not_recompile() {
        let dir = project(&[("app/page.lua", "return { default = function() return 'hi' end }")]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let page = dir.path().join("app/page.lua");

        let first = loader.load(&page).await.unwrap();
        let second = loader.load(&page).await.unwrap();

        assert_eq!(transpiler.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.is_cached(&page));
    }

    #[tokio::test]
    async fn test_touching_file_invalidates() {
        let dir = project(&[("app/page.lua", "return { default = function() return 'hi' end }")]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let page = dir.path().join("app/page.lua");

        loader.load(&page).await.unwrap();
        bump_mtime(&page);
        loader.load(&page).await.unwrap();

        assert_eq!(transpiler.calls(), 2);
    }

    #[tokio::test]
    async fn test_dependency_change_reevaluates_importer() {
        let dir = project(&[
            ("app/page.lua", "local c = require('./card'); return { default = function() return c.label end }"),
            ("app/card.lua", "return { label = 'one' }"),
        ]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let page = dir.path().join("app/page.lua");
        let card = dir.path().join("app/card.lua");

        let module = loader.load(&page).await.unwrap();
        assert_eq!(module.require_default().unwrap().call::<String>(()).unwrap(), "one");
        assert_eq!(transpiler.calls(), 2);

        fs::write(&card, "return { label = 'two!' }").unwrap();
        bump_mtime(&card);

        let module = loader.load(&page).await.unwrap();
        assert_eq!(module.require_default().unwrap().call::<String>(()).unwrap(), "two!");
        // page output is reused, only the card recompiles
        assert_eq!(transpiler.calls(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_compilation() {
        let dir = project(&[("app/page.lua", "return { default = function() return 'hi' end }")]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let loader = Arc::new(loader);
        let page = dir.path().join("app/page.lua");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let page = page.clone();
                tokio::spawn(async move { loader.load(&page).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(transpiler.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_compile_failure() {
        let dir = project(&[("app/page.lua", "return { default = function( }")]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let loader = Arc::new(loader);
        let page = dir.path().join("app/page.lua");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let page = page.clone();
                tokio::spawn(async move { loader.load(&page).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, FolioError::Compile { .. }), "{:?}", err);
        }
        assert_eq!(transpiler.calls(), 1);
        assert!(loader.in_flight.lock().unwrap().is_empty());

        // Fixing the file compiles again.
        fs::write(&page, "return { default = function() return 'ok' end }").unwrap();
        bump_mtime(&page);
        loader.load(&page).await.unwrap();
        assert_eq!(transpiler.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompile() {
        let dir = project(&[("app/page.lua", "return { default = function() return 'hi' end }")]);
        let (loader, transpiler) = loader(&dir, LoaderConfig::default());
        let page = dir.path().join("app/page.lua");

        loader.load(&page).await.unwrap();
        loader.invalidate(Some(&page));
        assert!(!loader.is_cached(&page));
        loader.load(&page).await.unwrap();
        loader.invalidate(None);
        loader.load(&page).await.unwrap();

        assert_eq!(transpiler.calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = project(&[]);
        let (loader, _) = loader(&dir, LoaderConfig::default());
        let err = loader.load(&dir.path().join("app/nope.lua")).await.unwrap_err();
        assert!(matches!(err, FolioError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_compile_error_names_file() {
        let dir = project(&[("app/page.lua", "return {")]);
        let (loader, _) = loader(&dir, LoaderConfig::default());
        let err = loader.load(&dir.path().join("app/page.lua")).await.unwrap_err();
        match err {
            FolioError::Compile { file, .. } => assert!(file.ends_with("app/page.lua")),
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_cycle_detected() {
        let dir = project(&[
            ("lib/a.lua", "local b = require('./b'); return {}"),
            ("lib/b.lua", "local a = require('./a'); return {}"),
        ]);
        let (loader, _) = loader(&dir, LoaderConfig::default());
        let err = loader.load(&dir.path().join("lib/a.lua")).await.unwrap_err();
        match err {
            FolioError::ImportCycle(chain) => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assets_json_and_alias_imports() {
        let dir = project(&[
            (
                "app/page.lua",
                r#"
local styles = require("./page.css")
local data = require("@/data/site.json")
local fmt = require("@/lib/format")
local json = require("json")
return {
  default = function()
    return styles.default .. fmt.upper(data.name) .. json.encode({ n = #data.tags })
  end,
}
"#,
            ),
            ("data/site.json", r#"{"name": "folio", "tags": ["a", "b"]}"#),
            ("lib/format/index.lua", "return { upper = string.upper }"),
        ]);
        let (loader, _) = loader(&dir, LoaderConfig::default());
        let module = loader.load(&dir.path().join("app/page.lua")).await.unwrap();
        let html: String = module.require_default().unwrap().call(()).unwrap();
        assert_eq!(html, r#"FOLIO{"n":2}"#);
        assert_eq!(module.dependencies().len(), 2);
    }

    #[tokio::test]
    async fn test_unresolved_import() {
        let dir = project(&[("app/page.lua", "local x = require('./missing'); return {}")]);
        let (loader, _) = loader(&dir, LoaderConfig::default());
        let err = loader.load(&dir.path().join("app/page.lua")).await.unwrap_err();
        assert!(matches!(err, FolioError::UnresolvedImport { .. }));
    }

    #[tokio::test]
    async fn test_persistent_cache_survives_new_loader() {
        let dir = project(&[("app/page.lua", "return { default = function() return 'hi' end }")]);
        let config = LoaderConfig {
            transform_cache_dir: Some(dir.path().join(".folio/cache")),
            ..LoaderConfig::default()
        };
        let page = dir.path().join("app/page.lua");

        let (first, first_calls) = loader(&dir, config.clone());
        first.load(&page).await.unwrap();
        assert_eq!(first_calls.calls(), 1);

        let (second, second_calls) = loader(&dir, config);
        let module = second.load(&page).await.unwrap();
        assert_eq!(second_calls.calls(), 0);
        assert_eq!(module.require_default().unwrap().call::<String>(()).unwrap(), "hi");
    }
}
