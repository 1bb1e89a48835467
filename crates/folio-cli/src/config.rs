// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! folio project configuration.
//!
//! Configuration is loaded from `folio.toml` at the project root.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "my-site"
//! version = "1.0.0"
//!
//! [app]
//! dir = "app"
//! base_path = "/docs"
//!
//! [dev]
//! port = 3000
//! hmr_port = 3001
//! streaming = true
//!
//! [build]
//! output_dir = ".folio"
//!
//! [cache]
//! capacity = 500
//! ttl_secs = 300
//! ```

use folio::{CacheConfig, LoaderConfig, ScanOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file name.
pub const CONFIG_FILE: &str = "folio.toml";

/// Main configuration structure loaded from `folio.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Project metadata (name, version).
    #[serde(default)]
    pub project: ProjectConfig,
    /// Route source settings.
    #[serde(default)]
    pub app: AppConfig,
    /// Development server settings.
    #[serde(default)]
    pub dev: DevConfig,
    /// Production build settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Module cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Project metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Project version (default: "0.1.0").
    #[serde(default = "default_version")]
    pub version: String,
}

/// Where routes live and how they are discovered.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory containing route files (default: "app").
    #[serde(default = "default_app_dir")]
    pub dir: String,
    /// Prefix for every route pattern (default: none).
    #[serde(default)]
    pub base_path: String,
    /// Source extensions, without the dot (default: `["lua"]`).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory of files served as-is (default: "public").
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
    /// Globs, relative to the app directory, for paths to skip.
    #[serde(default = "folio::scanner::default_ignore")]
    pub ignore: Vec<String>,
}

/// Development server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DevConfig {
    /// Server port (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,
    /// Port of the standalone HMR websocket (default: port + 1).
    #[serde(default)]
    pub hmr_port: Option<u16>,
    /// Stream page responses (default: false).
    #[serde(default)]
    pub streaming: bool,
    /// Deadline for a streamed body, in milliseconds (default: 10000).
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,
}

/// Production build configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Output directory for built files (default: ".folio").
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Pre-render pages without params (default: true).
    #[serde(default = "default_true")]
    pub prerender: bool,
}

/// Module cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Maximum cached modules; unbounded when absent.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Seconds a cached module stays valid; forever when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// Keep transpiler output on disk between runs (default: true).
    #[serde(default = "default_true")]
    pub persistent: bool,
    /// Directory of the persistent cache (default: ".folio/cache").
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_app_dir() -> String {
    "app".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["lua".to_string()]
}

fn default_public_dir() -> String {
    "public".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_render_timeout_ms() -> u64 {
    10_000
}

fn default_output_dir() -> String {
    ".folio".to_string()
}

fn default_cache_dir() -> String {
    ".folio/cache".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dir: default_app_dir(),
            base_path: String::new(),
            extensions: default_extensions(),
            public_dir: default_public_dir(),
            ignore: folio::scanner::default_ignore(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            hmr_port: None,
            streaming: false,
            render_timeout_ms: default_render_timeout_ms(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            prerender: true,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: None,
            ttl_secs: None,
            persistent: true,
            dir: default_cache_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from `folio.toml` in the current directory.
    ///
    /// If no configuration file exists, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Loads `folio.toml` from `root`, falling back to defaults.
    pub fn load_from(root: &Path) -> anyhow::Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Scanner options for the app directory.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            extensions: self.app.extensions.clone(),
            base_path: self.app.base_path.clone(),
            ignore: self.app.ignore.clone(),
        }
    }

    /// Loader options rooted at `root`.
    pub fn loader_config(&self, root: &Path) -> LoaderConfig {
        LoaderConfig {
            extensions: self.app.extensions.clone(),
            cache: CacheConfig {
                capacity: self.cache.capacity,
                ttl: self.cache.ttl_secs.map(Duration::from_secs),
            },
            transform_cache_dir: self.cache.persistent.then(|| root.join(&self.cache.dir)),
        }
    }

    /// The HMR websocket port.
    pub fn hmr_port(&self, port: u16) -> u16 {
        self.dev.hmr_port.unwrap_or_else(|| port.saturating_add(1))
    }

    /// Deadline for streamed bodies.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.dev.render_timeout_ms)
    }

    /// App directory under `root`.
    pub fn app_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.app.dir)
    }

    /// Public directory under `root`.
    pub fn public_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.app.public_dir)
    }

    /// Build output directory under `root`.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.build.output_dir)
    }

    /// Applies an `--output` override to `[build] output_dir`.
    pub fn with_output_dir(mut self, output: Option<String>) -> Self {
        if let Some(output) = output {
            self.build.output_dir = output;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.project.name, "unnamed");
        assert_eq!(config.app.dir, "app");
        assert_eq!(config.app.extensions, vec!["lua"]);
        assert_eq!(config.dev.port, 3000);
        assert_eq!(config.hmr_port(3000), 3001);
        assert_eq!(config.build.output_dir, ".folio");
        assert!(config.build.prerender);
        assert!(config.cache.persistent);
        assert_eq!(config.cache.capacity, None);
    }

    #[test]
    fn test_output_override() {
        let root = Path::new("/srv/site");
        let config = Config::default().with_output_dir(Some("dist".to_string()));
        assert_eq!(config.output_dir(root), root.join("dist"));
        let config = Config::default().with_output_dir(None);
        assert_eq!(config.output_dir(root), root.join(".folio"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[app]
base_path = "/docs"

[dev]
hmr_port = 4000
streaming = true

[cache]
capacity = 10
ttl_secs = 30
persistent = false
"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.app.base_path, "/docs");
        assert_eq!(config.app.dir, "app");
        assert_eq!(config.hmr_port(3000), 4000);
        assert!(config.dev.streaming);
        assert_eq!(config.render_timeout(), Duration::from_secs(10));

        let loader = config.loader_config(dir.path());
        assert_eq!(loader.cache.capacity, Some(10));
        assert_eq!(loader.cache.ttl, Some(Duration::from_secs(30)));
        assert!(loader.transform_cache_dir.is_none());
        assert_eq!(config.scan_options().base_path, "/docs");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[dev]\nport = \"x\"").unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }
}
