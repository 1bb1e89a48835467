// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Pre-rendered pages held in memory by the production server.

use folio::route::normalize_pattern;
use folio::{page_output_path, Manifest};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pre-rendered HTML keyed by URL path.
#[derive(Debug, Clone, Default)]
pub struct PageCache {
    pages: HashMap<String, Arc<str>>,
}

impl PageCache {
    /// Reads every page the manifest lists as pre-rendered from `output_dir`.
    ///
    /// A listed page whose file is missing is skipped; the route then renders
    /// on demand.
    pub fn load(output_dir: &Path, manifest: &Manifest) -> Self {
        let mut pages = HashMap::new();
        for pattern in &manifest.static_pages {
            let file = page_output_path(output_dir, pattern);
            match std::fs::read_to_string(&file) {
                Ok(html) => {
                    debug!(pattern = %pattern, file = %file.display(), "cached pre-rendered page");
                    pages.insert(normalize_pattern(pattern), Arc::from(html));
                }
                Err(e) => warn!(pattern = %pattern, "Pre-rendered page unavailable: {}", e),
            }
        }
        Self { pages }
    }

    /// The cached page for a request path, ignoring a trailing slash.
    pub fn get(&self, path: &str) -> Option<Arc<str>> {
        self.pages.get(&normalize_pattern(path)).cloned()
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True when nothing was pre-rendered.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_and_lookup() {
        let dir = tempdir().unwrap();
        let out = dir.path();
        fs::create_dir_all(out.join("pages/about")).unwrap();
        fs::write(out.join("pages/index.html"), "<p>home</p>").unwrap();
        fs::write(out.join("pages/about/index.html"), "<p>about</p>").unwrap();

        let manifest = Manifest {
            version: folio::manifest::MANIFEST_VERSION,
            build_time: String::new(),
            routes: Vec::new(),
            static_pages: vec!["/".into(), "/about".into(), "/gone".into()],
            dynamic_routes: Vec::new(),
            api_routes: Vec::new(),
        };
        let cache = PageCache::load(out, &manifest);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("/").as_deref(), Some("<p>home</p>"));
        assert_eq!(cache.get("/about/").as_deref(), Some("<p>about</p>"));
        assert!(cache.get("/gone").is_none());
    }
}
