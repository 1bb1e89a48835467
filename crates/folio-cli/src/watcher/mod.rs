// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File system watching for hot reload.
//!
//! This module provides `FileWatcher` for monitoring file changes
//! and triggering rebuilds or live reloads.
//!
//! # Features
//!
//! - Debounced file change events (750ms)
//! - Filters for source and JSON files
//! - Directory creation, removal and renames (route structure changes)
//! - Recursive directory watching

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Quiet period before a burst of events is reported.
pub const DEBOUNCE: Duration = Duration::from_millis(750);

/// Watches directories and reports changed files in batches.
///
/// Dropping the watcher stops it.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watches `dirs` recursively. Each debounced batch of changed paths
    /// with one of `extensions` (or `json`) is sent on the returned channel,
    /// together with directories that were created, removed or renamed.
    ///
    /// Directories that do not exist are skipped.
    pub fn spawn(
        dirs: &[PathBuf],
        extensions: &[String],
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<Vec<PathBuf>>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let extensions = extensions.to_vec();

        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let changed = relevant_paths(
                        events
                            .iter()
                            .flat_map(|e| e.paths.iter().map(move |p| (&e.kind, p))),
                        &extensions,
                    );
                    if !changed.is_empty() {
                        debug!(count = changed.len(), "files changed");
                        let _ = tx.send(changed);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!("Watch error: {}", e);
                    }
                }
            }
        })?;

        for dir in dirs.iter().filter(|d| d.is_dir()) {
            debouncer.watch(dir, RecursiveMode::Recursive)?;
        }

        Ok((Self { _debouncer: debouncer }, rx))
    }
}

/// Creations, removals and renames change the route structure.
fn is_structural(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

fn is_relevant(kind: &EventKind, path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext == "json" || extensions.iter().any(|e| e == ext) => true,
        // A removed or renamed-away directory no longer exists to be checked.
        None => is_structural(kind),
        Some(_) => is_structural(kind) && path.is_dir(),
    }
}

/// Unique relevant paths, in sorted order.
fn relevant_paths<'a>(
    paths: impl Iterator<Item = (&'a EventKind, &'a PathBuf)>,
    extensions: &[String],
) -> Vec<PathBuf> {
    paths
        .filter(|(kind, p)| is_relevant(kind, p, extensions))
        .map(|(_, p)| p.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
