// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Build command: pre-renders static pages and writes the route manifest.
//!
//! Output layout:
//!
//! ```text
//! .folio/
//!   routes-manifest.json
//!   build-info.json
//!   pages/<path>/index.html
//!   static/            copy of public/
//! ```

use console::style;
use folio::manifest::{BUILD_INFO_FILE, MANIFEST_FILE};
use folio::{
    page_output_path, render_page, scan, BuildInfo, LuaTranspiler, Manifest, ModuleLoader,
    RenderOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;

/// What a build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Output directory.
    pub output_dir: PathBuf,
    /// Routes in the manifest.
    pub routes: usize,
    /// Patterns written as static HTML.
    pub prerendered: BTreeSet<String>,
    /// Patterns that failed to pre-render, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Files copied from the public directory.
    pub static_files: usize,
    /// Wall time.
    pub duration: Duration,
}

/// Runs the build command in the current directory.
pub async fn run(output: Option<String>, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?.with_output_dir(output);
    let root = std::env::current_dir()?;
    let output_dir = config.output_dir(&root);

    if !quiet {
        println!(
            "{} {}",
            style("Building routes from:").cyan(),
            config.app.dir
        );
    }

    let summary = build_project(&root, &config, &output_dir, quiet).await?;

    if !quiet {
        for (pattern, reason) in &summary.skipped {
            println!(
                "  {} {} {}",
                style("!").yellow(),
                style(pattern).yellow(),
                style(format!("will render at runtime ({})", reason)).dim()
            );
        }
        println!();
        println!(
            "{} {} route(s), {} pre-rendered page(s), {} static file(s) in {}",
            style("Build complete!").green().bold(),
            summary.routes,
            summary.prerendered.len(),
            summary.static_files,
            style(format!("{}ms", summary.duration.as_millis())).cyan()
        );
        println!(
            "{} {}",
            style("Output:").dim(),
            summary.output_dir.display()
        );
    }
    Ok(())
}

/// Builds the project at `root` into `output_dir`.
///
/// Pages without parameters are pre-rendered when `[build] prerender` is on.
/// A page that fails to render is skipped and served on demand instead.
pub async fn build_project(
    root: &Path,
    config: &Config,
    output_dir: &Path,
    quiet: bool,
) -> anyhow::Result<BuildSummary> {
    let start = Instant::now();
    let root = fs::canonicalize(root)?;

    let table = scan(&config.app_dir(&root), &config.scan_options())?;
    for conflict in &table.conflicts {
        if !quiet {
            println!("  {} {}", style("!").yellow(), conflict);
        }
    }

    fs::create_dir_all(output_dir)?;
    let pages_dir = output_dir.join("pages");
    if pages_dir.exists() {
        fs::remove_dir_all(&pages_dir)?;
    }

    let mut prerendered = BTreeSet::new();
    let mut skipped = Vec::new();

    if config.build.prerender {
        let loader = ModuleLoader::new(
            &root,
            Arc::new(LuaTranspiler::new()),
            config.loader_config(&root),
        )?;
        let candidates: Vec<_> = table
            .pages()
            .filter(|route| route.dynamic_param_names.is_empty())
            .collect();

        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(candidates.len() as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} Rendering [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("━━╺"),
        );

        for route in candidates {
            pb.set_message(route.url_pattern.clone());
            match render_page(&loader, route, &BTreeMap::new(), &RenderOptions::default()).await {
                Ok(html) => {
                    let file = page_output_path(output_dir, &route.url_pattern);
                    if let Some(parent) = file.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&file, html)?;
                    prerendered.insert(route.url_pattern.clone());
                }
                Err(e) => {
                    warn!(pattern = %route.url_pattern, "Pre-render failed, will render at runtime: {}", e);
                    skipped.push((route.url_pattern.clone(), e.to_string()));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    let public_dir = config.public_dir(&root);
    let static_files = if public_dir.is_dir() {
        copy_dir_recursive(&public_dir, &output_dir.join("static"))?
    } else {
        0
    };

    let manifest = Manifest::from_table(&table, &root, &prerendered);
    manifest.write(&output_dir.join(MANIFEST_FILE))?;

    let duration = start.elapsed();
    let build_info = BuildInfo::new(duration, table.len(), prerendered.len());
    fs::write(
        output_dir.join(BUILD_INFO_FILE),
        serde_json::to_string_pretty(&build_info)?,
    )?;

    info!(
        routes = table.len(),
        prerendered = prerendered.len(),
        duration_ms = duration.as_millis() as u64,
        "build finished"
    );

    Ok(BuildSummary {
        output_dir: output_dir.to_path_buf(),
        routes: table.len(),
        prerendered,
        skipped,
        static_files,
        duration,
    })
}

/// Recursively copies a directory, returning the number of files copied.
fn copy_dir_recursive(src: &Path, dst: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            copied += 1;
        }
    }

    Ok(copied)
}
