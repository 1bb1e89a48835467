// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Prints the route table the dev server would use.

use console::style;
use folio::{scan, RouteTable};
use std::fmt::Write;
use std::path::Path;

use crate::config::Config;

/// Scans the current project and prints its routes.
pub fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    let root = std::env::current_dir()?;
    let table = scan(&config.app_dir(&root), &config.scan_options())?;
    print!("{}", format_table(&table, &config.app_dir(&root)));
    Ok(())
}

/// Renders `table` as text, one route per line followed by its layout chain,
/// then any conflicts and skipped files.
pub fn format_table(table: &RouteTable, app_dir: &Path) -> String {
    let app_dir = std::fs::canonicalize(app_dir).unwrap_or_else(|_| app_dir.to_path_buf());
    let relative = |path: &Path| path.strip_prefix(&app_dir).unwrap_or(path).display().to_string();
    let mut out = String::new();

    if table.is_empty() {
        let _ = writeln!(out, "{}", style("No routes found").yellow());
        return out;
    }

    for route in &table.routes {
        let _ = write!(
            out,
            "{:<8} {:<32} {}",
            style(route.route_type.as_str()).cyan(),
            route.url_pattern,
            style(route.source_file_path.display()).dim()
        );
        if !route.dynamic_param_names.is_empty() {
            let _ = write!(out, "  params: {}", route.dynamic_param_names.join(", "));
        }
        let _ = writeln!(out);
        if !route.applicable_layouts.is_empty() {
            let chain: Vec<String> = route.applicable_layouts.iter().map(|l| relative(l.as_path())).collect();
            let _ = writeln!(out, "         {} {}", style("layouts:").dim(), chain.join(" > "));
        }
    }

    for conflict in &table.conflicts {
        let _ = writeln!(out, "{} {}", style("conflict:").yellow(), conflict);
    }
    for warning in &table.warnings {
        let _ = writeln!(out, "{} {}", style("skipped:").yellow(), warning);
    }
    out
}
