// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Layout chain resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Pattern prefixes of `pattern`, shortest first, starting with the root.
///
/// `/users/:id` yields `/`, `/users`, `/users/:id`.
fn prefixes(pattern: &str) -> Vec<String> {
    let mut result = vec!["/".to_string()];
    let mut current = String::new();
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        result.push(current.clone());
    }
    result
}

/// Returns the layouts wrapping a page, root first.
///
/// The chain is applied innermost-first when rendering: the last entry wraps
/// the page and the first entry is the outermost wrapper.
pub fn resolve_layouts(pattern: &str, layouts: &BTreeMap<String, PathBuf>) -> Vec<PathBuf> {
    prefixes(pattern)
        .iter()
        .filter_map(|prefix| layouts.get(prefix).cloned())
        .collect()
}

/// Returns the deepest error boundary whose prefix covers `pattern`.
pub fn resolve_error_boundary<'a>(
    pattern: &str,
    boundaries: &'a BTreeMap<String, PathBuf>,
) -> Option<&'a Path> {
    prefixes(pattern)
        .iter()
        .rev()
        .find_map(|prefix| boundaries.get(prefix).map(PathBuf::as_path))
}
