// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Request path matching.
//!
//! Candidates are tried in the table's stable order and the first match wins,
//! so the ordering established by the scanner (static before dynamic before
//! catch-all) is what gives static routes priority.

use std::collections::BTreeMap;

use crate::route::{Route, Segment};

/// Result of matching a path. `route` is `None` when nothing matched.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    /// The matched route.
    pub route: Option<&'a Route>,
    /// Parameters extracted from the path.
    pub params: BTreeMap<String, String>,
}

impl<'a> RouteMatch<'a> {
    /// The no-match sentinel.
    pub fn none() -> Self {
        Self {
            route: None,
            params: BTreeMap::new(),
        }
    }

    /// Get a parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Finds the first page or API route matching `path`.
pub fn match_route<'a>(routes: &'a [Route], path: &str) -> RouteMatch<'a> {
    let url: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for route in routes.iter().filter(|r| r.is_matchable()) {
        if let Some(params) = match_segments(&route.segments, &url) {
            return RouteMatch {
                route: Some(route),
                params,
            };
        }
    }

    RouteMatch::none()
}

fn match_segments(pattern: &[Segment], url: &[&str]) -> Option<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    let mut index = 0;

    for segment in pattern {
        match segment {
            Segment::CatchAll { name, optional } => {
                let rest = &url[index.min(url.len())..];
                if rest.is_empty() && !optional {
                    return None;
                }
                params.insert(name.clone(), rest.join("/"));
                return Some(params);
            }
            Segment::Dynamic(name) => {
                let value = url.get(index)?;
                params.insert(name.clone(), value.to_string());
            }
            Segment::Static(literal) => {
                if url.get(index) != Some(&literal.as_str()) {
                    return None;
                }
            }
        }
        index += 1;
    }

    (index == url.len()).then_some(params)
}
