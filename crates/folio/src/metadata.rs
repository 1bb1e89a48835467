// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Document metadata.
//!
//! Pages describe their `<head>` with a `metadata` table or a
//! `generateMetadata` function. Layouts may export `metadata` too; their
//! fields act as defaults under the page's, and a layout title of the form
//! `{ default = "...", template = "%s | Site" }` wraps plain page titles.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Resolved metadata for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Document title.
    pub title: Option<Title>,
    /// `<meta name="description">`.
    pub description: Option<String>,
    /// Open Graph tags.
    #[serde(alias = "open_graph")]
    pub open_graph: Option<OpenGraph>,
    /// Twitter card tags.
    pub twitter: Option<Twitter>,
    /// `<meta name="robots">`.
    pub robots: Option<Robots>,
    /// Icon links.
    pub icons: Option<Icons>,
    /// Canonical URL.
    pub canonical: Option<String>,
    /// `<html lang>`, `en` when absent.
    pub lang: Option<String>,
    /// `<meta charset>`, `utf-8` when absent.
    pub charset: Option<String>,
    /// `<meta name="viewport">`.
    pub viewport: Option<String>,
}

/// A title is either a plain string or a default plus a template for descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Title {
    /// `title = "Home"`
    Plain(String),
    /// `title = { default = "Site", template = "%s | Site" }`
    Template {
        /// Title used when nothing more specific is set.
        #[serde(default)]
        default: String,
        /// Pattern applied to descendant titles; `%s` is the page title.
        template: Option<String>,
    },
}

impl Title {
    /// Text that goes into `<title>`.
    pub fn text(&self) -> &str {
        match self {
            Title::Plain(title) => title,
            Title::Template { default, .. } => default,
        }
    }
}

/// Open Graph tags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "site_name")]
    pub site_name: Option<String>,
}

/// Twitter card tags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Twitter {
    pub card: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub creator: Option<String>,
}

/// Icon links.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Icons {
    pub icon: Option<String>,
    pub apple: Option<String>,
    pub shortcut: Option<String>,
}

/// Robots directive, written out verbatim or assembled from flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Robots {
    /// `robots = "noindex, nofollow"`
    Directive(String),
    /// `robots = { index = false, follow = true }`
    Flags(RobotsFlags),
}

/// Flag form of [`Robots`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotsFlags {
    /// `index` / `noindex`.
    pub index: Option<bool>,
    /// `follow` / `nofollow`.
    pub follow: Option<bool>,
    /// Any other directive, e.g. `nocache = true` or `max-snippet = 50`.
    #[serde(flatten)]
    pub other: BTreeMap<String, JsonValue>,
}

impl Robots {
    /// Value of the `content` attribute.
    pub fn content(&self) -> String {
        match self {
            Robots::Directive(directive) => directive.clone(),
            Robots::Flags(flags) => {
                let mut parts = Vec::new();
                if let Some(index) = flags.index {
                    parts.push(flag("index", index));
                }
                if let Some(follow) = flags.follow {
                    parts.push(flag("follow", follow));
                }
                for (name, value) in &flags.other {
                    match value {
                        JsonValue::Bool(on) => parts.push(flag(name, *on)),
                        JsonValue::String(s) => parts.push(format!("{}:{}", name, s)),
                        JsonValue::Number(n) => parts.push(format!("{}:{}", name, n)),
                        _ => {}
                    }
                }
                parts.join(", ")
            }
        }
    }
}

fn flag(name: &str, on: bool) -> String {
    if on {
        name.to_string()
    } else {
        format!("no{}", name)
    }
}

/// Merges layout metadata (root first) under the page's metadata.
///
/// Fields merge shallowly: the page replaces a layout's `openGraph` table
/// wholesale rather than field by field. A plain page title is wrapped by the
/// nearest layout title template.
pub fn merge_metadata(layouts: &[JsonValue], page: &JsonValue) -> serde_json::Result<Metadata> {
    let mut merged = serde_json::Map::new();
    let mut template = None;

    for layout in layouts {
        if let JsonValue::Object(fields) = layout {
            if let Some(t) = fields
                .get("title")
                .and_then(|title| title.get("template"))
                .and_then(JsonValue::as_str)
            {
                template = Some(t.to_string());
            }
            merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    let page_title = page.get("title").and_then(JsonValue::as_str);
    if let JsonValue::Object(fields) = page {
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let mut metadata: Metadata = serde_json::from_value(JsonValue::Object(merged))?;
    if let (Some(title), Some(template)) = (page_title, template) {
        metadata.title = Some(Title::Plain(template.replace("%s", title)));
    }
    Ok(metadata)
}
