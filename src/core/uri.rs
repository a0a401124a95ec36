//! URI template expansion for link and form hrefs
//!
//! Supports the subset of templating the framework emits: simple
//! `{var}` placeholders and query-style `{?a,b,c}` groups. `where` and
//! `order` values that are maps re-serialize to the comma mini-DSL that
//! `Params` parses on the way in (`?where=owner,1`).

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static QUERY_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\?([^}]*)\}").expect("static pattern"));

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("static pattern"));

/// Whether `href` contains template placeholders that require expansion.
pub fn is_templated(href: &str) -> bool {
    href.contains('{')
}

/// Strip `{?...}` query groups from a path so it can be used as a route
/// pattern (query parameters are not part of the matchable path).
pub fn dequery(path: &str) -> String {
    QUERY_GROUP.replace_all(path, "").into_owned()
}

/// Expand a URI template using `params`. Placeholders with no matching
/// parameter expand to the empty string; query groups only emit the
/// parameters that are present.
pub fn expand(template: &str, params: &Map<String, Value>) -> String {
    let expanded = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
        params
            .get(&caps[1])
            .map(scalar_to_string)
            .unwrap_or_default()
    });

    QUERY_GROUP
        .replace_all(&expanded, |caps: &regex::Captures| {
            let pairs: Vec<String> = caps[1]
                .split(',')
                .filter_map(|name| {
                    let name = name.trim();
                    params
                        .get(name)
                        .filter(|value| !value.is_null())
                        .map(|value| format!("{}={}", name, query_value(value)))
                })
                .collect();

            if pairs.is_empty() {
                String::new()
            } else {
                format!("?{}", pairs.join("&"))
            }
        })
        .into_owned()
}

/// Render a scalar parameter value without JSON quoting.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render a query parameter value. Objects become the comma mini-DSL
/// (`owner,1`); scalars render plainly.
fn query_value(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .flat_map(|(k, v)| [k.clone(), scalar_to_string(v)])
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_to_string(other),
    }
}
