//! Request parameter merging and the `where`/`order` mini-DSLs
//!
//! Path template variables and query-string values are merged into one
//! `Params` bag before an action handles the request. Comma-separated
//! query values parse into field→value maps so that `?where=owner,1`
//! becomes `where: {owner: "1"}`.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A single merged request parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A scalar value, e.g. a path segment or `?page=2`
    Single(String),

    /// A parsed comma mini-DSL value, e.g. `?where=owner,1,complete,true`
    Pairs(IndexMap<String, String>),
}

/// Merged URL and query parameters for one request.
///
/// `depth` tracks relationship-traversal depth when filters re-enter
/// sibling actions (joins extension, recursive decoration); it is never
/// populated from the request itself.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: IndexMap<String, ParamValue>,
    depth: usize,
}

/// Relationship graphs may be cyclic (self-referential tables), so
/// recursive filter chains stop extending joins or decorating embeds
/// beyond this depth.
pub const MAX_RELATION_DEPTH: usize = 8;

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge path parameters with parsed query-string pairs. Query
    /// values containing commas are split into key/value pairs.
    pub fn merge<P, Q>(path: P, query: Q) -> Self
    where
        P: IntoIterator<Item = (String, String)>,
        Q: IntoIterator<Item = (String, String)>,
    {
        let mut params = Params::new();

        for (key, value) in path {
            params.values.insert(key, ParamValue::Single(value));
        }

        for (key, value) in query {
            params.values.insert(key, parse_query_value(&value));
        }

        params
    }

    /// Scalar parameter lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            ParamValue::Single(value) => Some(value.as_str()),
            ParamValue::Pairs(_) => None,
        }
    }

    /// Mini-DSL map lookup (`where`, `order`).
    pub fn pairs(&self, key: &str) -> Option<&IndexMap<String, String>> {
        match self.values.get(key)? {
            ParamValue::Pairs(pairs) => Some(pairs),
            ParamValue::Single(_) => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), ParamValue::Single(value.into()));
    }

    pub fn insert_pairs(&mut self, key: impl Into<String>, pairs: IndexMap<String, String>) {
        self.values.insert(key.into(), ParamValue::Pairs(pairs));
    }

    /// The page number, defaulting to 1 on absent or malformed input.
    pub fn page(&self) -> u64 {
        self.get("page")
            .and_then(|value| value.parse().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1)
    }

    /// Current traversal depth for recursive filter chains.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// A copy of these params one relationship level deeper.
    pub fn descend(&self) -> Self {
        let mut next = self.clone();
        next.depth += 1;
        next
    }

    /// Render as a JSON map, suitable for URI template expansion of a
    /// document's self link.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, value)| {
                let json = match value {
                    ParamValue::Single(s) => Value::String(s.clone()),
                    ParamValue::Pairs(pairs) => Value::Object(
                        pairs
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                            .collect(),
                    ),
                };
                (key.clone(), json)
            })
            .collect()
    }
}

fn parse_query_value(value: &str) -> ParamValue {
    if !value.contains(',') {
        return ParamValue::Single(value.to_string());
    }

    let parts: Vec<&str> = value.split(',').collect();
    let pairs = parts
        .chunks(2)
        .map(|chunk| {
            let key = chunk[0].to_string();
            let value = chunk.get(1).copied().unwrap_or_default().to_string();
            (key, value)
        })
        .collect();

    ParamValue::Pairs(pairs)
}
