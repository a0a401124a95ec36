//! Schema model and payload validation
//!
//! Models the JSON-Schema subset the framework composes and serves in
//! forms: `properties`, `required`, `default`, plus `oneOf` alternatives
//! injected by schema-widening filters. Heavier JSON-Schema features are
//! out of scope; the validator here enforces exactly what the built-in
//! actions rely on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::{Error, ValidationFailure};

/// A JSON-Schema-like description of a resource's fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Schema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(rename = "type", default = "object_type")]
    pub kind: String,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Pre-filled values advertised by forms (e.g. a parent's key on a
    /// child create form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Schema {
    /// An object schema with the given title and property map.
    pub fn object(title: impl Into<String>, properties: Map<String, Value>) -> Self {
        Schema {
            meta: Some("http://json-schema.org/draft-04/schema#".to_string()),
            title: Some(title.into()),
            kind: object_type(),
            properties,
            required: Vec::new(),
            default: None,
        }
    }

    pub fn with_required<I, S>(mut self, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = required.into_iter().map(Into::into).collect();
        self
    }

    /// A copy of this schema with the `required` list cleared, used by
    /// partial-update actions.
    pub fn without_required(&self) -> Self {
        let mut schema = self.clone();
        schema.required.clear();
        schema
    }

    /// A copy of this schema with extra entries merged into `default`.
    pub fn with_defaults(&self, values: Map<String, Value>) -> Self {
        let mut schema = self.clone();
        let mut defaults = match schema.default.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        defaults.extend(values);
        schema.default = Some(Value::Object(defaults));
        schema
    }

    /// Widen `field` to accept either its current shape or `alternative`
    /// via `oneOf`. No-op if the property is already widened.
    pub fn widen_property(&mut self, field: &str, alternative: &Schema) {
        let Some(prop) = self.properties.get(field) else {
            return;
        };

        if prop.get("oneOf").is_some() {
            return;
        }

        let alternative = match serde_json::to_value(alternative) {
            Ok(value) => value,
            Err(_) => return,
        };

        let widened = serde_json::json!({ "oneOf": [prop, alternative] });
        self.properties.insert(field.to_string(), widened);
    }
}

/// Validate `data` against `schema`, producing one failure entry per
/// violation. Required fields are checked first, then per-property
/// types and `oneOf` alternatives (nested objects validate recursively
/// against the alternative's own `properties`/`required`).
pub fn validate(data: &Value, schema: &Schema) -> Result<(), Error> {
    let mut failures = Vec::new();

    let Some(object) = data.as_object() else {
        failures.push(ValidationFailure::wrong_type("", "object"));
        return Err(Error::Validation(failures));
    };

    for name in &schema.required {
        if !object.contains_key(name) {
            failures.push(ValidationFailure::missing_property(name));
        }
    }

    for (name, value) in object {
        if let Some(prop) = schema.properties.get(name) {
            check_property(&format!("/{}", name), value, prop, &mut failures);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(failures))
    }
}

fn check_property(path: &str, value: &Value, prop: &Value, failures: &mut Vec<ValidationFailure>) {
    if value.is_null() {
        return;
    }

    if let Some(alternatives) = prop.get("oneOf").and_then(Value::as_array) {
        let matches_any = alternatives.iter().any(|alternative| {
            let mut scratch = Vec::new();
            check_property(path, value, alternative, &mut scratch);
            scratch.is_empty()
        });

        if !matches_any {
            failures.push(ValidationFailure::wrong_type(path, "one of the allowed schemas"));
        }

        return;
    }

    match prop.get("type").and_then(Value::as_str) {
        Some("integer") => {
            if !value.is_i64() && !value.is_u64() {
                failures.push(ValidationFailure::wrong_type(path, "integer"));
            }
        }
        Some("number") => {
            if !value.is_number() {
                failures.push(ValidationFailure::wrong_type(path, "number"));
            }
        }
        Some("string") => {
            if !value.is_string() {
                failures.push(ValidationFailure::wrong_type(path, "string"));
            }
        }
        Some("boolean") => {
            if !value.is_boolean() {
                failures.push(ValidationFailure::wrong_type(path, "boolean"));
            }
        }
        Some("object") => match value.as_object() {
            Some(object) => {
                // Nested schemas carry their own required list, e.g. a
                // widened foreign key accepting a full parent object.
                if let Some(required) = prop.get("required").and_then(Value::as_array) {
                    for name in required.iter().filter_map(Value::as_str) {
                        if !object.contains_key(name) {
                            failures.push(ValidationFailure::missing_property(name));
                        }
                    }
                }

                if let Some(nested) = prop.get("properties").and_then(Value::as_object) {
                    for (name, value) in object {
                        if let Some(nested_prop) = nested.get(name) {
                            check_property(
                                &format!("{}/{}", path, name),
                                value,
                                nested_prop,
                                failures,
                            );
                        }
                    }
                }
            }
            None => failures.push(ValidationFailure::wrong_type(path, "object")),
        },
        _ => {}
    }
}

/// Pick only schema-declared, non-`readOnly` fields out of `payload`.
pub fn pick_allowed_values(schema: &Schema, payload: &Value) -> Map<String, Value> {
    let Some(object) = payload.as_object() else {
        return Map::new();
    };

    object
        .iter()
        .filter(|(name, _)| {
            schema
                .properties
                .get(name.as_str())
                .is_some_and(|prop| prop.get("readOnly").and_then(Value::as_bool) != Some(true))
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
