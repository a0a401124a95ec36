//! Resource definitions: a named, schema-described relational entity
//! with declared parent/child relationships and a bound `Source`

use serde_json::json;
use std::sync::Arc;

use crate::core::schema::Schema;
use crate::core::source::Source;

/// Defines a relationship between two resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The name of the related resource
    pub name: String,

    /// The identifying field on the owning side. For `belongs_to` this
    /// is the foreign key in *this* resource; for `has` it is this
    /// resource's primary key.
    pub from: String,

    /// The identifying field on the related side. For `belongs_to` this
    /// is the parent's primary key; for `has` it is the child's foreign
    /// key back to this resource.
    pub to: String,
}

impl Relationship {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Relationship {
            name: name.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Edges pointing at parent resources
    pub belongs_to: Vec<Relationship>,

    /// Inverse edges pointing at child resources
    pub has: Vec<Relationship>,
}

/// A named relational entity. Constructed once at process start and
/// immutable after `initialize` fills in defaults.
#[derive(Clone)]
pub struct Resource {
    pub name: String,
    pub schema: Schema,
    pub primary_keys: Vec<String>,
    pub relationships: Relationships,
    pub source: Arc<dyn Source>,
}

impl Resource {
    pub fn new(name: impl Into<String>, schema: Schema, source: Arc<dyn Source>) -> Self {
        Resource {
            name: name.into(),
            schema,
            primary_keys: Vec::new(),
            relationships: Relationships::default(),
            source,
        }
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn belongs_to(mut self, relationship: Relationship) -> Self {
        self.relationships.belongs_to.push(relationship);
        self
    }

    pub fn has(mut self, relationship: Relationship) -> Self {
        self.relationships.has.push(relationship);
        self
    }

    /// Fill defaults: an empty primary-key list becomes `["id"]`, with a
    /// read-only integer `id` property injected into the schema when
    /// absent.
    pub fn initialize(mut self) -> Self {
        if self.primary_keys.is_empty() {
            self.primary_keys = vec!["id".to_string()];
        }

        for key in &self.primary_keys {
            if !self.schema.properties.contains_key(key) {
                self.schema
                    .properties
                    .insert(key.clone(), json!({"type": "integer", "readOnly": true}));
            }
        }

        self
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("primary_keys", &self.primary_keys)
            .field("belongs_to", &self.relationships.belongs_to)
            .field("has", &self.relationships.has)
            .finish_non_exhaustive()
    }
}
