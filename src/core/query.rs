//! Query shapes produced by actions and consumed by a `Source`

use serde_json::{Map, Value};

use crate::core::schema::Schema;

/// A single `field = value` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub value: Value,
}

/// A declarative instruction to fetch or create related-resource data
/// alongside a primary query.
///
/// `path` aliases nested data: read joins use relation-name chains
/// (`["tasks", "users", "departments"]`), create/update joins use
/// foreign-key field chains (`["owner", "department"]`).
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// The related source name
    pub source: String,

    /// Nesting path for aliasing joined data
    pub path: Vec<String>,

    /// Identifying field on the owning side (the foreign key)
    pub from: String,

    /// Identifying field on the related side (the primary key)
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    /// Parse an `order` mini-DSL direction; anything other than "desc"
    /// sorts ascending.
    pub fn new(field: impl Into<String>, direction: &str) -> Self {
        Order {
            field: field.into(),
            direction: if direction.eq_ignore_ascii_case("desc") {
                Direction::Desc
            } else {
                Direction::Asc
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

/// Whether a read query targets a single item or a paged collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Item,
    Collection,
}

#[derive(Debug, Clone)]
pub struct Create {
    pub source: String,
    pub returning: Vec<String>,
    pub schema: Schema,
    pub joins: Vec<Join>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Read {
    pub source: String,
    pub kind: ReturnKind,
    pub schema: Schema,
    pub conditions: Vec<Condition>,
    pub joins: Vec<Join>,
    pub order: Vec<Order>,
    pub page: Option<Page>,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub source: String,
    pub returning: Vec<String>,
    pub schema: Schema,
    pub conditions: Vec<Condition>,
    pub joins: Vec<Join>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Delete {
    pub source: String,
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_direction_parsing() {
        assert_eq!(Order::new("id", "asc").direction, Direction::Asc);
        assert_eq!(Order::new("id", "DESC").direction, Direction::Desc);
        assert_eq!(Order::new("id", "sideways").direction, Direction::Asc);
    }
}
