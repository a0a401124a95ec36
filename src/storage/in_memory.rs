//! In-memory `Source`: a map of named tables with auto-assigned
//! integer keys
//!
//! Suitable for demos and tests. It honors the full query contract:
//! read joins nest related rows along their alias path, create/update
//! joins either verify a scalar foreign key or recursively create an
//! embedded parent object and substitute its generated key, and errors
//! cross the boundary as the structured `SourceError` contract.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::query::{Condition, Create, Delete, Direction, Join, Order, Read, ReturnKind, Update};
use crate::core::source::{Collection, Item, ReadOutcome, Source, SourceError};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Item>,
    next_id: i64,
}

impl Table {
    fn assign_key(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A process-local store keyed by source name.
#[derive(Debug, Default)]
pub struct InMemorySource {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one row, bypassing query handling. Rows carrying an integer
    /// `id` advance the table's key counter past it.
    pub fn insert(&self, source: &str, row: Value) {
        let Value::Object(row) = row else {
            return;
        };

        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(source.to_string()).or_default();

        if let Some(id) = row.get("id").and_then(Value::as_i64) {
            table.next_id = table.next_id.max(id);
        }

        table.rows.push(row);
    }

    /// Number of rows currently stored for `source`.
    pub fn len(&self, source: &str) -> usize {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .map(|table| table.rows.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, source: &str) -> bool {
        self.len(source) == 0
    }

    /// Snapshot of the rows stored for `source`.
    pub fn rows(&self, source: &str) -> Vec<Item> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn create(&self, query: &Create) -> Result<Item, SourceError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| SourceError::Backend("table lock poisoned".to_string()))?;

        insert_row(
            &mut tables,
            &query.source,
            query.data.clone(),
            &query.joins,
            &query.returning,
        )
    }

    async fn read(&self, query: &Read) -> Result<ReadOutcome, SourceError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| SourceError::Backend("table lock poisoned".to_string()))?;

        let empty = Table::default();
        let table = tables.get(&query.source).unwrap_or(&empty);

        let mut matches: Vec<&Item> = table
            .rows
            .iter()
            .filter(|row| matches_conditions(row, &query.conditions))
            .collect();

        sort_rows(&mut matches, &query.order);

        match query.kind {
            ReturnKind::Item => {
                let item = matches
                    .first()
                    .map(|row| attach_joins(&tables, (*row).clone(), &query.joins));
                Ok(ReadOutcome::Item(item))
            }
            ReturnKind::Collection => {
                let count = matches.len() as u64;

                let page_rows: Vec<&Item> = match query.page {
                    Some(page) => {
                        let start = (page.number.saturating_sub(1) * page.size) as usize;
                        matches
                            .into_iter()
                            .skip(start)
                            .take(page.size as usize)
                            .collect()
                    }
                    None => matches,
                };

                let items = page_rows
                    .into_iter()
                    .map(|row| attach_joins(&tables, row.clone(), &query.joins))
                    .collect();

                Ok(ReadOutcome::Collection(Collection { items, count }))
            }
        }
    }

    async fn update(&self, query: &Update) -> Result<Item, SourceError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| SourceError::Backend("table lock poisoned".to_string()))?;

        let mut data = query.data.clone();
        resolve_joins(&mut tables, &mut data, &query.joins)?;

        let table = tables.entry(query.source.clone()).or_default();
        let row = table
            .rows
            .iter_mut()
            .find(|row| matches_conditions(row, &query.conditions))
            .ok_or(SourceError::NotFound)?;

        for (field, value) in data {
            row.insert(field, value);
        }

        Ok(row.clone())
    }

    async fn delete(&self, query: &Delete) -> Result<bool, SourceError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| SourceError::Backend("table lock poisoned".to_string()))?;

        let table = tables.entry(query.source.clone()).or_default();
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !matches_conditions(row, &query.conditions));

        Ok(table.rows.len() < before)
    }
}

/// Create one row after resolving its joins, assigning any missing
/// `returning` keys from the table counter.
fn insert_row(
    tables: &mut HashMap<String, Table>,
    source: &str,
    mut data: Item,
    joins: &[Join],
    returning: &[String],
) -> Result<Item, SourceError> {
    resolve_joins(tables, &mut data, joins)?;

    let table = tables.entry(source.to_string()).or_default();
    for key in returning {
        if !data.contains_key(key) {
            let id = table.assign_key();
            data.insert(key.clone(), Value::Number(id.into()));
        }
    }

    table.rows.push(data.clone());
    Ok(data)
}

/// Resolve create/update joins against a payload. A scalar foreign key
/// must reference an existing related row; an embedded object creates
/// the related row first (recursively, following longer join paths) and
/// substitutes its generated key.
fn resolve_joins(
    tables: &mut HashMap<String, Table>,
    data: &mut Item,
    joins: &[Join],
) -> Result<(), SourceError> {
    for join in joins.iter().filter(|join| join.path.len() == 1) {
        let field = &join.path[0];

        match data.get(field).cloned() {
            None | Some(Value::Null) => {}
            Some(Value::Object(parent)) => {
                let nested: Vec<Join> = joins
                    .iter()
                    .filter(|deeper| deeper.path.len() > 1 && deeper.path[0] == *field)
                    .map(|deeper| Join {
                        path: deeper.path[1..].to_vec(),
                        ..deeper.clone()
                    })
                    .collect();

                let returning = vec![join.to.clone()];
                let created = insert_row(tables, &join.source, parent, &nested, &returning)?;

                let key = created.get(&join.to).cloned().unwrap_or(Value::Null);
                data.insert(join.from.clone(), key);
            }
            Some(key) => {
                let exists = tables
                    .get(&join.source)
                    .map(|table| {
                        table
                            .rows
                            .iter()
                            .any(|row| loose_eq(row.get(&join.to).unwrap_or(&Value::Null), &key))
                    })
                    .unwrap_or(false);

                if !exists {
                    return Err(SourceError::ConstraintViolation {
                        field: join.from.clone(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Nest related rows into an item along each join's alias path. Joins
/// resolve shortest-path first so deeper joins find their containers.
fn attach_joins(tables: &HashMap<String, Table>, mut item: Item, joins: &[Join]) -> Item {
    let mut ordered: Vec<&Join> = joins.iter().collect();
    ordered.sort_by_key(|join| join.path.len());

    for join in ordered {
        let Some((alias, prefix)) = join.path.split_last() else {
            continue;
        };

        let Some(container) = navigate(&mut item, prefix) else {
            continue;
        };

        let related = container
            .get(&join.from)
            .filter(|key| !key.is_null())
            .and_then(|key| {
                tables.get(&join.source).and_then(|table| {
                    table
                        .rows
                        .iter()
                        .find(|row| loose_eq(row.get(&join.to).unwrap_or(&Value::Null), key))
                        .cloned()
                })
            });

        container.insert(
            alias.clone(),
            related.map(Value::Object).unwrap_or(Value::Null),
        );
    }

    item
}

/// Walk nested objects along `prefix`, stopping at anything that is not
/// an object (an unjoined or null parent).
fn navigate<'a>(item: &'a mut Item, prefix: &[String]) -> Option<&'a mut Map<String, Value>> {
    let mut container = item;
    for segment in prefix {
        container = container.get_mut(segment)?.as_object_mut()?;
    }
    Some(container)
}

fn matches_conditions(row: &Item, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| {
        loose_eq(
            row.get(&condition.field).unwrap_or(&Value::Null),
            &condition.value,
        )
    })
}

/// Equality that tolerates the string/number ambiguity of URL-sourced
/// values: `"1"` matches `1`, `"true"` matches `true`.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }

    scalar_repr(left)
        .zip(scalar_repr(right))
        .is_some_and(|(a, b)| a == b)
}

fn scalar_repr(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn sort_rows(rows: &mut [&Item], order: &[Order]) {
    if order.is_empty() {
        return;
    }

    rows.sort_by(|left, right| {
        for spec in order {
            let ordering = compare_values(
                left.get(&spec.field).unwrap_or(&Value::Null),
                right.get(&spec.field).unwrap_or(&Value::Null),
            );

            let ordering = match spec.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };

            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_values(left: &Value, right: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::Page;
    use crate::core::schema::Schema;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap_or_default()
    }

    fn read_query(source: &str, kind: ReturnKind) -> Read {
        Read {
            source: source.to_string(),
            kind,
            schema: Schema::default(),
            conditions: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            page: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_keys() {
        let source = InMemorySource::new();

        let first = source
            .create(&Create {
                source: "tasks".to_string(),
                returning: vec!["id".to_string()],
                schema: Schema::default(),
                joins: Vec::new(),
                data: item(json!({"title": "a"})),
            })
            .await
            .unwrap();
        let second = source
            .create(&Create {
                source: "tasks".to_string(),
                returning: vec!["id".to_string()],
                schema: Schema::default(),
                joins: Vec::new(),
                data: item(json!({"title": "b"})),
            })
            .await
            .unwrap();

        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn test_read_item_with_join_nests_parent() {
        let source = InMemorySource::new();
        source.insert("users", json!({"id": 7, "username": "sam"}));
        source.insert("tasks", json!({"id": 1, "title": "t", "owner": 7}));

        let mut query = read_query("tasks", ReturnKind::Item);
        query.conditions.push(Condition {
            field: "id".to_string(),
            value: json!(1),
        });
        query.joins.push(Join {
            source: "users".to_string(),
            path: vec!["users".to_string()],
            from: "owner".to_string(),
            to: "id".to_string(),
        });

        match source.read(&query).await.unwrap() {
            ReadOutcome::Item(Some(row)) => {
                assert_eq!(row["users"]["username"], "sam");
            }
            other => panic!("expected one row, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chained_join_nests_grandparent() {
        let source = InMemorySource::new();
        source.insert("departments", json!({"id": 3, "name": "ops"}));
        source.insert("users", json!({"id": 7, "username": "sam", "department": 3}));
        source.insert("tasks", json!({"id": 1, "title": "t", "owner": 7}));

        let mut query = read_query("tasks", ReturnKind::Item);
        query.joins.push(Join {
            source: "users".to_string(),
            path: vec!["users".to_string()],
            from: "owner".to_string(),
            to: "id".to_string(),
        });
        query.joins.push(Join {
            source: "departments".to_string(),
            path: vec!["users".to_string(), "departments".to_string()],
            from: "department".to_string(),
            to: "id".to_string(),
        });

        match source.read(&query).await.unwrap() {
            ReadOutcome::Item(Some(row)) => {
                assert_eq!(row["users"]["departments"]["name"], "ops");
            }
            other => panic!("expected one row, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collection_counts_all_matches_but_pages_items() {
        let source = InMemorySource::new();
        for n in 1..=55 {
            source.insert("tasks", json!({"id": n, "title": format!("task {n}")}));
        }

        let mut query = read_query("tasks", ReturnKind::Collection);
        query.page = Some(Page {
            number: 3,
            size: 20,
        });

        match source.read(&query).await.unwrap() {
            ReadOutcome::Collection(collection) => {
                assert_eq!(collection.count, 55);
                assert_eq!(collection.items.len(), 15);
                assert_eq!(collection.items[0]["id"], 41);
            }
            other => panic!("expected collection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conditions_use_loose_equality() {
        let source = InMemorySource::new();
        source.insert("tasks", json!({"id": 1, "owner": 7}));
        source.insert("tasks", json!({"id": 2, "owner": 8}));

        let mut query = read_query("tasks", ReturnKind::Collection);
        query.conditions.push(Condition {
            field: "owner".to_string(),
            value: json!("7"),
        });

        match source.read(&query).await.unwrap() {
            ReadOutcome::Collection(collection) => {
                assert_eq!(collection.count, 1);
                assert_eq!(collection.items[0]["id"], 1);
            }
            other => panic!("expected collection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_order_descending() {
        let source = InMemorySource::new();
        source.insert("tasks", json!({"id": 1, "title": "a"}));
        source.insert("tasks", json!({"id": 2, "title": "b"}));

        let mut query = read_query("tasks", ReturnKind::Collection);
        query.order.push(Order::new("id", "desc"));

        match source.read(&query).await.unwrap() {
            ReadOutcome::Collection(collection) => {
                assert_eq!(collection.items[0]["id"], 2);
            }
            other => panic!("expected collection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nested_create_resolves_embedded_parents() {
        let source = InMemorySource::new();

        let created = source
            .create(&Create {
                source: "tasks".to_string(),
                returning: vec!["id".to_string()],
                schema: Schema::default(),
                joins: vec![
                    Join {
                        source: "users".to_string(),
                        path: vec!["owner".to_string()],
                        from: "owner".to_string(),
                        to: "id".to_string(),
                    },
                    Join {
                        source: "departments".to_string(),
                        path: vec!["owner".to_string(), "department".to_string()],
                        from: "department".to_string(),
                        to: "id".to_string(),
                    },
                ],
                data: item(json!({
                    "title": "t",
                    "owner": {"username": "new", "department": {"name": "ops"}}
                })),
            })
            .await
            .unwrap();

        assert_eq!(created["owner"], 1);
        assert_eq!(source.len("users"), 1);
        assert_eq!(source.len("departments"), 1);
        assert_eq!(source.rows("users")[0]["department"], 1);
    }

    #[tokio::test]
    async fn test_scalar_foreign_key_must_exist() {
        let source = InMemorySource::new();

        let err = source
            .create(&Create {
                source: "tasks".to_string(),
                returning: vec!["id".to_string()],
                schema: Schema::default(),
                joins: vec![Join {
                    source: "users".to_string(),
                    path: vec!["owner".to_string()],
                    from: "owner".to_string(),
                    to: "id".to_string(),
                }],
                data: item(json!({"title": "t", "owner": 42})),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SourceError::ConstraintViolation { field } if field == "owner"
        ));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let source = InMemorySource::new();
        source.insert("tasks", json!({"id": 1, "title": "old", "complete": false}));

        let updated = source
            .update(&Update {
                source: "tasks".to_string(),
                returning: vec!["id".to_string()],
                schema: Schema::default(),
                conditions: vec![Condition {
                    field: "id".to_string(),
                    value: json!(1),
                }],
                joins: Vec::new(),
                data: item(json!({"complete": true})),
            })
            .await
            .unwrap();

        assert_eq!(updated["title"], "old");
        assert_eq!(updated["complete"], true);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let source = InMemorySource::new();

        let err = source
            .update(&Update {
                source: "tasks".to_string(),
                returning: Vec::new(),
                schema: Schema::default(),
                conditions: vec![Condition {
                    field: "id".to_string(),
                    value: json!(1),
                }],
                joins: Vec::new(),
                data: Map::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_row_existed() {
        let source = InMemorySource::new();
        source.insert("tasks", json!({"id": 1}));

        let delete = Delete {
            source: "tasks".to_string(),
            conditions: vec![Condition {
                field: "id".to_string(),
                value: json!(1),
            }],
        };

        assert!(source.delete(&delete).await.unwrap());
        assert!(!source.delete(&delete).await.unwrap());
    }
}
