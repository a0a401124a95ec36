//! `GET /{resource}{?where,page,order}`: fetch a filtered, ordered,
//! paged collection
//!
//! The handler returns the raw page plus the total match count; its
//! decorate pass turns rows into embedded item documents (via the
//! interceptable `embed_item`, which the sibling item action upgrades
//! with links and decoration) and emits pagination links when more than
//! one page exists. It also advertises the collection on the root and
//! links filtered child collections from parent items.

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::action::{collection_template, param_to_value, Action, ActionKind, Context, Outcome, RoutePath};
use crate::core::document::{Document, Link, Properties};
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::{Condition, Join, Order, Page, Read, ReturnKind};
use crate::core::resource::Resource;
use crate::core::source::ReadOutcome;
use crate::filter::Filter;
use crate::registry::ActionEntry;

pub struct ReadCollection {
    resource: Resource,
    path: RoutePath,
    page_size: u64,
}

impl ReadCollection {
    /// Expects an initialized resource (primary keys filled in).
    pub fn new(resource: Resource, page_size: u64) -> Arc<Self> {
        let path = RoutePath::new(collection_template(&resource));
        Arc::new(ReadCollection {
            resource,
            path,
            page_size,
        })
    }

    fn page_link(&self, rel: &str, page: u64) -> Link {
        let mut params = Map::new();
        params.insert("page".to_string(), Value::Number(page.into()));
        Link::new(rel, self.path()).with_params(params)
    }
}

#[async_trait]
impl Action for ReadCollection {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadCollection
    }

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> String {
        self.path.get()
    }

    fn prepend_root(&self, root: &str) {
        self.path.prepend(root);
    }

    fn resource(&self) -> Option<&Resource> {
        Some(&self.resource)
    }

    async fn handle(
        &self,
        entry: &ActionEntry,
        params: &Params,
        ctx: &Context,
    ) -> Result<Outcome, Error> {
        let schema = entry.schema(params.clone(), ctx.clone()).await?;
        let joins = entry.joins(params.clone(), ctx.clone()).await?;

        let conditions: Vec<Condition> = params
            .pairs("where")
            .into_iter()
            .flatten()
            .map(|(field, value)| Condition {
                field: field.clone(),
                value: param_to_value(value),
            })
            .collect();

        let mut order: Vec<Order> = params
            .pairs("order")
            .into_iter()
            .flatten()
            .map(|(field, direction)| Order::new(field.clone(), direction))
            .collect();

        // unordered queries sort by primary key so paging is stable
        if order.is_empty() {
            order = self
                .resource
                .primary_keys
                .iter()
                .map(|key| Order::new(key.clone(), "asc"))
                .collect();
        }

        let query = Read {
            source: self.resource.name.clone(),
            kind: ReturnKind::Collection,
            schema,
            conditions,
            joins,
            order,
            page: Some(Page {
                number: params.page(),
                size: self.page_size,
            }),
        };

        match self.resource.source.read(&query).await? {
            ReadOutcome::Collection(collection) => {
                let mut properties = Properties::new();
                properties.insert("count".to_string(), Value::Number(collection.count.into()));
                properties.insert(
                    "items".to_string(),
                    Value::Array(collection.items.into_iter().map(Value::Object).collect()),
                );
                Ok(Outcome::Properties(properties))
            }
            ReadOutcome::Item(_) => Err(Error::Internal(
                "collection query returned a single item".to_string(),
            )),
        }
    }

    /// Turn the fetched rows into embedded item documents and emit
    /// pagination links when the match count exceeds one page.
    async fn decorate(
        &self,
        entry: &ActionEntry,
        mut doc: Document,
        params: &Params,
        ctx: &Context,
    ) -> Result<Document, Error> {
        let items = match doc.properties.shift_remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        for item in items {
            if let Value::Object(item) = item {
                let embed = entry.embed_item(item, params.clone(), ctx.clone()).await?;
                doc.embedded.push(embed);
            }
        }

        let count = doc
            .properties
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if count > self.page_size {
            let current = params.page();
            let last = count.div_ceil(self.page_size);

            // only link backwards off the first page and forwards off
            // the last one
            if current > 1 {
                doc.links.push(self.page_link("first", 1));
                doc.links.push(self.page_link("prev", current - 1));
            }
            if current < last {
                doc.links.push(self.page_link("next", current + 1));
                doc.links.push(self.page_link("last", last));
            }
        }

        Ok(doc)
    }

    /// One join per parent relationship, so collection items embed their
    /// parents the same way a direct item read does.
    async fn joins(
        &self,
        _entry: &ActionEntry,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Vec<Join>, Error> {
        Ok(self
            .resource
            .relationships
            .belongs_to
            .iter()
            .map(|relation| Join {
                source: relation.name.clone(),
                path: vec![relation.name.clone()],
                from: relation.from.clone(),
                to: relation.to.clone(),
            })
            .collect())
    }

    fn filters(self: Arc<Self>) -> Vec<Arc<Filter>> {
        let mut filters: Vec<Arc<Filter>> = Vec::new();

        // Advertise the collection route on the API root.
        {
            let me = self.clone();
            filters.push(Arc::new(Filter::decorate(
                [ActionKind::Root],
                move |next, _action, _registry| {
                    let me = me.clone();

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params, ctx);
                        let me = me.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            doc.links
                                .push(Link::new(me.resource.name.clone(), me.path()));
                            Ok(doc)
                        })
                    })
                },
            )));
        }

        // Link each parent item to the filtered collection of its
        // children, e.g. a user document gets `_links.tasks` pointing at
        // `/tasks?where=owner,{id}`.
        for relation in self.resource.relationships.belongs_to.clone() {
            let me = self.clone();
            let parent_name = relation.name.clone();
            filters.push(Arc::new(
                Filter::decorate([ActionKind::ReadItem], move |next, _action, _registry| {
                    let me = me.clone();
                    let relation = relation.clone();

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params, ctx);
                        let me = me.clone();
                        let relation = relation.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;

                            if let Some(key) = doc.properties.get(&relation.to).cloned() {
                                let mut filter_on = Map::new();
                                filter_on.insert(relation.from.clone(), key);

                                let mut link_params = Map::new();
                                link_params.insert("where".to_string(), Value::Object(filter_on));

                                doc.links.push(
                                    Link::new(me.resource.name.clone(), me.path())
                                        .with_params(link_params),
                                );
                            }

                            Ok(doc)
                        })
                    })
                })
                .bound_to(parent_name),
            ));
        }

        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RequestContext;
    use crate::core::auth::AuthOutcome;
    use crate::core::schema::Schema;
    use crate::registry::Registry;
    use crate::storage::InMemorySource;
    use serde_json::json;

    fn tasks_resource(source: Arc<InMemorySource>) -> Resource {
        Resource::new(
            "tasks",
            Schema::object(
                "tasks",
                json!({"title": {"type": "string"}})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
            source,
        )
        .initialize()
    }

    async fn rendered_page(page: &str, total: usize) -> Value {
        let source = Arc::new(InMemorySource::new());
        for n in 1..=total {
            source.insert("tasks", json!({"id": n, "title": format!("task {n}")}));
        }

        let action = ReadCollection::new(tasks_resource(source), 20);
        action.prepend_root("/");

        let mut registry = Registry::new();
        let entry = registry.register_action(action).unwrap();
        registry.apply_filters().unwrap();

        let params = Params::merge(vec![], vec![("page".to_string(), page.to_string())]);
        let ctx = Arc::new(RequestContext::granted(None));

        let properties = match entry.handle(params.clone(), ctx.clone()).await.unwrap() {
            Outcome::Properties(properties) => properties,
            _ => panic!("expected properties"),
        };

        let doc = entry
            .decorate(Document::new(properties), params, ctx)
            .await
            .unwrap();
        doc.render(&AuthOutcome::Granted)
    }

    #[tokio::test]
    async fn test_collection_embeds_items_as_array() {
        let rendered = rendered_page("1", 3).await;

        assert_eq!(rendered["count"], 3);
        assert!(rendered.get("items").is_none());
        assert_eq!(rendered["_embedded"]["tasks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_single_page_has_no_pagination_links() {
        let rendered = rendered_page("1", 3).await;
        assert!(rendered.get("_links").is_none());
    }

    #[tokio::test]
    async fn test_middle_page_links_in_both_directions() {
        let rendered = rendered_page("2", 55).await;
        let links = &rendered["_links"];

        assert_eq!(links["first"]["href"], "/tasks?page=1");
        assert_eq!(links["prev"]["href"], "/tasks?page=1");
        assert_eq!(links["next"]["href"], "/tasks?page=3");
        assert_eq!(links["last"]["href"], "/tasks?page=3");
        assert_eq!(rendered["_embedded"]["tasks"].as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_first_page_only_links_forward() {
        let rendered = rendered_page("1", 55).await;
        let links = &rendered["_links"];

        assert!(links.get("first").is_none());
        assert!(links.get("prev").is_none());
        assert_eq!(links["next"]["href"], "/tasks?page=2");
        assert_eq!(links["last"]["href"], "/tasks?page=3");
    }

    #[tokio::test]
    async fn test_last_page_only_links_backward() {
        let rendered = rendered_page("3", 55).await;
        let links = &rendered["_links"];

        assert!(links.get("next").is_none());
        assert!(links.get("last").is_none());
        assert_eq!(links["first"]["href"], "/tasks?page=1");
        assert_eq!(links["prev"]["href"], "/tasks?page=2");
        assert_eq!(rendered["_embedded"]["tasks"].as_array().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_default_order_is_primary_key_ascending() {
        let source = Arc::new(InMemorySource::new());
        source.insert("tasks", json!({"id": 2, "title": "second"}));
        source.insert("tasks", json!({"id": 1, "title": "first"}));

        let action = ReadCollection::new(tasks_resource(source), 20);
        action.prepend_root("/");

        let mut registry = Registry::new();
        let entry = registry.register_action(action).unwrap();
        registry.apply_filters().unwrap();

        let ctx = Arc::new(RequestContext::granted(None));
        match entry.handle(Params::new(), ctx).await.unwrap() {
            Outcome::Properties(properties) => {
                let items = properties["items"].as_array().unwrap();
                assert_eq!(items[0]["id"], 1);
                assert_eq!(items[1]["id"], 2);
            }
            _ => panic!("expected properties"),
        }
    }
}
