//! `PATCH /{resource}/{id}`: partially update an item
//!
//! Updates validate against the resource schema with its `required`
//! list cleared, so any subset of writable fields is an acceptable
//! payload. Success is a bare 204; clients re-read if they need the
//! updated representation.

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::action::{
    item_template, key_conditions, key_params, Action, ActionKind, Context, Outcome, RawResponse,
    RoutePath,
};
use crate::core::document::Form;
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::{Join, Update};
use crate::core::resource::Resource;
use crate::core::schema;
use crate::core::schema::Schema;
use crate::filter::Filter;
use crate::registry::ActionEntry;

pub struct UpdateItem {
    resource: Resource,
    path: RoutePath,
}

impl UpdateItem {
    /// Expects an initialized resource (primary keys filled in).
    pub fn new(resource: Resource) -> Arc<Self> {
        let path = RoutePath::new(item_template(&resource));
        Arc::new(UpdateItem { resource, path })
    }
}

#[async_trait]
impl Action for UpdateItem {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateItem
    }

    fn method(&self) -> Method {
        Method::PATCH
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
        let composed = entry.schema(params.clone(), ctx.clone()).await?;
        let payload = ctx
            .payload
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));

        schema::validate(&payload, &composed)?;

        let joins = entry.joins(params.clone(), ctx.clone()).await?;
        let data = schema::pick_allowed_values(&composed, &payload);

        let query = Update {
            source: self.resource.name.clone(),
            returning: self.resource.primary_keys.clone(),
            schema: composed,
            conditions: key_conditions(&self.resource, params)?,
            joins,
            data,
        };

        self.resource.source.update(&query).await?;
        Ok(Outcome::Response(RawResponse::no_content()))
    }

    /// The resource schema with `required` cleared: partial payloads are
    /// the point of PATCH.
    async fn schema(
        &self,
        _entry: &ActionEntry,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Schema, Error> {
        Ok(self.resource.schema.without_required())
    }

    /// Same foreign-key-aliased joins as a create, so an update payload
    /// may also embed a parent object.
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
                path: vec![relation.from.clone()],
                from: relation.from.clone(),
                to: relation.to.clone(),
            })
            .collect())
    }

    fn filters(self: Arc<Self>) -> Vec<Arc<Filter>> {
        let mut filters: Vec<Arc<Filter>> = Vec::new();
        let name = self.resource.name.clone();

        // Publish a templated update form on the API root.
        {
            let me = self.clone();
            filters.push(Arc::new(Filter::decorate(
                [ActionKind::Root],
                move |next, _action, registry| {
                    let me = me.clone();
                    let my_entry = registry.entry_of(ActionKind::UpdateItem, &me.resource.name);

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params.clone(), ctx.clone());
                        let me = me.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            let composed = match &my_entry {
                                Some(entry) => entry.schema(params, ctx).await?,
                                None => me.resource.schema.without_required(),
                            };

                            doc.forms.push(
                                Form::new(me.resource.name.clone(), me.path(), "PATCH")
                                    .named("update")
                                    .with_schema(composed),
                            );
                            Ok(doc)
                        })
                    })
                },
            )));
        }

        // Publish an update form on the sibling item document.
        {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::decorate([ActionKind::ReadItem], move |next, _action, registry| {
                    let me = me.clone();
                    let my_entry = registry.entry_of(ActionKind::UpdateItem, &me.resource.name);

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params.clone(), ctx.clone());
                        let me = me.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            let composed = match &my_entry {
                                Some(entry) => entry.schema(params, ctx).await?,
                                None => me.resource.schema.without_required(),
                            };

                            doc.forms.push(
                                Form::new("self", me.path(), "PATCH")
                                    .named("update")
                                    .with_schema(composed)
                                    .with_params(key_params(&me.resource, &doc.properties)),
                            );
                            Ok(doc)
                        })
                    })
                })
                .bound_to(name.clone()),
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
    use crate::registry::Registry;
    use crate::storage::InMemorySource;
    use axum::http::HeaderMap;
    use axum::http::StatusCode;
    use serde_json::json;

    fn tasks_resource(source: Arc<InMemorySource>) -> Resource {
        Resource::new(
            "tasks",
            Schema::object(
                "tasks",
                json!({
                    "title": {"type": "string"},
                    "complete": {"type": "boolean"}
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .with_required(["title"]),
            source,
        )
        .initialize()
    }

    fn ctx_with(payload: Value) -> Context {
        Arc::new(RequestContext::new(
            AuthOutcome::Granted,
            Some(payload),
            HeaderMap::new(),
        ))
    }

    #[tokio::test]
    async fn test_partial_payload_updates_and_returns_no_content() {
        let source = Arc::new(InMemorySource::new());
        source.insert("tasks", json!({"id": 1, "title": "draft", "complete": false}));

        let mut registry = Registry::new();
        let update = registry
            .register_action(UpdateItem::new(tasks_resource(source.clone())))
            .unwrap();
        registry.apply_filters().unwrap();

        let mut params = Params::new();
        params.insert("id", "1");

        match update
            .handle(params, ctx_with(json!({"complete": true})))
            .await
            .unwrap()
        {
            Outcome::Response(response) => {
                assert_eq!(response.status, StatusCode::NO_CONTENT);
            }
            _ => panic!("expected raw response"),
        }

        let row = source.rows("tasks")[0].clone();
        assert_eq!(row["complete"], true);
        assert_eq!(row["title"], "draft");
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let source = Arc::new(InMemorySource::new());
        let mut registry = Registry::new();
        let update = registry
            .register_action(UpdateItem::new(tasks_resource(source)))
            .unwrap();
        registry.apply_filters().unwrap();

        let mut params = Params::new();
        params.insert("id", "7");

        assert!(matches!(
            update.handle(params, ctx_with(json!({"complete": true}))).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_wrong_type_still_rejected() {
        let source = Arc::new(InMemorySource::new());
        source.insert("tasks", json!({"id": 1, "title": "draft"}));

        let mut registry = Registry::new();
        let update = registry
            .register_action(UpdateItem::new(tasks_resource(source)))
            .unwrap();
        registry.apply_filters().unwrap();

        let mut params = Params::new();
        params.insert("id", "1");

        let err = update
            .handle(params, ctx_with(json!({"complete": "yes"})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
