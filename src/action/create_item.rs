//! `POST /{resource}`: validate a payload and create an item
//!
//! The composed `schema` governs both validation and the create forms
//! this action publishes. Parent actions widen a child's foreign-key
//! properties to also accept a full parent object (`oneOf`), and extend
//! the child's create joins so nested parents are written in one
//! request; because composition goes through the registry entries, the
//! widening and the joins recurse up the relationship graph.

use async_trait::async_trait;
use axum::http::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::action::{Action, ActionKind, Context, Outcome, RawResponse, RoutePath};
use crate::core::document::Form;
use crate::core::error::Error;
use crate::core::params::{Params, MAX_RELATION_DEPTH};
use crate::core::query::{Create, Join};
use crate::core::resource::Resource;
use crate::core::schema;
use crate::filter::Filter;
use crate::registry::ActionEntry;

pub struct CreateItem {
    resource: Resource,
    path: RoutePath,
}

impl CreateItem {
    /// Expects an initialized resource (primary keys filled in).
    pub fn new(resource: Resource) -> Arc<Self> {
        let path = RoutePath::new(resource.name.clone());
        Arc::new(CreateItem { resource, path })
    }
}

#[async_trait]
impl Action for CreateItem {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateItem
    }

    fn method(&self) -> Method {
        Method::POST
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

        let query = Create {
            source: self.resource.name.clone(),
            returning: self.resource.primary_keys.clone(),
            schema: composed,
            joins,
            data,
        };

        let item = self.resource.source.create(&query).await?;
        Ok(Outcome::Response(RawResponse::created(item)))
    }

    /// One join per parent relationship, aliased by the foreign-key
    /// field a payload would embed a parent object under.
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

        // Widen each child's foreign key pointing here to also accept a
        // full object satisfying this action's composed create schema.
        for child in self.resource.relationships.has.clone() {
            let me = self.clone();
            let child_name = child.name.clone();
            filters.push(Arc::new(
                Filter::schema([ActionKind::CreateItem], move |next, _action, registry| {
                    let me = me.clone();
                    let child = child.clone();
                    let my_entry = registry.entry_of(ActionKind::CreateItem, &me.resource.name);

                    Arc::new(move |params, ctx| {
                        let fut = next(params.clone(), ctx.clone());
                        let me = me.clone();
                        let child = child.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut composed = fut.await?;
                            if params.depth() >= MAX_RELATION_DEPTH {
                                return Ok(composed);
                            }

                            let alternative = match &my_entry {
                                Some(entry) => entry.schema(params.descend(), ctx).await?,
                                None => me.resource.schema.clone(),
                            };

                            composed.widen_property(&child.to, &alternative);
                            Ok(composed)
                        })
                    })
                })
                .bound_to(child_name),
            ));
        }

        // Extend child creates and updates with this resource's own
        // parent joins, so nested payloads resolve all the way up.
        for child in self.resource.relationships.has.clone() {
            let me = self.clone();
            let child_name = child.name.clone();
            filters.push(Arc::new(
                Filter::joins(
                    [ActionKind::CreateItem, ActionKind::UpdateItem],
                    move |next, _action, registry| {
                        let child = child.clone();
                        let my_entry = registry.entry_of(ActionKind::CreateItem, &me.resource.name);

                        Arc::new(move |params, ctx| {
                            let fut = next(params.clone(), ctx.clone());
                            let child = child.clone();
                            let my_entry = my_entry.clone();

                            Box::pin(async move {
                                let mut joins = fut.await?;
                                if params.depth() >= MAX_RELATION_DEPTH {
                                    return Ok(joins);
                                }

                                if let Some(entry) = &my_entry {
                                    for join in entry.joins(params.descend(), ctx).await? {
                                        let mut path = vec![child.to.clone()];
                                        path.extend(join.path.clone());
                                        joins.push(Join { path, ..join });
                                    }
                                }

                                Ok(joins)
                            })
                        })
                    },
                )
                .bound_to(child_name),
            ));
        }

        // Publish a create form on the API root.
        {
            let me = self.clone();
            filters.push(Arc::new(Filter::decorate(
                [ActionKind::Root],
                move |next, _action, registry| {
                    let me = me.clone();
                    let my_entry = registry.entry_of(ActionKind::CreateItem, &me.resource.name);

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params.clone(), ctx.clone());
                        let me = me.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            let composed = match &my_entry {
                                Some(entry) => entry.schema(params, ctx).await?,
                                None => me.resource.schema.clone(),
                            };

                            doc.forms.push(
                                Form::new(me.resource.name.clone(), me.path(), "POST")
                                    .named("create")
                                    .with_schema(composed),
                            );
                            Ok(doc)
                        })
                    })
                },
            )));
        }

        // Publish a create form on the sibling collection.
        {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::decorate(
                    [ActionKind::ReadCollection],
                    move |next, _action, registry| {
                        let me = me.clone();
                        let my_entry = registry.entry_of(ActionKind::CreateItem, &me.resource.name);

                        Arc::new(move |doc, params, ctx| {
                            let fut = next(doc, params.clone(), ctx.clone());
                            let me = me.clone();
                            let my_entry = my_entry.clone();

                            Box::pin(async move {
                                let mut doc = fut.await?;
                                let composed = match &my_entry {
                                    Some(entry) => entry.schema(params, ctx).await?,
                                    None => me.resource.schema.clone(),
                                };

                                doc.forms.push(
                                    Form::new("create", me.path(), "POST").with_schema(composed),
                                );
                                Ok(doc)
                            })
                        })
                    },
                )
                .bound_to(name.clone()),
            ));
        }

        // Publish a pre-filled create-child form on each parent item,
        // defaulting the foreign key to the parent's own key.
        for relation in self.resource.relationships.belongs_to.clone() {
            let me = self.clone();
            let parent_name = relation.name.clone();
            filters.push(Arc::new(
                Filter::decorate([ActionKind::ReadItem], move |next, _action, registry| {
                    let me = me.clone();
                    let relation = relation.clone();
                    let my_entry = registry.entry_of(ActionKind::CreateItem, &me.resource.name);

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params.clone(), ctx.clone());
                        let me = me.clone();
                        let relation = relation.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            let Some(key) = doc.properties.get(&relation.to).cloned() else {
                                return Ok(doc);
                            };

                            let composed = match &my_entry {
                                Some(entry) => entry.schema(params, ctx).await?,
                                None => me.resource.schema.clone(),
                            };

                            let mut defaults = Map::new();
                            defaults.insert(relation.from.clone(), key);

                            doc.forms.push(
                                Form::new(me.resource.name.clone(), me.path(), "POST")
                                    .named("create")
                                    .with_schema(composed.with_defaults(defaults)),
                            );
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
