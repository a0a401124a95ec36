//! `GET /{resource}/{id}`: fetch one item with its parents embedded
//!
//! Beyond its own route, this action teaches the rest of the API how to
//! present items of its resource: it decorates items embedded in the
//! sibling collection, decorates documents of its resource embedded in
//! child reads (which is what makes grandparent embedding recursive),
//! extends child queries with this resource's own parent joins, adds a
//! Location header to sibling creates and a templated discovery link to
//! the root.

use async_trait::async_trait;
use axum::http::{header, Method};
use std::sync::Arc;

use crate::action::{
    item_template, key_conditions, key_params, Action, ActionKind, Context, Outcome, RoutePath,
};
use crate::core::document::{Document, Embed, Link};
use crate::core::error::Error;
use crate::core::params::{Params, MAX_RELATION_DEPTH};
use crate::core::query::{Join, Read, ReturnKind};
use crate::core::resource::Resource;
use crate::core::source::ReadOutcome;
use crate::core::uri;
use crate::filter::Filter;
use crate::registry::ActionEntry;
use serde_json::Value;

pub struct ReadItem {
    resource: Resource,
    path: RoutePath,
}

impl ReadItem {
    /// Expects an initialized resource (primary keys filled in).
    pub fn new(resource: Resource) -> Arc<Self> {
        let path = RoutePath::new(item_template(&resource));
        Arc::new(ReadItem { resource, path })
    }
}

#[async_trait]
impl Action for ReadItem {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadItem
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

        let query = Read {
            source: self.resource.name.clone(),
            kind: ReturnKind::Item,
            schema,
            conditions: key_conditions(&self.resource, params)?,
            joins,
            order: Vec::new(),
            page: None,
        };

        match self.resource.source.read(&query).await? {
            ReadOutcome::Item(Some(item)) => Ok(Outcome::Properties(item)),
            ReadOutcome::Item(None) => Err(Error::NotFound),
            ReadOutcome::Collection(_) => Err(Error::Internal(
                "item query returned a collection".to_string(),
            )),
        }
    }

    /// Move joined parent rows out of the property map into embedded
    /// documents. A null parent (unset foreign key) is dropped entirely.
    async fn decorate(
        &self,
        _entry: &ActionEntry,
        mut doc: Document,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Document, Error> {
        for relation in &self.resource.relationships.belongs_to {
            if let Some(Value::Object(parent)) = doc.properties.shift_remove(&relation.name) {
                doc.embedded.push(Embed {
                    rel: relation.name.clone(),
                    document: Document::new(parent),
                    always_array: false,
                });
            }
        }

        Ok(doc)
    }

    /// One join per parent relationship, aliased by relation name.
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
        let name = self.resource.name.clone();

        // Give items embedded in the sibling collection a self link and
        // this action's full decoration.
        {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::embed_item(
                    [ActionKind::ReadCollection],
                    move |next, _action, registry| {
                        let me = me.clone();
                        let my_entry = registry.entry_of(ActionKind::ReadItem, &me.resource.name);

                        Arc::new(move |item, params, ctx| {
                            let fut = next(item, params.clone(), ctx.clone());
                            let me = me.clone();
                            let my_entry = my_entry.clone();

                            Box::pin(async move {
                                let mut embed = fut.await?;
                                embed.document.links.push(
                                    Link::new("self", me.path())
                                        .with_params(key_params(&me.resource, &embed.document.properties)),
                                );

                                if let Some(entry) = &my_entry {
                                    embed.document =
                                        entry.decorate(embed.document, params, ctx).await?;
                                }

                                Ok(embed)
                            })
                        })
                    },
                )
                .bound_to(name.clone()),
            ));
        }

        // Decorate documents of this resource wherever a child read
        // embeds them. Recursing through the composed decorate chain is
        // what surfaces grandparents, so traversal depth is capped.
        for child in self.resource.relationships.has.clone() {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::decorate([ActionKind::ReadItem], move |next, _action, registry| {
                    let me = me.clone();
                    let my_entry = registry.entry_of(ActionKind::ReadItem, &me.resource.name);

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params.clone(), ctx.clone());
                        let me = me.clone();
                        let my_entry = my_entry.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            if params.depth() >= MAX_RELATION_DEPTH {
                                return Ok(doc);
                            }

                            for embed in doc.embedded.iter_mut() {
                                if embed.rel != me.resource.name {
                                    continue;
                                }

                                let mut inner = std::mem::take(&mut embed.document);
                                inner.links.push(
                                    Link::new("self", me.path())
                                        .with_params(key_params(&me.resource, &inner.properties)),
                                );

                                if let Some(entry) = &my_entry {
                                    inner = entry
                                        .decorate(inner, params.descend(), ctx.clone())
                                        .await?;
                                }

                                embed.document = inner;
                            }

                            Ok(doc)
                        })
                    })
                })
                .bound_to(child.name.clone()),
            ));
        }

        // Point at newly created items of this resource.
        {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::handle([ActionKind::CreateItem], move |next, _action, _registry| {
                    let me = me.clone();

                    Arc::new(move |params, ctx| {
                        let fut = next(params, ctx);
                        let me = me.clone();

                        Box::pin(async move {
                            match fut.await? {
                                Outcome::Response(mut response) => {
                                    if let Some(item) = &response.created {
                                        let location =
                                            uri::expand(&me.path(), &key_params(&me.resource, item));
                                        response.headers.push((header::LOCATION, location));
                                    }
                                    Ok(Outcome::Response(response))
                                }
                                other => Ok(other),
                            }
                        })
                    })
                })
                .bound_to(name.clone()),
            ));
        }

        // Advertise this resource's item route on the API root.
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

        // Extend child reads with this resource's own parent joins, so a
        // child fetches its grandparents in the same query.
        for child in self.resource.relationships.has.clone() {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::joins(
                    [ActionKind::ReadItem, ActionKind::ReadCollection],
                    move |next, _action, registry| {
                        let me = me.clone();
                        let my_entry = registry.entry_of(ActionKind::ReadItem, &me.resource.name);

                        Arc::new(move |params, ctx| {
                            let fut = next(params.clone(), ctx.clone());
                            let me = me.clone();
                            let my_entry = my_entry.clone();

                            Box::pin(async move {
                                let mut joins = fut.await?;
                                if params.depth() >= MAX_RELATION_DEPTH {
                                    return Ok(joins);
                                }

                                if let Some(entry) = &my_entry {
                                    for join in entry.joins(params.descend(), ctx).await? {
                                        let mut path = vec![me.resource.name.clone()];
                                        path.extend(join.path.clone());
                                        joins.push(Join { path, ..join });
                                    }
                                }

                                Ok(joins)
                            })
                        })
                    },
                )
                .bound_to(child.name.clone()),
            ));
        }

        filters
    }
}
