//! `DELETE /{resource}/{id}`: remove an item
//!
//! A delete that matched nothing is a 404, so repeated deletes are not
//! silently idempotent; success is a bare 204.

use async_trait::async_trait;
use axum::http::Method;
use std::sync::Arc;

use crate::action::{
    item_template, key_conditions, key_params, Action, ActionKind, Context, Outcome, RawResponse,
    RoutePath,
};
use crate::core::document::Form;
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::Delete;
use crate::core::resource::Resource;
use crate::filter::Filter;
use crate::registry::ActionEntry;

pub struct DeleteItem {
    resource: Resource,
    path: RoutePath,
}

impl DeleteItem {
    /// Expects an initialized resource (primary keys filled in).
    pub fn new(resource: Resource) -> Arc<Self> {
        let path = RoutePath::new(item_template(&resource));
        Arc::new(DeleteItem { resource, path })
    }
}

#[async_trait]
impl Action for DeleteItem {
    fn kind(&self) -> ActionKind {
        ActionKind::DeleteItem
    }

    fn method(&self) -> Method {
        Method::DELETE
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
        _entry: &ActionEntry,
        params: &Params,
        _ctx: &Context,
    ) -> Result<Outcome, Error> {
        let query = Delete {
            source: self.resource.name.clone(),
            conditions: key_conditions(&self.resource, params)?,
        };

        if self.resource.source.delete(&query).await? {
            Ok(Outcome::Response(RawResponse::no_content()))
        } else {
            Err(Error::NotFound)
        }
    }

    fn filters(self: Arc<Self>) -> Vec<Arc<Filter>> {
        let mut filters: Vec<Arc<Filter>> = Vec::new();
        let name = self.resource.name.clone();

        // Publish a templated delete form on the API root.
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
                            doc.forms.push(
                                Form::new(me.resource.name.clone(), me.path(), "DELETE")
                                    .named("delete"),
                            );
                            Ok(doc)
                        })
                    })
                },
            )));
        }

        // Publish a delete form on the sibling item document.
        {
            let me = self.clone();
            filters.push(Arc::new(
                Filter::decorate([ActionKind::ReadItem], move |next, _action, _registry| {
                    let me = me.clone();

                    Arc::new(move |doc, params, ctx| {
                        let fut = next(doc, params, ctx);
                        let me = me.clone();

                        Box::pin(async move {
                            let mut doc = fut.await?;
                            doc.forms.push(
                                Form::new("self", me.path(), "DELETE")
                                    .named("delete")
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
    use crate::core::schema::Schema;
    use crate::registry::Registry;
    use crate::storage::InMemorySource;
    use axum::http::StatusCode;
    use serde_json::json;

    fn tasks_resource(source: Arc<InMemorySource>) -> Resource {
        Resource::new("tasks", Schema::object("tasks", serde_json::Map::new()), source)
            .initialize()
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_returns_no_content() {
        let source = Arc::new(InMemorySource::new());
        source.insert("tasks", json!({"id": 1, "title": "a"}));
        source.insert("tasks", json!({"id": 2, "title": "b"}));

        let mut registry = Registry::new();
        let delete = registry
            .register_action(DeleteItem::new(tasks_resource(source.clone())))
            .unwrap();
        registry.apply_filters().unwrap();

        let mut params = Params::new();
        params.insert("id", "1");
        let ctx = Arc::new(RequestContext::granted(None));

        match delete.handle(params, ctx).await.unwrap() {
            Outcome::Response(response) => {
                assert_eq!(response.status, StatusCode::NO_CONTENT);
            }
            _ => panic!("expected raw response"),
        }

        assert_eq!(source.len("tasks"), 1);
        assert_eq!(source.rows("tasks")[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let source = Arc::new(InMemorySource::new());
        let mut registry = Registry::new();
        let delete = registry
            .register_action(DeleteItem::new(tasks_resource(source.clone())))
            .unwrap();
        registry.apply_filters().unwrap();

        let mut params = Params::new();
        params.insert("id", "9");
        let ctx = Arc::new(RequestContext::granted(None));

        assert!(matches!(
            delete.handle(params, ctx).await,
            Err(Error::NotFound)
        ));
        assert_eq!(source.len("tasks"), 0);
    }
}
