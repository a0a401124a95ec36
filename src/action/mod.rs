//! The `Action` contract and the built-in CRUD actions
//!
//! An action binds an HTTP method and a path template to a unit of
//! request-handling logic. Its interceptable methods (`handle`,
//! `decorate`, `joins`, `schema`, `embed_item`) always execute through
//! the owning [`ActionEntry`](crate::registry::ActionEntry), so a call
//! observes whatever filter chain the registry composed at freeze time.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

use crate::core::auth::AuthOutcome;
use crate::core::document::{Document, Embed, Properties};
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::{Condition, Join};
use crate::core::resource::Resource;
use crate::core::schema::Schema;
use crate::core::source::Item;
use crate::filter::Filter;
use crate::registry::ActionEntry;

mod create_item;
mod delete_item;
mod read_collection;
mod read_item;
mod root;
mod update_item;

pub use create_item::CreateItem;
pub use delete_item::DeleteItem;
pub use read_collection::ReadCollection;
pub use read_item::ReadItem;
pub use root::Root;
pub use update_item::UpdateItem;

/// Discriminator used for filter matching. Replaces runtime type
/// introspection with an explicit tag, so a filter targets
/// `(kind, predicate)` tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Root,
    ReadItem,
    ReadCollection,
    CreateItem,
    UpdateItem,
    DeleteItem,

    /// Host-defined actions; the tag doubles as the match key
    Custom(&'static str),
}

/// Per-request state shared down the dispatch pipeline.
#[derive(Debug)]
pub struct RequestContext {
    /// Authentication outcome, resolved by the configured provider
    pub auth: AuthOutcome,

    /// Parsed JSON request body, when one was sent
    pub payload: Option<Value>,

    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn new(auth: AuthOutcome, payload: Option<Value>, headers: HeaderMap) -> Self {
        RequestContext {
            auth,
            payload,
            headers,
        }
    }

    /// An authenticated context with an optional payload. Convenient
    /// for driving actions outside a server.
    pub fn granted(payload: Option<Value>) -> Self {
        RequestContext::new(AuthOutcome::Granted, payload, HeaderMap::new())
    }
}

/// Shared request context handle.
pub type Context = Arc<RequestContext>;

/// What a `handle` call produced.
#[derive(Debug)]
pub enum Outcome {
    /// Raw result data; seeds a `Document` which is then decorated and
    /// rendered
    Properties(Properties),

    /// A complete response (status, headers); bypasses decoration
    Response(RawResponse),
}

/// A non-document response, e.g. 201 Created or 204 No Content.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, String)>,

    /// The item a create produced, carried for downstream filters
    /// (e.g. the Location-header filter)
    pub created: Option<Item>,
}

impl RawResponse {
    pub fn created(item: Item) -> Self {
        RawResponse {
            status: StatusCode::CREATED,
            headers: Vec::new(),
            created: Some(item),
        }
    }

    pub fn no_content() -> Self {
        RawResponse {
            status: StatusCode::NO_CONTENT,
            headers: Vec::new(),
            created: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: String) -> Self {
        self.headers.push((name, value));
        self
    }
}

/// An action's path template. Mutated exactly once, when the plugin
/// prepends its configured root at registration time; filters that
/// closed over the action read the final path at call time.
#[derive(Debug)]
pub struct RoutePath(RwLock<String>);

impl RoutePath {
    pub fn new(path: impl Into<String>) -> Self {
        RoutePath(RwLock::new(path.into()))
    }

    pub fn get(&self) -> String {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn prepend(&self, root: &str) {
        let mut path = self
            .0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *path = join_path(root, &path);
    }
}

/// Join a root prefix and a relative path template into an absolute
/// path with no doubled slashes.
pub fn join_path(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    match (root.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, path),
    }
}

/// Path template addressing one item of `resource`, e.g. `tasks/{id}`.
pub(crate) fn item_template(resource: &Resource) -> String {
    let keys: Vec<String> = resource
        .primary_keys
        .iter()
        .map(|key| format!("{{{}}}", key))
        .collect();

    format!("{}/{}", resource.name, keys.join("/"))
}

/// Path template addressing a collection of `resource`, including the
/// query parameters collection reads accept.
pub(crate) fn collection_template(resource: &Resource) -> String {
    format!("{}{{?where,page,order}}", resource.name)
}

/// Interpret a raw path or query parameter as a JSON value.
pub(crate) fn param_to_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }

    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Equality conditions on the resource's primary keys, taken from path
/// parameters.
pub(crate) fn key_conditions(resource: &Resource, params: &Params) -> Result<Vec<Condition>, Error> {
    resource
        .primary_keys
        .iter()
        .map(|key| {
            let raw = params
                .get(key)
                .ok_or_else(|| Error::Internal(format!("missing path parameter '{}'", key)))?;

            Ok(Condition {
                field: key.clone(),
                value: param_to_value(raw),
            })
        })
        .collect()
}

/// Primary-key values of an item, for expanding item link templates.
pub(crate) fn key_params(resource: &Resource, item: &Properties) -> Map<String, Value> {
    resource
        .primary_keys
        .iter()
        .filter_map(|key| item.get(key).map(|value| (key.clone(), value.clone())))
        .collect()
}

/// A bound (HTTP method, path, resource) unit of request-handling
/// logic.
///
/// The `entry` argument on the interceptable methods is the action's
/// own registry entry; internal delegation (e.g. a handler fetching its
/// joins) must go through it so that filter-contributed behavior is
/// observed.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    fn kind(&self) -> ActionKind;

    fn method(&self) -> Method;

    /// The current path template, including the root prefix once
    /// registered
    fn path(&self) -> String;

    /// One-time mutation performed by the plugin at registration
    fn prepend_root(&self, root: &str);

    /// The resource this action is bound to, if any
    fn resource(&self) -> Option<&Resource> {
        None
    }

    fn resource_name(&self) -> Option<&str> {
        self.resource().map(|resource| resource.name.as_str())
    }

    /// The entry point: produce raw result data or a complete response.
    async fn handle(
        &self,
        entry: &ActionEntry,
        params: &Params,
        ctx: &Context,
    ) -> Result<Outcome, Error>;

    /// Enrich the document built from `handle`'s result.
    async fn decorate(
        &self,
        _entry: &ActionEntry,
        doc: Document,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Document, Error> {
        Ok(doc)
    }

    /// Joins to fetch or create related data alongside the main query.
    async fn joins(
        &self,
        _entry: &ActionEntry,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Vec<Join>, Error> {
        Ok(Vec::new())
    }

    /// The schema governing this action's payloads and forms.
    async fn schema(
        &self,
        _entry: &ActionEntry,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Schema, Error> {
        Ok(self
            .resource()
            .map(|resource| resource.schema.clone())
            .unwrap_or_default())
    }

    /// Wrap one raw collection item as an embed. Collection reads call
    /// this per item; same-resource item actions hook it to attach
    /// links and decoration.
    async fn embed_item(
        &self,
        _entry: &ActionEntry,
        item: Item,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Embed, Error> {
        Ok(Embed {
            rel: self.resource_name().unwrap_or("item").to_string(),
            document: Document::new(item),
            always_array: true,
        })
    }

    /// Filters this action contributes to the registry, wrapping
    /// methods on other actions.
    fn filters(self: Arc<Self>) -> Vec<Arc<Filter>> {
        Vec::new()
    }
}
