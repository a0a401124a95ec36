//! The composition root: options, registration and router assembly
//!
//! A `Plugin` owns a registry, accepts resources, actions and filters
//! while building, then assembles everything into an `axum::Router`.
//! Filter application happens exactly once, inside `build`, after which
//! the registry is frozen and the composed method chains serve traffic.

use axum::extract::{Json, Query, RawPathParams, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::action::{
    Action, Context, CreateItem, DeleteItem, Outcome, ReadCollection, ReadItem, RequestContext,
    Root, UpdateItem,
};
use crate::core::auth::{AuthProvider, NoAuthProvider};
use crate::core::document::{Document, Link};
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::resource::Resource;
use crate::core::uri;
use crate::filter::Filter;
use crate::registry::{ActionEntry, Registry};

pub const HAL_CONTENT_TYPE: &str = "application/hal+json";

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Path prefix every registered action is mounted under
    pub root: String,

    /// When `true`, building without an auth provider is a
    /// configuration error
    pub secure: bool,

    /// Rows per collection page
    pub page_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            root: "/".to_string(),
            secure: true,
            page_size: 20,
        }
    }
}

impl Options {
    /// Load options from a YAML document, e.g. a deployment config file.
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        serde_yaml::from_str(text)
            .map_err(|err| Error::Configuration(format!("invalid options: {}", err)))
    }
}

/// Assembles registered resources, actions and filters into a router.
pub struct Plugin {
    registry: Registry,
    options: Options,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl Plugin {
    pub fn new(options: Options) -> Self {
        Plugin {
            registry: Registry::new(),
            options,
            auth: None,
        }
    }

    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a resource by mounting the five CRUD actions for it.
    pub fn register_resource(&mut self, resource: Resource) -> Result<(), Error> {
        let resource = resource.initialize();
        tracing::info!(resource = %resource.name, "registering resource");

        self.register_action(ReadItem::new(resource.clone()))?;
        self.register_action(ReadCollection::new(resource.clone(), self.options.page_size))?;
        self.register_action(CreateItem::new(resource.clone()))?;
        self.register_action(UpdateItem::new(resource.clone()))?;
        self.register_action(DeleteItem::new(resource))?;

        Ok(())
    }

    /// Register a single action under the configured root.
    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<(), Error> {
        action.prepend_root(&self.options.root);
        let entry = self.registry.register_action(action)?;

        tracing::info!(
            method = %entry.action().method(),
            path = %entry.action().path(),
            "registered action"
        );

        Ok(())
    }

    pub fn register_filter(&mut self, filter: Arc<Filter>) -> Result<(), Error> {
        self.registry.register_filter(filter)
    }

    /// Apply all filters, freeze the registry and produce the router.
    pub fn build(mut self) -> Result<Router, Error> {
        if self.options.secure && self.auth.is_none() {
            return Err(Error::Configuration(
                "secure mode requires an auth provider; pass one or set secure: false".to_string(),
            ));
        }

        self.register_action(Root::new())?;
        self.registry.apply_filters()?;

        let auth: Arc<dyn AuthProvider> = match self.auth {
            Some(provider) => provider,
            None => Arc::new(NoAuthProvider),
        };

        let mut router = Router::new();
        for entry in self.registry.entries() {
            let action = entry.action();
            let route = uri::dequery(&action.path());
            let method = method_filter(action.method())?;

            let state = DispatchState {
                entry: entry.clone(),
                auth: auth.clone(),
            };

            tracing::debug!(route = %route, "mounting route");
            router = router.route(&route, on(method, dispatch).with_state(state));
        }

        Ok(router.layer(TraceLayer::new_for_http()))
    }
}

fn method_filter(method: axum::http::Method) -> Result<MethodFilter, Error> {
    MethodFilter::try_from(method.clone())
        .map_err(|_| Error::Configuration(format!("unroutable method '{}'", method)))
}

#[derive(Clone)]
struct DispatchState {
    entry: Arc<ActionEntry>,
    auth: Arc<dyn AuthProvider>,
}

/// One handler serves every route: merge parameters, authenticate, run
/// the entry's composed chain, render.
async fn dispatch(
    State(state): State<DispatchState>,
    raw_params: RawPathParams,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    payload: Option<Json<Value>>,
) -> Response {
    let path_params: Vec<(String, String)> = raw_params
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let params = Params::merge(path_params, query);

    let auth = state.auth.authenticate(&headers).await;
    let ctx: Context = Arc::new(RequestContext::new(
        auth,
        payload.map(|Json(value)| value),
        headers,
    ));

    match respond(&state.entry, params, ctx).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn respond(entry: &ActionEntry, params: Params, ctx: Context) -> Result<Response, Error> {
    match entry.handle(params.clone(), ctx.clone()).await? {
        Outcome::Properties(properties) => {
            let doc = Document::new(properties);
            let mut doc = entry.decorate(doc, params.clone(), ctx.clone()).await?;

            // every rendered document carries a public self link filled
            // from the request's own parameters
            doc.links.push(
                Link::new("self", entry.action().path())
                    .with_params(params.to_json_map())
                    .public(),
            );

            let body = serde_json::to_string(&doc.render(&ctx.auth))
                .map_err(|err| Error::Internal(format!("render failed: {}", err)))?;

            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, HAL_CONTENT_TYPE)],
                body,
            )
                .into_response())
        }
        Outcome::Response(raw) => {
            let mut response = raw.status.into_response();
            for (name, value) in raw.headers {
                let value = HeaderValue::from_str(&value)
                    .map_err(|_| Error::Internal(format!("invalid '{}' header value", name)))?;
                response.headers_mut().insert(name, value);
            }
            Ok(response)
        }
    }
}
