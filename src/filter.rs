//! Filters: declarative method interception across actions
//!
//! A filter names the action kinds it targets, an optional predicate to
//! narrow the match, and a wrapper for one interceptable method. The
//! wrapper receives the method's current implementation (`next`), the
//! matched action and the registry, and returns the replacement. The
//! registry applies all filters once at freeze time; first-registered
//! wrappers end up innermost.

use std::sync::Arc;

use crate::action::{Action, ActionKind, Context, Outcome};
use crate::core::document::{Document, Embed};
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::Join;
use crate::core::schema::Schema;
use crate::core::source::Item;
use crate::registry::Registry;

pub type BoxFuture<T> = futures::future::BoxFuture<'static, T>;

/// Composed implementation of `Action::handle`.
pub type HandleFn = Arc<dyn Fn(Params, Context) -> BoxFuture<Result<Outcome, Error>> + Send + Sync>;

/// Composed implementation of `Action::decorate`.
pub type DecorateFn =
    Arc<dyn Fn(Document, Params, Context) -> BoxFuture<Result<Document, Error>> + Send + Sync>;

/// Composed implementation of `Action::joins`.
pub type JoinsFn =
    Arc<dyn Fn(Params, Context) -> BoxFuture<Result<Vec<Join>, Error>> + Send + Sync>;

/// Composed implementation of `Action::schema`.
pub type SchemaFn = Arc<dyn Fn(Params, Context) -> BoxFuture<Result<Schema, Error>> + Send + Sync>;

/// Composed implementation of `Action::embed_item`.
pub type EmbedItemFn =
    Arc<dyn Fn(Item, Params, Context) -> BoxFuture<Result<Embed, Error>> + Send + Sync>;

/// Narrows a kind match to specific actions, usually by resource name.
pub type Predicate = Box<dyn Fn(&dyn Action) -> bool + Send + Sync>;

/// Builds a replacement implementation from the current one. Runs once
/// per matched action at freeze time.
pub type WrapFn<F> = Box<dyn Fn(F, &Arc<dyn Action>, &Registry) -> F + Send + Sync>;

/// Which interceptable method a filter wraps.
pub enum Wrap {
    Handle(WrapFn<HandleFn>),
    Decorate(WrapFn<DecorateFn>),
    Joins(WrapFn<JoinsFn>),
    Schema(WrapFn<SchemaFn>),
    EmbedItem(WrapFn<EmbedItemFn>),
}

impl Wrap {
    pub fn method_name(&self) -> &'static str {
        match self {
            Wrap::Handle(_) => "handle",
            Wrap::Decorate(_) => "decorate",
            Wrap::Joins(_) => "joins",
            Wrap::Schema(_) => "schema",
            Wrap::EmbedItem(_) => "embed_item",
        }
    }
}

/// A declarative interception of one method on matching actions.
pub struct Filter {
    /// Action kinds this filter targets
    pub kinds: Vec<ActionKind>,

    /// Optional narrowing beyond the kind match
    pub predicate: Option<Predicate>,

    pub wrap: Wrap,
}

impl Filter {
    fn assemble(kinds: impl IntoIterator<Item = ActionKind>, wrap: Wrap) -> Self {
        Filter {
            kinds: kinds.into_iter().collect(),
            predicate: None,
            wrap,
        }
    }

    pub fn handle(
        kinds: impl IntoIterator<Item = ActionKind>,
        build: impl Fn(HandleFn, &Arc<dyn Action>, &Registry) -> HandleFn + Send + Sync + 'static,
    ) -> Self {
        Filter::assemble(kinds, Wrap::Handle(Box::new(build)))
    }

    pub fn decorate(
        kinds: impl IntoIterator<Item = ActionKind>,
        build: impl Fn(DecorateFn, &Arc<dyn Action>, &Registry) -> DecorateFn + Send + Sync + 'static,
    ) -> Self {
        Filter::assemble(kinds, Wrap::Decorate(Box::new(build)))
    }

    pub fn joins(
        kinds: impl IntoIterator<Item = ActionKind>,
        build: impl Fn(JoinsFn, &Arc<dyn Action>, &Registry) -> JoinsFn + Send + Sync + 'static,
    ) -> Self {
        Filter::assemble(kinds, Wrap::Joins(Box::new(build)))
    }

    pub fn schema(
        kinds: impl IntoIterator<Item = ActionKind>,
        build: impl Fn(SchemaFn, &Arc<dyn Action>, &Registry) -> SchemaFn + Send + Sync + 'static,
    ) -> Self {
        Filter::assemble(kinds, Wrap::Schema(Box::new(build)))
    }

    pub fn embed_item(
        kinds: impl IntoIterator<Item = ActionKind>,
        build: impl Fn(EmbedItemFn, &Arc<dyn Action>, &Registry) -> EmbedItemFn + Send + Sync + 'static,
    ) -> Self {
        Filter::assemble(kinds, Wrap::EmbedItem(Box::new(build)))
    }

    pub fn matching(
        mut self,
        predicate: impl Fn(&dyn Action) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Narrow the match to actions bound to the named resource.
    pub fn bound_to(self, resource: impl Into<String>) -> Self {
        let name = resource.into();
        self.matching(move |action| action.resource_name() == Some(name.as_str()))
    }
}
