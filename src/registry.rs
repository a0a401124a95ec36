//! The registry: action entries, filter application and freeze
//!
//! Every registered action gets an [`ActionEntry`] holding one slot per
//! interceptable method, seeded with the action's own implementation.
//! Filters replace slot contents during [`Registry::apply_filters`];
//! afterwards the registry is frozen and the composed chains are the
//! only thing the dispatch path ever calls.

use std::sync::{Arc, RwLock, Weak};

use crate::action::{Action, ActionKind, Context, Outcome};
use crate::core::document::{Document, Embed};
use crate::core::error::Error;
use crate::core::params::Params;
use crate::core::query::Join;
use crate::core::schema::Schema;
use crate::core::source::{Item, Source};
use crate::filter::{
    DecorateFn, EmbedItemFn, Filter, HandleFn, JoinsFn, Predicate, SchemaFn, Wrap,
};

// =============================================================================
// Action entries
// =============================================================================

/// A registered action plus the composed implementation of each of its
/// interceptable methods.
///
/// The slots start out delegating to the action's trait methods, passing
/// the entry itself back in so that a base implementation which calls
/// e.g. its own `joins` observes filter contributions. Filters then
/// rebind slots at freeze time; calls always read the slot at call time.
pub struct ActionEntry {
    action: Arc<dyn Action>,
    handle: RwLock<HandleFn>,
    decorate: RwLock<DecorateFn>,
    joins: RwLock<JoinsFn>,
    schema: RwLock<SchemaFn>,
    embed_item: RwLock<EmbedItemFn>,
}

impl ActionEntry {
    pub(crate) fn new(action: Arc<dyn Action>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ActionEntry>| ActionEntry {
            action,
            handle: RwLock::new(base_handle(weak.clone())),
            decorate: RwLock::new(base_decorate(weak.clone())),
            joins: RwLock::new(base_joins(weak.clone())),
            schema: RwLock::new(base_schema(weak.clone())),
            embed_item: RwLock::new(base_embed_item(weak.clone())),
        })
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub async fn handle(&self, params: Params, ctx: Context) -> Result<Outcome, Error> {
        let composed = read_slot(&self.handle)?;
        composed(params, ctx).await
    }

    pub async fn decorate(
        &self,
        doc: Document,
        params: Params,
        ctx: Context,
    ) -> Result<Document, Error> {
        let composed = read_slot(&self.decorate)?;
        composed(doc, params, ctx).await
    }

    pub async fn joins(&self, params: Params, ctx: Context) -> Result<Vec<Join>, Error> {
        let composed = read_slot(&self.joins)?;
        composed(params, ctx).await
    }

    pub async fn schema(&self, params: Params, ctx: Context) -> Result<Schema, Error> {
        let composed = read_slot(&self.schema)?;
        composed(params, ctx).await
    }

    pub async fn embed_item(
        &self,
        item: Item,
        params: Params,
        ctx: Context,
    ) -> Result<Embed, Error> {
        let composed = read_slot(&self.embed_item)?;
        composed(item, params, ctx).await
    }

    /// Rebind one slot: hand the current implementation to the wrapper
    /// and store the replacement.
    fn apply(&self, wrap: &Wrap, registry: &Registry) -> Result<(), Error> {
        match wrap {
            Wrap::Handle(build) => rebind(&self.handle, |next| build(next, &self.action, registry)),
            Wrap::Decorate(build) => {
                rebind(&self.decorate, |next| build(next, &self.action, registry))
            }
            Wrap::Joins(build) => rebind(&self.joins, |next| build(next, &self.action, registry)),
            Wrap::Schema(build) => rebind(&self.schema, |next| build(next, &self.action, registry)),
            Wrap::EmbedItem(build) => {
                rebind(&self.embed_item, |next| build(next, &self.action, registry))
            }
        }
    }
}

impl std::fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEntry")
            .field("kind", &self.action.kind())
            .field("path", &self.action.path())
            .finish_non_exhaustive()
    }
}

fn read_slot<F: Clone>(slot: &RwLock<F>) -> Result<F, Error> {
    slot.read()
        .map(|composed| composed.clone())
        .map_err(|_| Error::Internal("action entry lock poisoned".to_string()))
}

fn rebind<F: Clone>(slot: &RwLock<F>, build: impl FnOnce(F) -> F) -> Result<(), Error> {
    let mut slot = slot
        .write()
        .map_err(|_| Error::Internal("action entry lock poisoned".to_string()))?;
    let next = slot.clone();
    *slot = build(next);
    Ok(())
}

fn upgrade(weak: &Weak<ActionEntry>) -> Result<Arc<ActionEntry>, Error> {
    weak.upgrade()
        .ok_or_else(|| Error::Internal("action entry dropped".to_string()))
}

fn base_handle(weak: Weak<ActionEntry>) -> HandleFn {
    Arc::new(move |params, ctx| {
        let weak = weak.clone();
        Box::pin(async move {
            let entry = upgrade(&weak)?;
            entry.action.handle(&entry, &params, &ctx).await
        })
    })
}

fn base_decorate(weak: Weak<ActionEntry>) -> DecorateFn {
    Arc::new(move |doc, params, ctx| {
        let weak = weak.clone();
        Box::pin(async move {
            let entry = upgrade(&weak)?;
            entry.action.decorate(&entry, doc, &params, &ctx).await
        })
    })
}

fn base_joins(weak: Weak<ActionEntry>) -> JoinsFn {
    Arc::new(move |params, ctx| {
        let weak = weak.clone();
        Box::pin(async move {
            let entry = upgrade(&weak)?;
            entry.action.joins(&entry, &params, &ctx).await
        })
    })
}

fn base_schema(weak: Weak<ActionEntry>) -> SchemaFn {
    Arc::new(move |params, ctx| {
        let weak = weak.clone();
        Box::pin(async move {
            let entry = upgrade(&weak)?;
            entry.action.schema(&entry, &params, &ctx).await
        })
    })
}

fn base_embed_item(weak: Weak<ActionEntry>) -> EmbedItemFn {
    Arc::new(move |item, params, ctx| {
        let weak = weak.clone();
        Box::pin(async move {
            let entry = upgrade(&weak)?;
            entry.action.embed_item(&entry, item, &params, &ctx).await
        })
    })
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting actions and filters
    Building,

    /// Filters applied; composition is final
    Frozen,
}

/// Holds every registered action and pending filter. Two-phase: all
/// registration happens while `Building`, then `apply_filters` runs the
/// whole composition once and the registry freezes.
pub struct Registry {
    entries: Vec<Arc<ActionEntry>>,
    filters: Vec<Arc<Filter>>,
    sources: Vec<Arc<dyn Source>>,
    phase: Phase,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            entries: Vec::new(),
            filters: Vec::new(),
            sources: Vec::new(),
            phase: Phase::Building,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn entries(&self) -> &[Arc<ActionEntry>] {
        &self.entries
    }

    /// Every distinct source seen across registered resources.
    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    fn ensure_building(&self) -> Result<(), Error> {
        match self.phase {
            Phase::Building => Ok(()),
            Phase::Frozen => Err(Error::Configuration(
                "registry is frozen; register actions and filters before the server starts"
                    .to_string(),
            )),
        }
    }

    /// Register an action and collect the filters it contributes.
    /// Registering the same action instance twice is a no-op.
    pub fn register_action(&mut self, action: Arc<dyn Action>) -> Result<Arc<ActionEntry>, Error> {
        self.ensure_building()?;

        if let Some(existing) = self
            .entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.action, &action))
        {
            return Ok(existing.clone());
        }

        let entry = ActionEntry::new(action.clone());
        self.entries.push(entry.clone());

        if let Some(resource) = action.resource() {
            let source = resource.source.clone();
            if !self.sources.iter().any(|seen| Arc::ptr_eq(seen, &source)) {
                self.sources.push(source);
            }
        }

        for filter in action.clone().filters() {
            self.register_filter(filter)?;
        }

        Ok(entry)
    }

    /// Queue a filter for freeze time. Registering the same filter
    /// instance twice is a no-op.
    pub fn register_filter(&mut self, filter: Arc<Filter>) -> Result<(), Error> {
        self.ensure_building()?;

        if !self.filters.iter().any(|seen| Arc::ptr_eq(seen, &filter)) {
            self.filters.push(filter);
        }

        Ok(())
    }

    /// Entries whose action matches any of `kinds` and the predicate.
    pub fn find(&self, kinds: &[ActionKind], predicate: Option<&Predicate>) -> Vec<Arc<ActionEntry>> {
        self.entries
            .iter()
            .filter(|entry| kinds.contains(&entry.action.kind()))
            .filter(|entry| predicate.is_none_or(|check| check(entry.action.as_ref())))
            .cloned()
            .collect()
    }

    /// The entry for `kind` bound to the named resource, if registered.
    pub fn entry_of(&self, kind: ActionKind, resource: &str) -> Option<Arc<ActionEntry>> {
        self.entries
            .iter()
            .find(|entry| {
                entry.action.kind() == kind && entry.action.resource_name() == Some(resource)
            })
            .cloned()
    }

    /// Apply every queued filter in registration order and freeze. A
    /// filter matching no action is a no-op, which lets actions target
    /// optional siblings unconditionally.
    pub fn apply_filters(&mut self) -> Result<(), Error> {
        self.ensure_building()?;

        let filters = std::mem::take(&mut self.filters);
        for filter in &filters {
            let matched = self.find(&filter.kinds, filter.predicate.as_ref());
            if matched.is_empty() {
                tracing::debug!(
                    method = filter.wrap.method_name(),
                    "filter matched no registered action"
                );
            }
            for entry in matched {
                entry.apply(&filter.wrap, self)?;
            }
        }
        self.filters = filters;

        self.phase = Phase::Frozen;
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
