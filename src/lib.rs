//! # Refract
//!
//! A hypermedia REST framework: declare resources, get a discoverable
//! HAL+JSON API.
//!
//! ## Features
//!
//! - **Aspect-Oriented Composition**: Actions publish filters that wrap
//!   methods on sibling actions through a central registry
//! - **Built-in CRUD**: Root discovery plus read/create/update/delete
//!   actions generated per resource
//! - **Hypermedia Documents**: Links, forms and embedded documents
//!   rendered as HAL+JSON with auth-aware visibility
//! - **Relationship Traversal**: Parents embed recursively, nested
//!   create payloads resolve bottom-up, foreign keys widen to accept
//!   full objects
//! - **Pluggable Storage**: Declarative query records executed behind
//!   the async `Source` boundary, with an in-memory backend included
//! - **Structured Errors**: Validation and constraint failures rendered
//!   as field-level 422 responses
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use refract::prelude::*;
//!
//! let source = Arc::new(InMemorySource::new());
//!
//! let users = Resource::new("users", users_schema, source.clone())
//!     .has(Relationship::new("tasks", "id", "owner"));
//! let tasks = Resource::new("tasks", tasks_schema, source)
//!     .belongs_to(Relationship::new("users", "owner", "id"));
//!
//! let mut plugin = Plugin::new(Options::default())
//!     .with_auth_provider(Arc::new(NoAuthProvider));
//! plugin.register_resource(users)?;
//! plugin.register_resource(tasks)?;
//!
//! let router = plugin.build()?;
//! axum::serve(listener, router).await?;
//! ```

pub mod action;
pub mod core;
pub mod filter;
pub mod plugin;
pub mod registry;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthOutcome, AuthProvider, NoAuthProvider},
        document::{Document, Embed, Form, Link, Properties},
        error::{Error, ValidationFailure},
        params::Params,
        query::{Condition, Join, Order, Page},
        resource::{Relationship, Resource},
        schema::Schema,
        source::{Collection, Item, ReadOutcome, Source, SourceError},
    };

    // === Actions ===
    pub use crate::action::{
        Action, ActionKind, Context, CreateItem, DeleteItem, Outcome, RawResponse,
        ReadCollection, ReadItem, RequestContext, Root, UpdateItem,
    };

    // === Composition ===
    pub use crate::filter::Filter;
    pub use crate::plugin::{Options, Plugin};
    pub use crate::registry::{ActionEntry, Registry};

    // === Storage ===
    pub use crate::storage::InMemorySource;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use axum::Router;
    pub use serde_json::{json, Map, Value};
    pub use std::sync::Arc;
}
