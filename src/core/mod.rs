//! Core building blocks: documents, resources, schemas, query shapes,
//! the `Source` boundary and the error taxonomy

pub mod auth;
pub mod document;
pub mod error;
pub mod params;
pub mod query;
pub mod resource;
pub mod schema;
pub mod source;
pub mod uri;

pub use auth::{AuthOutcome, AuthProvider, NoAuthProvider};
pub use document::{Document, Embed, Form, Link, Properties};
pub use error::{Error, ValidationFailure};
pub use params::Params;
pub use resource::{Relationship, Resource};
pub use schema::Schema;
pub use source::{Collection, Item, ReadOutcome, Source, SourceError};
