//! The API root: an empty document other actions decorate with
//! discovery links and forms

use async_trait::async_trait;
use axum::http::Method;
use std::sync::Arc;

use crate::action::{Action, ActionKind, Context, Outcome, RoutePath};
use crate::core::document::Properties;
use crate::core::error::Error;
use crate::core::params::Params;
use crate::registry::ActionEntry;

/// `GET /`. Handles to an empty document; every link and form it serves
/// arrives through decorate filters contributed by registered actions,
/// so the discovery document always reflects exactly what is mounted.
pub struct Root {
    path: RoutePath,
}

impl Root {
    pub fn new() -> Arc<Self> {
        Arc::new(Root {
            path: RoutePath::new(""),
        })
    }
}

#[async_trait]
impl Action for Root {
    fn kind(&self) -> ActionKind {
        ActionKind::Root
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

    async fn handle(
        &self,
        _entry: &ActionEntry,
        _params: &Params,
        _ctx: &Context,
    ) -> Result<Outcome, Error> {
        Ok(Outcome::Properties(Properties::new()))
    }
}
