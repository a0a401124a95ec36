//! The `Document` hypermedia tree and its HAL+JSON renderer
//!
//! A `Document` accumulates properties, embedded sub-documents, links
//! and forms while an action's decorate chain runs, then renders once
//! into the `_embedded`/`_links`/`_forms` HAL layout.

use serde_json::{Map, Value};

use crate::core::auth::AuthOutcome;
use crate::core::schema::Schema;
use crate::core::uri;

/// The property state of a document, typically real keys and values
/// returned from a resource query.
pub type Properties = Map<String, Value>;

/// A document embedded within a document, usually a parent inferred
/// from a resource relationship or an item of a collection.
#[derive(Debug)]
pub struct Embed {
    /// Key under `_embedded` where the child renders. Multiple embeds
    /// sharing a rel render as an array.
    pub rel: String,

    pub document: Document,

    /// Force array rendering even for a single embed, so one-item
    /// collections keep the collection shape.
    pub always_array: bool,
}

/// A hyperlink to another document.
#[derive(Debug, Clone, Default)]
pub struct Link {
    /// Key under `_links` where this link renders
    pub rel: String,

    /// A URI or URI template
    pub href: String,

    /// Disambiguates multiple links sharing a rel
    pub name: Option<String>,

    /// Values used to fill `href` when it is a template; left unset,
    /// the link renders with `templated: true` for the client to fill.
    pub params: Option<Map<String, Value>>,

    /// Render for unauthenticated requests when `true`
    pub public: Option<bool>,

    /// Hide from authenticated requests when `false`
    pub private: Option<bool>,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Link {
            rel: rel.into(),
            href: href.into(),
            ..Link::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn public(mut self) -> Self {
        self.public = Some(true);
        self
    }
}

/// A form control used to mutate documents: a link plus an HTTP method
/// and the schema a request body must satisfy.
#[derive(Debug, Clone)]
pub struct Form {
    pub rel: String,
    pub href: String,
    pub name: Option<String>,
    pub params: Option<Map<String, Value>>,
    pub public: Option<bool>,
    pub private: Option<bool>,
    pub method: String,
    pub schema: Option<Schema>,
}

impl Form {
    pub fn new(rel: impl Into<String>, href: impl Into<String>, method: impl Into<String>) -> Self {
        Form {
            rel: rel.into(),
            href: href.into(),
            name: None,
            params: None,
            public: None,
            private: None,
            method: method.into(),
            schema: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }
}

/// Container for properties, embeds, links and forms; renders once per
/// request into a HAL document.
#[derive(Debug, Default)]
pub struct Document {
    pub properties: Properties,
    pub embedded: Vec<Embed>,
    pub links: Vec<Link>,
    pub forms: Vec<Form>,
}

impl Document {
    pub fn new(properties: Properties) -> Self {
        Document {
            properties,
            ..Document::default()
        }
    }

    /// Render to a HAL document. Embedded documents render recursively;
    /// links and forms are filtered by visibility against the request's
    /// authentication outcome.
    pub fn render(&self, auth: &AuthOutcome) -> Value {
        let mut result = self.properties.clone();

        for embed in &self.embedded {
            let rendered = embed.document.render(auth);
            upsert(&mut result, "_embedded", &embed.rel, rendered, embed.always_array);
        }

        for link in &self.links {
            if is_visible(auth, link.public, link.private) {
                upsert(&mut result, "_links", &link.rel, render_link(link), false);
            }
        }

        for form in &self.forms {
            if is_visible(auth, form.public, form.private) {
                upsert(&mut result, "_forms", &form.rel, render_form(form), false);
            }
        }

        Value::Object(result)
    }
}

/// A link or form with `public: true` is visible to unauthenticated
/// requests; `private: false` hides it from authenticated ones.
fn is_visible(auth: &AuthOutcome, public: Option<bool>, private: Option<bool>) -> bool {
    if auth.is_authenticated() {
        private != Some(false)
    } else {
        public == Some(true)
    }
}

/// Render a link. Non-templated hrefs pass through; templated hrefs
/// without params are marked `templated: true`; templated hrefs with
/// params are filled into a concrete URI.
fn render_link(link: &Link) -> Value {
    let mut rendered = Map::new();

    if uri::is_templated(&link.href) {
        match &link.params {
            Some(params) => {
                rendered.insert("href".to_string(), Value::String(uri::expand(&link.href, params)));
            }
            None => {
                rendered.insert("href".to_string(), Value::String(link.href.clone()));
                rendered.insert("templated".to_string(), Value::Bool(true));
            }
        }
    } else {
        rendered.insert("href".to_string(), Value::String(link.href.clone()));
    }

    if let Some(name) = &link.name {
        rendered.insert("name".to_string(), Value::String(name.clone()));
    }

    rendered.into()
}

/// Render a form: link rendering plus `method` and `schema`.
fn render_form(form: &Form) -> Value {
    let link = Link {
        rel: form.rel.clone(),
        href: form.href.clone(),
        name: form.name.clone(),
        params: form.params.clone(),
        public: form.public,
        private: form.private,
    };

    let mut rendered = match render_link(&link) {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    rendered.insert("method".to_string(), Value::String(form.method.clone()));

    if let Some(schema) = &form.schema {
        if let Ok(schema) = serde_json::to_value(schema) {
            rendered.insert("schema".to_string(), schema);
        }
    }

    rendered.into()
}

/// Upsert `value` under `container[key][name]`: create the slot when
/// absent, convert an existing scalar to a two-element array, append to
/// an existing array. `always_array` wraps the first write.
fn upsert(container: &mut Properties, key: &str, name: &str, value: Value, always_array: bool) {
    let initial = |value: Value| {
        if always_array {
            Value::Array(vec![value])
        } else {
            value
        }
    };

    let Some(bucket) = container.get_mut(key).and_then(Value::as_object_mut) else {
        let mut bucket = Map::new();
        bucket.insert(name.to_string(), initial(value));
        container.insert(key.to_string(), Value::Object(bucket));
        return;
    };

    match bucket.get_mut(name) {
        None => {
            bucket.insert(name.to_string(), initial(value));
        }
        Some(Value::Array(existing)) => {
            existing.push(value);
        }
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_render_properties_pass_through() {
        let doc = Document::new(props(json!({"id": 1, "title": "write docs"})));
        let rendered = doc.render(&AuthOutcome::Granted);

        assert_eq!(rendered["id"], 1);
        assert_eq!(rendered["title"], "write docs");
        assert!(rendered.get("_links").is_none());
    }

    #[test]
    fn test_two_links_same_rel_become_array_in_order() {
        let mut doc = Document::new(Properties::new());
        doc.links.push(Link::new("tasks", "/tasks/1"));
        doc.links.push(Link::new("tasks", "/tasks/2"));

        let rendered = doc.render(&AuthOutcome::Granted);
        let links = rendered["_links"]["tasks"].as_array().expect("array of links");

        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["href"], "/tasks/1");
        assert_eq!(links[1]["href"], "/tasks/2");
    }

    #[test]
    fn test_single_embed_always_array_renders_one_element_array() {
        let mut doc = Document::new(Properties::new());
        doc.embedded.push(Embed {
            rel: "tasks".to_string(),
            document: Document::new(props(json!({"id": 1}))),
            always_array: true,
        });

        let rendered = doc.render(&AuthOutcome::Granted);
        let embedded = rendered["_embedded"]["tasks"].as_array().expect("array");

        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0]["id"], 1);
    }

    #[test]
    fn test_single_embed_without_flag_renders_object() {
        let mut doc = Document::new(Properties::new());
        doc.embedded.push(Embed {
            rel: "users".to_string(),
            document: Document::new(props(json!({"id": 9}))),
            always_array: false,
        });

        let rendered = doc.render(&AuthOutcome::Granted);
        assert_eq!(rendered["_embedded"]["users"]["id"], 9);
    }

    #[test]
    fn test_templated_link_without_params() {
        let mut doc = Document::new(Properties::new());
        doc.links.push(Link::new("tasks", "/tasks/{id}"));

        let rendered = doc.render(&AuthOutcome::Granted);
        assert_eq!(rendered["_links"]["tasks"]["href"], "/tasks/{id}");
        assert_eq!(rendered["_links"]["tasks"]["templated"], true);
    }

    #[test]
    fn test_templated_link_with_params_is_filled() {
        let mut doc = Document::new(Properties::new());
        doc.links.push(
            Link::new("self", "/tasks/{id}").with_params(props(json!({"id": 7}))),
        );

        let rendered = doc.render(&AuthOutcome::Granted);
        assert_eq!(rendered["_links"]["self"]["href"], "/tasks/7");
        assert!(rendered["_links"]["self"].get("templated").is_none());
    }

    #[test]
    fn test_visibility_rules() {
        let mut doc = Document::new(Properties::new());
        doc.links.push(Link::new("open", "/open").public());
        doc.links.push(Link::new("member", "/member"));
        doc.links.push(Link {
            private: Some(false),
            ..Link::new("hidden", "/hidden")
        });

        let authed = doc.render(&AuthOutcome::Granted);
        assert!(authed["_links"].get("open").is_some());
        assert!(authed["_links"].get("member").is_some());
        assert!(authed["_links"].get("hidden").is_none());

        let anon = doc.render(&AuthOutcome::Denied);
        assert!(anon["_links"].get("open").is_some());
        assert!(anon["_links"].get("member").is_none());
        assert!(anon["_links"].get("hidden").is_none());
    }

    #[test]
    fn test_form_renders_method_and_schema() {
        let schema = Schema::object("tasks", props(json!({"title": {"type": "string"}})));
        let mut doc = Document::new(Properties::new());
        doc.forms.push(
            Form::new("tasks", "/tasks", "POST")
                .named("create")
                .with_schema(schema),
        );

        let rendered = doc.render(&AuthOutcome::Granted);
        let form = &rendered["_forms"]["tasks"];

        assert_eq!(form["href"], "/tasks");
        assert_eq!(form["method"], "POST");
        assert_eq!(form["name"], "create");
        assert_eq!(form["schema"]["properties"]["title"]["type"], "string");
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut doc = Document::new(props(json!({"b": 2, "a": 1})));
        doc.links.push(Link::new("self", "/x"));
        doc.links.push(Link::new("self", "/y"));

        let first = serde_json::to_string(&doc.render(&AuthOutcome::Granted)).unwrap();
        let second = serde_json::to_string(&doc.render(&AuthOutcome::Granted)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_does_not_mutate_properties() {
        let mut doc = Document::new(props(json!({"id": 1})));
        doc.links.push(Link::new("self", "/tasks/1"));

        doc.render(&AuthOutcome::Granted);
        assert_eq!(doc.properties.len(), 1);
        assert!(doc.properties.get("_links").is_none());
    }
}
