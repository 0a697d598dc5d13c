//! Builders declaring controller metadata into a [`Reflector`].
//!
//! ```
//! use micro_dispatch::{DispatchError, ParamBinding, ParseIntPipe, Reflector, guard_fn, handler_fn};
//! use serde_json::json;
//!
//! struct UserController;
//!
//! let mut reflector = Reflector::new();
//! let users = reflector
//!     .controller::<UserController>("users")
//!     .use_guards([guard_fn(|_, http| http.header("x-token").is_some()).into()])
//!     .method(
//!         "show",
//!         handler_fn(|_, args| async move {
//!             let id: u64 = args.parse(0)?;
//!             Ok::<_, DispatchError>(json!({ "id": id }))
//!         }),
//!         |m| m.get("/:id").param(ParamBinding::param(0).select("id").pipe(ParseIntPipe)),
//!     )
//!     .finish();
//! ```

use crate::component::Component;
use crate::context::TypeKey;
use crate::handler::TargetHandler;
use crate::metadata::{ControllerPath, MetadataKind, MetadataValue, Reflector};
use crate::param::ParamBinding;
use crate::response::HeaderDecl;
use crate::route::Verb;
use http::StatusCode;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Prepends the missing leading `/`.
pub(crate) fn validate_path(path: &str) -> String {
    if path.starts_with('/') { path.to_owned() } else { format!("/{path}") }
}

/// Declares the class level metadata and the methods of one controller.
pub struct ControllerDecl<'r> {
    reflector: &'r mut Reflector,
    class: TypeKey,
    methods: Vec<(String, Arc<dyn TargetHandler>)>,
}

impl<'r> ControllerDecl<'r> {
    pub(crate) fn new(reflector: &'r mut Reflector, class: TypeKey, prefix: &str) -> Self {
        let path = ControllerPath { prefix: validate_path(prefix), name: None, restful: false };
        reflector.set_class_metadata(MetadataKind::Path, class, MetadataValue::Controller(path));
        Self { reflector, class, methods: vec![] }
    }

    /// A RESTful resource: methods named after REST verbs get their conventional routes.
    /// The prefix defaults to the resource name.
    pub(crate) fn resources(reflector: &'r mut Reflector, class: TypeKey, name: &str, prefix: Option<&str>) -> Self {
        let path = ControllerPath {
            prefix: validate_path(prefix.unwrap_or(name)),
            name: Some(name.strip_prefix('/').unwrap_or(name).to_owned()),
            restful: true,
        };
        reflector.set_class_metadata(MetadataKind::Path, class, MetadataValue::Controller(path));
        Self { reflector, class, methods: vec![] }
    }

    fn set(self, kind: MetadataKind, value: MetadataValue) -> Self {
        self.reflector.set_class_metadata(kind, self.class, value);
        self
    }

    pub fn use_guards(self, guards: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Guards, MetadataValue::Components(guards.into_iter().collect()))
    }

    pub fn use_pipes(self, pipes: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Pipes, MetadataValue::Components(pipes.into_iter().collect()))
    }

    pub fn use_interceptors(self, interceptors: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Interceptors, MetadataValue::Components(interceptors.into_iter().collect()))
    }

    pub fn use_filters(self, filters: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Filters, MetadataValue::Components(filters.into_iter().collect()))
    }

    /// Custom metadata, readable through [`ExecutionContext::get_metadata`](crate::ExecutionContext::get_metadata).
    pub fn set_metadata(self, key: impl Into<String>, value: Value) -> Self {
        self.set(MetadataKind::Custom(key.into()), MetadataValue::Custom(value))
    }

    /// Declares the method `name`, served by `handler`.
    pub fn method<H, F>(mut self, name: &str, handler: H, declare: F) -> Self
    where
        H: TargetHandler + 'static,
        F: FnOnce(MethodDecl) -> MethodDecl,
    {
        declare(MethodDecl::default()).apply(self.reflector, self.class, name);
        self.methods.push((name.to_owned(), Arc::new(handler)));
        self
    }

    pub fn finish(self) -> ControllerDef {
        ControllerDef { class: self.class, methods: self.methods }
    }
}

impl Debug for ControllerDecl<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDecl").field("class", &self.class.name()).field("methods", &self.methods.len()).finish()
    }
}

/// A declared controller: its type and the handlers of its methods, in declaration order.
#[derive(Clone)]
pub struct ControllerDef {
    class: TypeKey,
    methods: Vec<(String, Arc<dyn TargetHandler>)>,
}

impl ControllerDef {
    pub fn class(&self) -> TypeKey {
        self.class
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &Arc<dyn TargetHandler>)> {
        self.methods.iter().map(|(name, handler)| (name.as_str(), handler))
    }
}

impl Debug for ControllerDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.methods.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ControllerDef").field("class", &self.class.name()).field("methods", &names).finish()
    }
}

/// Method level metadata, written to the registry when the method is declared.
#[derive(Debug, Default)]
pub struct MethodDecl {
    entries: Vec<(MetadataKind, MetadataValue)>,
    headers: Vec<HeaderDecl>,
    bindings: Vec<ParamBinding>,
}

impl MethodDecl {
    fn set(mut self, kind: MetadataKind, value: MetadataValue) -> Self {
        self.entries.push((kind, value));
        self
    }

    /// Maps the method to `verb` on `path`; an empty path maps to `/`.
    pub fn route(self, verb: Verb, path: &str) -> Self {
        self.set(MetadataKind::Path, MetadataValue::Path(validate_path(path))).set(MetadataKind::Method, MetadataValue::Verb(verb))
    }

    pub fn get(self, path: &str) -> Self {
        self.route(Verb::Get, path)
    }

    pub fn post(self, path: &str) -> Self {
        self.route(Verb::Post, path)
    }

    pub fn put(self, path: &str) -> Self {
        self.route(Verb::Put, path)
    }

    pub fn delete(self, path: &str) -> Self {
        self.route(Verb::Delete, path)
    }

    pub fn patch(self, path: &str) -> Self {
        self.route(Verb::Patch, path)
    }

    pub fn options(self, path: &str) -> Self {
        self.route(Verb::Options, path)
    }

    pub fn head(self, path: &str) -> Self {
        self.route(Verb::Head, path)
    }

    pub fn all(self, path: &str) -> Self {
        self.route(Verb::All, path)
    }

    /// Names the route.
    pub fn name(self, name: impl Into<String>) -> Self {
        self.set(MetadataKind::RouteName, MetadataValue::RouteName(name.into()))
    }

    pub fn use_guards(self, guards: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Guards, MetadataValue::Components(guards.into_iter().collect()))
    }

    pub fn use_pipes(self, pipes: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Pipes, MetadataValue::Components(pipes.into_iter().collect()))
    }

    pub fn use_interceptors(self, interceptors: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Interceptors, MetadataValue::Components(interceptors.into_iter().collect()))
    }

    pub fn use_filters(self, filters: impl IntoIterator<Item = Component>) -> Self {
        self.set(MetadataKind::Filters, MetadataValue::Components(filters.into_iter().collect()))
    }

    /// Overrides the status written with a present result.
    pub fn http_code(self, status: StatusCode) -> Self {
        self.set(MetadataKind::HttpCode, MetadataValue::HttpCode(status))
    }

    pub fn render(self, template: impl Into<String>) -> Self {
        self.set(MetadataKind::Render, MetadataValue::Render(template.into()))
    }

    /// Sets a static response header. Declarations accumulate.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderDecl::set(name, value));
        self
    }

    /// Removes a response header.
    pub fn clear_header(mut self, name: impl Into<String>) -> Self {
        self.headers.push(HeaderDecl::clear(name));
        self
    }

    pub fn param(mut self, binding: ParamBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// The declared types of the positional parameters, `None` when undeclared.
    pub fn param_types<I, S>(self, types: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let types = types.into_iter().map(|ty| ty.map(Into::into)).collect();
        self.set(MetadataKind::ParamTypes, MetadataValue::ParamTypes(types))
    }

    pub fn set_metadata(self, key: impl Into<String>, value: Value) -> Self {
        self.set(MetadataKind::Custom(key.into()), MetadataValue::Custom(value))
    }

    fn apply(self, reflector: &mut Reflector, class: TypeKey, method: &str) {
        for (kind, value) in self.entries {
            reflector.set_method_metadata(kind, class, method, value);
        }
        if !self.headers.is_empty() {
            reflector.set_method_metadata(MetadataKind::Headers, class, method, MetadataValue::Headers(self.headers));
        }
        if !self.bindings.is_empty() {
            reflector.set_method_metadata(MetadataKind::RouteArgs, class, method, MetadataValue::RouteArgs(self.bindings));
        }
    }
}
