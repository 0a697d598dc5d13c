//! The route table: composed route handlers keyed by path and selected by verb.

mod discovery;

pub use discovery::scan_controller;

use crate::context::{HttpContext, HttpRequest};
use crate::error::{BuildError, DispatchResult};
use crate::metadata::{ControllerDef, Reflector};
use crate::response::Renderer;
use crate::route::{RouteDescriptor, RouteHandler};
use http::Method;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{info, warn};

type InnerRouter<T> = matchit::Router<T>;

pub struct Router {
    inner_router: InnerRouter<Vec<RouteHandler>>,
    routes: Vec<RouteDescriptor>,
}

/// A matched route and the path parameters it captured.
pub struct RouteMatch<'router> {
    handler: &'router RouteHandler,
    params: Map<String, Value>,
}

impl<'router> RouteMatch<'router> {
    pub fn handler(&self) -> &'router RouteHandler {
        self.handler
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

impl Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch").field("route", self.handler.descriptor()).field("params", &self.params).finish()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Finds the handler serving `method` on `path`.
    pub fn at(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let matched = self.inner_router.at(path).ok()?;
        let handler = matched.value.iter().find(|handler| handler.descriptor().verb.matches(method))?;
        let params = matched.params.iter().map(|(key, value)| (key.to_owned(), Value::String(decode_param(value)))).collect();
        Some(RouteMatch { handler, params })
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn route_named(&self, name: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|route| route.name.as_deref() == Some(name))
    }

    pub async fn handle(&self, request: HttpRequest) -> DispatchResult<Arc<HttpContext>> {
        self.handle_with_session(request, Value::Object(Map::new())).await
    }

    /// Dispatches one request and returns its context, holding the response to write out.
    ///
    /// Unmatched requests keep the default `404 Not Found` response. An error means the response
    /// could not be produced at all.
    pub async fn handle_with_session(&self, request: HttpRequest, session: Value) -> DispatchResult<Arc<HttpContext>> {
        let Some(matched) = self.at(request.method(), request.uri().path()) else {
            warn!(method = %request.method(), path = request.uri().path(), "no route matched");
            return Ok(Arc::new(HttpContext::new(request).with_session(session)));
        };

        let http = Arc::new(HttpContext::new(request).with_params(matched.params).with_session(session));
        matched.handler.handle(&http).await?;
        Ok(http)
    }
}

impl Debug for Router {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes).finish()
    }
}

pub struct RouterBuilder {
    reflector: Arc<Reflector>,
    renderer: Option<Arc<dyn Renderer>>,
    controllers: Vec<ControllerDef>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { reflector: Arc::default(), renderer: None, controllers: vec![] }
    }

    /// The registry the controllers were declared in.
    pub fn reflector(mut self, reflector: impl Into<Arc<Reflector>>) -> Self {
        self.reflector = reflector.into();
        self
    }

    pub fn renderer<R: Renderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn controller(mut self, controller: ControllerDef) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Discovers the routes of every controller and composes their handlers.
    pub fn build(self) -> Result<Router, BuildError> {
        let mut data: HashMap<String, Vec<RouteHandler>> = HashMap::new();
        let mut routes = vec![];

        for controller in &self.controllers {
            for (descriptor, target) in scan_controller(&self.reflector, controller) {
                let handler = RouteHandler::build(&self.reflector, descriptor.clone(), target, self.renderer.as_ref())?;
                info!(verb = %descriptor.verb, path = %descriptor.path, handler = %descriptor.method, "route registered");
                data.entry(matchit_path(&descriptor.path)).or_default().push(handler);
                routes.push(descriptor);
            }
        }

        let mut inner_router = InnerRouter::new();
        for (path, handlers) in data {
            inner_router.insert(path.clone(), handlers).map_err(|source| BuildError::Route { path, source })?;
        }

        Ok(Router { inner_router, routes })
    }
}

impl Debug for RouterBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("renderer", &self.renderer.is_some())
            .field("controllers", &self.controllers)
            .finish()
    }
}

/// Percent-decodes a captured path segment, keeping the raw text when it is not valid UTF-8.
fn decode_param(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_owned(), Cow::into_owned)
}

/// Rewrites `:name` and `*name` segments into the matcher's `{name}` and `{*name}` syntax.
fn matchit_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
