//! Route descriptors and the composed per-route handler.
//!
//! [`RouteHandler::build`] reads the metadata of one controller method once and assembles every
//! stage of the pipeline. Per request [`RouteHandler::handle`] then runs
//!
//! ```text
//! guards -> interceptors( params + pipes -> target ) -> finalizer
//! ```
//!
//! with the exception dispatcher wrapped around the whole sequence.

use crate::component::{Capability, Component, assemble};
use crate::context::{ExecutionContext, HttpContext, TypeKey};
use crate::error::{BuildError, DispatchResult};
use crate::exception::ExceptionDispatcher;
use crate::guard::GuardChain;
use crate::handler::TargetHandler;
use crate::interceptor::{Deferred, InterceptorChain};
use crate::metadata::{MetadataKind, MetadataValue, Reflector};
use crate::param::ParamResolver;
use crate::response::{Renderer, ResponseFinalizer};
use http::Method;
use serde_json::Value;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
    /// Matches every method
    All,
}

impl Verb {
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Verb::Get => method == Method::GET,
            Verb::Post => method == Method::POST,
            Verb::Put => method == Method::PUT,
            Verb::Delete => method == Method::DELETE,
            Verb::Patch => method == Method::PATCH,
            Verb::Options => method == Method::OPTIONS,
            Verb::Head => method == Method::HEAD,
            Verb::All => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Patch => "PATCH",
            Verb::Options => "OPTIONS",
            Verb::Head => "HEAD",
            Verb::All => "ALL",
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The conventional route of a RESTful resource method, `None` for other method names.
pub fn rest_route(method: &str) -> Option<(Verb, &'static str)> {
    let route = match method {
        "index" => (Verb::Get, "/"),
        "new" => (Verb::Get, "/new"),
        "show" => (Verb::Get, "/:id"),
        "edit" => (Verb::Get, "/:id/edit"),
        "create" => (Verb::Post, "/"),
        "update" => (Verb::Put, "/:id"),
        "destroy" => (Verb::Delete, "/:id"),
        _ => return None,
    };
    Some(route)
}

/// One discovered route: which controller method serves which verb and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub controller: TypeKey,
    pub method: String,
    /// The full path, controller prefix included
    pub path: String,
    pub verb: Verb,
    pub name: Option<String>,
}

/// The composed handler of one route.
pub struct RouteHandler {
    descriptor: RouteDescriptor,
    context: ExecutionContext,
    guards: Option<GuardChain>,
    params: Arc<ParamResolver>,
    interceptors: Option<InterceptorChain>,
    target: Arc<dyn TargetHandler>,
    exceptions: ExceptionDispatcher,
    finalizer: ResponseFinalizer,
}

impl RouteHandler {
    /// Assembles every stage of the route from the metadata of its controller method.
    pub fn build(
        reflector: &Arc<Reflector>,
        descriptor: RouteDescriptor,
        target: Arc<dyn TargetHandler>,
        renderer: Option<&Arc<dyn Renderer>>,
    ) -> Result<Self, BuildError> {
        let class = descriptor.controller;
        let method = descriptor.method.as_str();
        let context = ExecutionContext::new(class, method, Arc::clone(reflector));

        let guards = assemble(reflector, class, method, &MetadataKind::Guards, Capability::CanActivate, Component::to_guard);
        let pipes = assemble(reflector, class, method, &MetadataKind::Pipes, Capability::Transform, Component::to_pipe);
        let interceptors =
            assemble(reflector, class, method, &MetadataKind::Interceptors, Capability::Intercept, Component::to_interceptor);
        let filters = assemble(reflector, class, method, &MetadataKind::Filters, Capability::Catch, Component::to_filter);

        let bindings = reflector
            .get_method_metadata(&MetadataKind::RouteArgs, class, method)
            .and_then(MetadataValue::as_route_args)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let param_types = reflector
            .get_method_metadata(&MetadataKind::ParamTypes, class, method)
            .and_then(MetadataValue::as_param_types)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let params = ParamResolver::build(class, method, bindings, param_types, &pipes)?;
        let finalizer = ResponseFinalizer::from_metadata(reflector, class, method, descriptor.verb, renderer)?;

        Ok(Self {
            guards: GuardChain::new(guards, context.clone()),
            interceptors: InterceptorChain::new(interceptors, context.clone()),
            params: Arc::new(params),
            exceptions: ExceptionDispatcher::new(filters),
            descriptor,
            context,
            target,
            finalizer,
        })
    }

    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Runs the route against one request.
    ///
    /// Any failure of the pipeline is handed to the exception filters exactly once. The returned
    /// error is reserved for failures no filter could recover from.
    pub async fn handle(&self, http: &Arc<HttpContext>) -> DispatchResult<()> {
        match self.execute(http).await {
            Ok(()) => Ok(()),
            Err(e) => self.exceptions.dispatch(e, http).await,
        }
    }

    async fn execute(&self, http: &Arc<HttpContext>) -> DispatchResult<()> {
        if let Some(guards) = &self.guards {
            guards.can_activate(http).await?;
        }

        let proceed = proceed(Arc::clone(&self.params), Arc::clone(&self.target), Arc::clone(http));
        let result = match &self.interceptors {
            Some(interceptors) => interceptors.intercept(http, Deferred::new(proceed)).await?,
            None => proceed.await?,
        };

        self.finalizer.finalize(result, http).await
    }
}

/// Resolves the arguments, invokes the target and settles its reply.
async fn proceed(
    params: Arc<ParamResolver>,
    target: Arc<dyn TargetHandler>,
    http: Arc<HttpContext>,
) -> DispatchResult<Option<Value>> {
    let args = params.resolve(&http).await?;
    target.invoke(http, args).await?.settle().await
}

impl Debug for RouteHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandler")
            .field("descriptor", &self.descriptor)
            .field("guards", &self.guards)
            .field("params", &self.params)
            .field("interceptors", &self.interceptors)
            .field("exceptions", &self.exceptions)
            .field("finalizer", &self.finalizer)
            .finish()
    }
}
