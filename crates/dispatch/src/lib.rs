//! Metadata driven request dispatch.
//!
//! Controller methods are declared into a [`Reflector`] together with their routing,
//! authorization, validation and transformation metadata. Building a [`Router`] composes one
//! [`RouteHandler`] per method:
//!
//! - [`GuardChain`]: sequential authorization, the first denial answers `403 Forbidden`
//! - [`ParamResolver`] and [`PipeChain`]: concurrent argument extraction and transformation
//! - [`InterceptorChain`]: around advice over the target invocation
//! - [`ExceptionDispatcher`]: routes every failure to one exception filter or the default handler
//! - [`ResponseFinalizer`]: static headers, status code and payload or rendered template

mod component;
mod context;
mod error;
mod exception;
mod guard;
mod handler;
mod param;
mod pipe;
mod response;
mod route;

pub mod interceptor;
pub mod metadata;
pub mod router;

pub use component::{Capability, Component};
pub use context::{ExecutionContext, HttpContext, HttpRequest, HttpResponse, TypeKey, UploadedFile};
pub use error::{BoxError, BuildError, DispatchError, DispatchResult, ExceptionKind, HttpException};
pub use exception::{ExceptionDispatcher, ExceptionFilter, FilterRef, async_filter_fn, default_handler, filter_fn};
pub use guard::{Guard, GuardChain, GuardRef, async_guard_fn, guard_fn};
pub use handler::{FnHandler, IntoReply, Json, Reply, TargetHandler, handler_fn};
pub use interceptor::{Deferred, Interceptor, InterceptorChain, InterceptorRef, interceptor_fn};
pub use metadata::{ControllerDecl, ControllerDef, MetadataKind, MetadataValue, MethodDecl, Reflector};
pub use param::{Arg, Args, ArgumentMetadata, ParamBinding, ParamKind, ParamResolver};
pub use pipe::{
    DefaultValuePipe, ParseBoolPipe, ParseFloatPipe, ParseIntPipe, Pipe, PipeChain, PipeRef, async_pipe_fn, pipe_fn,
};
pub use response::{HeaderDecl, Renderer, ResponseFinalizer, default_status};
pub use route::{RouteDescriptor, RouteHandler, Verb, rest_route};
pub use router::{RouteMatch, Router, RouterBuilder};
