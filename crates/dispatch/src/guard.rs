//! Authorization guards evaluated before a route's handler.
//!
//! Guards run strictly in order. The first guard answering `false` stops the chain with a
//! `403 Forbidden` [`HttpException`]; a guard failing with an error propagates that error.

use crate::context::{ExecutionContext, HttpContext};
use crate::error::{DispatchResult, HttpException};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, ready};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, ctx: &ExecutionContext, http: &Arc<HttpContext>) -> DispatchResult<bool>;
}

pub type GuardFn = Arc<dyn Fn(ExecutionContext, Arc<HttpContext>) -> BoxFuture<'static, DispatchResult<bool>> + Send + Sync>;

/// A declared guard: a bare function or an object implementing [`Guard`].
#[derive(Clone)]
pub enum GuardRef {
    Function(GuardFn),
    Object(Arc<dyn Guard>),
}

impl GuardRef {
    pub(crate) fn resolve(&self) -> Arc<dyn Guard> {
        match self {
            GuardRef::Function(f) => Arc::new(FnGuard(Arc::clone(f))),
            GuardRef::Object(guard) => Arc::clone(guard),
        }
    }
}

impl Debug for GuardRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardRef::Function(_) => f.write_str("GuardRef::Function"),
            GuardRef::Object(_) => f.write_str("GuardRef::Object"),
        }
    }
}

struct FnGuard(GuardFn);

#[async_trait]
impl Guard for FnGuard {
    async fn can_activate(&self, ctx: &ExecutionContext, http: &Arc<HttpContext>) -> DispatchResult<bool> {
        (self.0)(ctx.clone(), Arc::clone(http)).await
    }
}

/// Creates a guard from a synchronous predicate.
pub fn guard_fn<F>(f: F) -> GuardRef
where
    F: Fn(&ExecutionContext, &HttpContext) -> bool + Send + Sync + 'static,
{
    GuardRef::Function(Arc::new(move |ctx: ExecutionContext, http: Arc<HttpContext>| {
        let allowed: DispatchResult<bool> = Ok(f(&ctx, http.as_ref()));
        ready(allowed).boxed()
    }))
}

/// Creates a guard from an async predicate.
pub fn async_guard_fn<F, Fut>(f: F) -> GuardRef
where
    F: Fn(ExecutionContext, Arc<HttpContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<bool>> + Send + 'static,
{
    GuardRef::Function(Arc::new(move |ctx: ExecutionContext, http: Arc<HttpContext>| f(ctx, http).boxed()))
}

/// The guards of one route, class level first.
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
    context: ExecutionContext,
}

impl GuardChain {
    /// Returns `None` for an empty list, so routes without guards skip the step entirely.
    pub fn new(guards: Vec<Arc<dyn Guard>>, context: ExecutionContext) -> Option<Self> {
        if guards.is_empty() {
            return None;
        }
        Some(Self { guards, context })
    }

    pub async fn can_activate(&self, http: &Arc<HttpContext>) -> DispatchResult<()> {
        for (position, guard) in self.guards.iter().enumerate() {
            if !guard.can_activate(&self.context, http).await? {
                debug!(handler = self.context.get_handler(), position, "guard denied access");
                return Err(HttpException::forbidden("Forbidden resource").into());
            }
        }
        Ok(())
    }
}

impl Debug for GuardChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardChain").field("len", &self.guards.len()).field("context", &self.context).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HttpRequest, TypeKey};
    use crate::error::{DispatchError, ExceptionKind};
    use crate::metadata::Reflector;
    use http::{Method, StatusCode, Uri};
    use std::sync::Mutex;

    struct Controller;

    fn context() -> ExecutionContext {
        ExecutionContext::new(TypeKey::of::<Controller>(), "index", Arc::new(Reflector::new()))
    }

    fn http() -> Arc<HttpContext> {
        Arc::new(HttpContext::new(HttpRequest::new(Method::GET, Uri::from_static("/"))))
    }

    fn recording(log: &Arc<Mutex<Vec<usize>>>, id: usize, answer: bool) -> Arc<dyn Guard> {
        let log = Arc::clone(log);
        guard_fn(move |_, _| {
            log.lock().unwrap().push(id);
            answer
        })
        .resolve()
    }

    struct HeaderGuard;

    #[async_trait]
    impl Guard for HeaderGuard {
        async fn can_activate(&self, _ctx: &ExecutionContext, http: &Arc<HttpContext>) -> DispatchResult<bool> {
            Ok(http.header("x-token").is_some())
        }
    }

    #[test]
    fn empty_chain_is_skipped() {
        assert!(GuardChain::new(vec![], context()).is_none());
    }

    #[tokio::test]
    async fn all_guards_pass() {
        let log = Arc::new(Mutex::new(vec![]));
        let chain = GuardChain::new(vec![recording(&log, 1, true), recording(&log, 2, true)], context()).unwrap();

        chain.can_activate(&http()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn first_denial_short_circuits() {
        let log = Arc::new(Mutex::new(vec![]));
        let chain = GuardChain::new(
            vec![recording(&log, 1, true), recording(&log, 2, false), recording(&log, 3, true)],
            context(),
        )
        .unwrap();

        let err = chain.can_activate(&http()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.is_kind(&ExceptionKind::FORBIDDEN));
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn rejection_propagates_unchanged() {
        let log = Arc::new(Mutex::new(vec![]));
        let failing = async_guard_fn(|_, _| async { Err::<bool, _>(DispatchError::from(HttpException::unauthorized("token expired"))) });
        let chain = GuardChain::new(vec![failing.resolve(), recording(&log, 2, true)], context()).unwrap();

        let err = chain.can_activate(&http()).await.unwrap_err();
        assert!(matches!(&err, DispatchError::Http(e) if e.status() == StatusCode::UNAUTHORIZED));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn object_guard_reads_request() {
        let chain = GuardChain::new(vec![GuardRef::Object(Arc::new(HeaderGuard)).resolve()], context()).unwrap();
        assert!(chain.can_activate(&http()).await.is_err());

        let request = HttpRequest::new(Method::GET, Uri::from_static("/"))
            .with_header(http::header::HeaderName::from_static("x-token"), http::HeaderValue::from_static("abc"));
        let http = Arc::new(HttpContext::new(request));
        assert!(chain.can_activate(&http).await.is_ok());
    }
}
