//! Around advice wrapping the invocation of a route's target.
//!
//! Interceptors are folded from the right around a [`Deferred`] of the target invocation, so the
//! first declared interceptor is the outermost one:
//!
//! ```text
//! i1 before -> i2 before -> target -> i2 after -> i1 after
//! ```
//!
//! An interceptor may also short-circuit by returning a deferred value that never awaits `next`.

mod deferred;

pub use deferred::Deferred;

use crate::context::{ExecutionContext, HttpContext};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub trait Interceptor: Send + Sync {
    fn intercept(&self, ctx: &ExecutionContext, http: &Arc<HttpContext>, next: Deferred) -> Deferred;
}

pub type InterceptorFn = Arc<dyn Fn(&ExecutionContext, &Arc<HttpContext>, Deferred) -> Deferred + Send + Sync>;

/// A declared interceptor: a bare function or an object implementing [`Interceptor`].
#[derive(Clone)]
pub enum InterceptorRef {
    Function(InterceptorFn),
    Object(Arc<dyn Interceptor>),
}

impl InterceptorRef {
    pub(crate) fn resolve(&self) -> Arc<dyn Interceptor> {
        match self {
            InterceptorRef::Function(f) => Arc::new(FnInterceptor(Arc::clone(f))),
            InterceptorRef::Object(interceptor) => Arc::clone(interceptor),
        }
    }
}

impl Debug for InterceptorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InterceptorRef::Function(_) => f.write_str("InterceptorRef::Function"),
            InterceptorRef::Object(_) => f.write_str("InterceptorRef::Object"),
        }
    }
}

struct FnInterceptor(InterceptorFn);

impl Interceptor for FnInterceptor {
    fn intercept(&self, ctx: &ExecutionContext, http: &Arc<HttpContext>, next: Deferred) -> Deferred {
        (self.0)(ctx, http, next)
    }
}

pub fn interceptor_fn<F>(f: F) -> InterceptorRef
where
    F: Fn(&ExecutionContext, &Arc<HttpContext>, Deferred) -> Deferred + Send + Sync + 'static,
{
    InterceptorRef::Function(Arc::new(f))
}

/// The interceptors of one route, class level first.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    context: ExecutionContext,
}

impl InterceptorChain {
    /// Returns `None` for an empty list, so routes without interceptors call the target directly.
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, context: ExecutionContext) -> Option<Self> {
        if interceptors.is_empty() {
            return None;
        }
        Some(Self { interceptors, context })
    }

    /// Wraps `proceed` in every interceptor.
    ///
    /// Each `intercept` call is itself deferred until the enclosing layer awaits it, so code an
    /// interceptor runs before building its result still observes the declaration order.
    pub fn intercept(&self, http: &Arc<HttpContext>, proceed: Deferred) -> Deferred {
        self.interceptors.iter().rev().fold(proceed, |next, interceptor| {
            let interceptor = Arc::clone(interceptor);
            let ctx = self.context.clone();
            let http = Arc::clone(http);
            Deferred::new(async move { interceptor.intercept(&ctx, &http, next).await })
        })
    }
}

impl Debug for InterceptorChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain").field("len", &self.interceptors.len()).field("context", &self.context).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HttpRequest, TypeKey};
    use crate::error::HttpException;
    use crate::metadata::Reflector;
    use http::{Method, Uri};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Controller;

    type Log = Arc<Mutex<Vec<String>>>;

    fn context() -> ExecutionContext {
        ExecutionContext::new(TypeKey::of::<Controller>(), "index", Arc::new(Reflector::new()))
    }

    fn http() -> Arc<HttpContext> {
        Arc::new(HttpContext::new(HttpRequest::new(Method::GET, Uri::from_static("/"))))
    }

    /// Records `pre` and `post` inside the deferred value.
    fn around(log: &Log, name: &'static str) -> Arc<dyn Interceptor> {
        let log = Arc::clone(log);
        interceptor_fn(move |_, _, next| {
            let log = Arc::clone(&log);
            Deferred::new(async move {
                log.lock().unwrap().push(format!("{name} pre"));
                let value = next.await?;
                log.lock().unwrap().push(format!("{name} post"));
                Ok(value)
            })
        })
        .resolve()
    }

    /// Records `pre` eagerly, before returning the deferred value.
    struct Eager {
        log: Log,
        name: &'static str,
    }

    impl Interceptor for Eager {
        fn intercept(&self, _ctx: &ExecutionContext, _http: &Arc<HttpContext>, next: Deferred) -> Deferred {
            self.log.lock().unwrap().push(format!("{} pre", self.name));
            let log = Arc::clone(&self.log);
            let name = self.name;
            next.inspect(move |_| log.lock().unwrap().push(format!("{name} post")))
        }
    }

    fn target(log: &Log) -> Deferred {
        let log = Arc::clone(log);
        Deferred::new(async move {
            log.lock().unwrap().push("target".into());
            Ok(Some(json!("done")))
        })
    }

    #[test]
    fn empty_chain_is_skipped() {
        assert!(InterceptorChain::new(vec![], context()).is_none());
    }

    #[tokio::test]
    async fn first_declared_is_outermost() {
        let log = Log::default();
        let chain = InterceptorChain::new(vec![around(&log, "i1"), around(&log, "i2")], context()).unwrap();

        let value = chain.intercept(&http(), target(&log)).await.unwrap();
        assert_eq!(value, Some(json!("done")));
        assert_eq!(*log.lock().unwrap(), vec!["i1 pre", "i2 pre", "target", "i2 post", "i1 post"]);
    }

    #[tokio::test]
    async fn eager_interceptors_keep_declaration_order() {
        let log = Log::default();
        let chain = InterceptorChain::new(
            vec![
                Arc::new(Eager { log: Arc::clone(&log), name: "i1" }),
                Arc::new(Eager { log: Arc::clone(&log), name: "i2" }),
            ],
            context(),
        )
        .unwrap();

        let deferred = chain.intercept(&http(), target(&log));
        assert!(log.lock().unwrap().is_empty());

        deferred.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["i1 pre", "i2 pre", "target", "i2 post", "i1 post"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_target() {
        let log = Log::default();
        let cached = interceptor_fn(|_, _, _next| Deferred::from_value(json!("cached")));
        let chain = InterceptorChain::new(vec![around(&log, "i1"), cached.resolve()], context()).unwrap();

        let value = chain.intercept(&http(), target(&log)).await.unwrap();
        assert_eq!(value, Some(json!("cached")));
        assert_eq!(*log.lock().unwrap(), vec!["i1 pre", "i1 post"]);
    }

    #[tokio::test]
    async fn result_can_be_mapped() {
        let wrap = interceptor_fn(|_, _, next| next.map(|value| Some(json!({ "data": value.unwrap_or(Value::Null) }))));
        let chain = InterceptorChain::new(vec![wrap.resolve()], context()).unwrap();

        let value = chain.intercept(&http(), Deferred::from_value(json!(1))).await.unwrap();
        assert_eq!(value, Some(json!({"data": 1})));
    }

    #[tokio::test]
    async fn rejection_propagates_through_layers() {
        let log = Log::default();
        let chain = InterceptorChain::new(vec![around(&log, "i1")], context()).unwrap();

        let result = chain.intercept(&http(), Deferred::failed(HttpException::not_found("gone"))).await;
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["i1 pre"]);
    }

    #[tokio::test]
    async fn interceptors_read_custom_metadata() {
        let class = TypeKey::of::<Controller>();
        let mut reflector = Reflector::new();
        reflector.set_method_metadata(
            crate::metadata::MetadataKind::Custom("cache".into()),
            class,
            "index",
            crate::metadata::MetadataValue::Custom(json!(true)),
        );
        let ctx = ExecutionContext::new(class, "index", Arc::new(reflector));

        let flag = interceptor_fn(|ctx, _, next| {
            let cached = ctx.get_metadata("cache").cloned();
            next.map(move |value| if cached == Some(json!(true)) { Some(json!("from cache")) } else { value })
        });
        let chain = InterceptorChain::new(vec![flag.resolve()], ctx).unwrap();

        let value = chain.intercept(&http(), Deferred::from_value(json!("fresh"))).await.unwrap();
        assert_eq!(value, Some(json!("from cache")));
    }
}
