//! Exception filters and the dispatcher routing pipeline failures to them.
//!
//! Filters are tried in reverse registration order, so method level filters win over class
//! level ones. The first filter declaring the error's kind, or declaring no kind at all, handles
//! the error. When none matches, [`default_handler`] writes the response.

use crate::context::{HttpContext, HttpResponse};
use crate::error::{DispatchError, DispatchResult, ExceptionKind};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, ready};
use serde_json::json;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[async_trait]
pub trait ExceptionFilter: Send + Sync {
    /// The kinds this filter handles, an empty list catches everything.
    fn catches(&self) -> &[ExceptionKind] {
        &[]
    }

    async fn catch(&self, error: DispatchError, http: &Arc<HttpContext>) -> DispatchResult<()>;
}

pub type FilterFn = Arc<dyn Fn(DispatchError, Arc<HttpContext>) -> BoxFuture<'static, DispatchResult<()>> + Send + Sync>;

/// A declared exception filter: a bare function with the kinds it catches, or an object
/// implementing [`ExceptionFilter`].
#[derive(Clone)]
pub enum FilterRef {
    Function { catches: Vec<ExceptionKind>, f: FilterFn },
    Object(Arc<dyn ExceptionFilter>),
}

impl FilterRef {
    pub(crate) fn resolve(&self) -> Arc<dyn ExceptionFilter> {
        match self {
            FilterRef::Function { catches, f } => Arc::new(FnFilter { catches: catches.clone(), f: Arc::clone(f) }),
            FilterRef::Object(filter) => Arc::clone(filter),
        }
    }
}

impl Debug for FilterRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterRef::Function { catches, .. } => f.debug_struct("FilterRef::Function").field("catches", catches).finish(),
            FilterRef::Object(filter) => f.debug_struct("FilterRef::Object").field("catches", &filter.catches()).finish(),
        }
    }
}

struct FnFilter {
    catches: Vec<ExceptionKind>,
    f: FilterFn,
}

#[async_trait]
impl ExceptionFilter for FnFilter {
    fn catches(&self) -> &[ExceptionKind] {
        &self.catches
    }

    async fn catch(&self, error: DispatchError, http: &Arc<HttpContext>) -> DispatchResult<()> {
        (self.f)(error, Arc::clone(http)).await
    }
}

/// Creates a filter from a synchronous handler.
pub fn filter_fn<K, F>(catches: K, f: F) -> FilterRef
where
    K: IntoIterator<Item = ExceptionKind>,
    F: Fn(DispatchError, &HttpContext) -> DispatchResult<()> + Send + Sync + 'static,
{
    FilterRef::Function {
        catches: catches.into_iter().collect(),
        f: Arc::new(move |error: DispatchError, http: Arc<HttpContext>| ready(f(error, http.as_ref())).boxed()),
    }
}

/// Creates a filter from an async handler.
pub fn async_filter_fn<K, F, Fut>(catches: K, f: F) -> FilterRef
where
    K: IntoIterator<Item = ExceptionKind>,
    F: Fn(DispatchError, Arc<HttpContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<()>> + Send + 'static,
{
    FilterRef::Function {
        catches: catches.into_iter().collect(),
        f: Arc::new(move |error: DispatchError, http: Arc<HttpContext>| f(error, http).boxed()),
    }
}

/// Routes the failure of one request to the matching filter, once.
pub struct ExceptionDispatcher {
    // most recently registered first
    filters: Vec<Arc<dyn ExceptionFilter>>,
}

impl ExceptionDispatcher {
    /// `filters` in registration order, class level first.
    pub fn new(mut filters: Vec<Arc<dyn ExceptionFilter>>) -> Self {
        filters.reverse();
        Self { filters }
    }

    fn select(&self, error: &DispatchError) -> Option<&Arc<dyn ExceptionFilter>> {
        self.filters.iter().find(|filter| {
            let catches = filter.catches();
            catches.is_empty() || catches.iter().any(|kind| error.is_kind(kind))
        })
    }

    /// Hands `error` to the matching filter, or to [`default_handler`].
    ///
    /// Fails only when the selected filter itself fails; the response is then left as written so far.
    pub async fn dispatch(&self, error: DispatchError, http: &Arc<HttpContext>) -> DispatchResult<()> {
        let Some(filter) = self.select(&error) else {
            default_handler(&error, http.response());
            return Ok(());
        };

        debug!(kind = %error.kind(), catches = ?filter.catches(), "exception filter selected");
        filter.catch(error, http).await.inspect_err(|e| error!(cause = %e, "exception filter failed"))
    }
}

impl Debug for ExceptionDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionDispatcher").field("len", &self.filters.len()).finish()
    }
}

/// Writes the response of an error no filter handled.
///
/// An [`HttpException`](crate::HttpException) keeps its own status and payload, anything else
/// becomes a logged `500 Internal Server Error`.
pub fn default_handler(error: &DispatchError, response: &HttpResponse) {
    match error {
        DispatchError::Http(e) => {
            if e.status().is_server_error() {
                error!(status = %e.status(), message = e.message(), "http exception unhandled by filters");
            } else {
                warn!(status = %e.status(), message = e.message(), "http exception unhandled by filters");
            }
            response.set_status(e.status());
            response.set_body(e.response().clone());
        }
        DispatchError::Domain { kind, .. } => {
            error!(cause = %error, kind = %kind, "unhandled exception");
            let status = error.status();
            response.set_status(status);
            response.set_body(json!({"statusCode": status.as_u16(), "message": "Internal server error"}));
        }
    }
}
