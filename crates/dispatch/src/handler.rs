//! The target a route finally invokes, and the conversion of its return value.
//!
//! A target receives the request context and the resolved [`Args`], and returns anything
//! implementing [`IntoReply`]. A [`Reply`] may already be settled or still be [`Deferred`];
//! deferred replies are awaited before the response is finalized.

use crate::context::HttpContext;
use crate::error::{DispatchError, DispatchResult};
use crate::interceptor::Deferred;
use crate::param::Args;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait TargetHandler: Send + Sync {
    async fn invoke(&self, http: Arc<HttpContext>, args: Args) -> DispatchResult<Reply>;
}

/// What a target produced.
#[derive(Debug)]
pub enum Reply {
    /// Nothing, the response is left untouched
    Empty,
    Value(Value),
    Deferred(Deferred),
}

impl Reply {
    /// Awaits a deferred reply; `Empty` settles to `None`.
    pub async fn settle(self) -> DispatchResult<Option<Value>> {
        match self {
            Reply::Empty => Ok(None),
            Reply::Value(value) => Ok(Some(value)),
            Reply::Deferred(deferred) => deferred.await,
        }
    }
}

pub trait IntoReply {
    fn into_reply(self) -> DispatchResult<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(Reply::Value(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(Reply::Value(Value::String(self)))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(Reply::Value(Value::from(self)))
    }
}

impl IntoReply for Deferred {
    fn into_reply(self) -> DispatchResult<Reply> {
        Ok(Reply::Deferred(self))
    }
}

/// `None` replies nothing.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> DispatchResult<Reply> {
        match self {
            Some(reply) => reply.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<DispatchError>,
{
    fn into_reply(self) -> DispatchResult<Reply> {
        self.map_err(Into::into)?.into_reply()
    }
}

/// Replies any serializable value as json.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> DispatchResult<Reply> {
        serde_json::to_value(self.0).map(Reply::Value).map_err(|e| DispatchError::domain("SerializationError", e))
    }
}

/// A [`TargetHandler`] calling an async function.
pub struct FnHandler<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

/// Wraps an async function taking the context and the resolved arguments.
pub fn handler_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<HttpContext>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, R> TargetHandler for FnHandler<F>
where
    F: Fn(Arc<HttpContext>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    async fn invoke(&self, http: Arc<HttpContext>, args: Args) -> DispatchResult<Reply> {
        (self.f)(http, args).await.into_reply()
    }
}
