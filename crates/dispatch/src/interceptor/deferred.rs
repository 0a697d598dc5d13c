use crate::error::{DispatchError, DispatchResult};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A lazily evaluated result carrying zero or one value.
///
/// Nothing runs until the deferred value is awaited, and it settles exactly once.
#[must_use = "a deferred value does nothing unless awaited"]
pub struct Deferred {
    inner: BoxFuture<'static, DispatchResult<Option<Value>>>,
}

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = DispatchResult<Option<Value>>> + Send + 'static,
    {
        Self { inner: future.boxed() }
    }

    pub fn from_value(value: Value) -> Self {
        Self::new(async move { Ok(Some(value)) })
    }

    pub fn empty() -> Self {
        Self::new(async { Ok(None) })
    }

    pub fn failed(error: impl Into<DispatchError>) -> Self {
        let error = error.into();
        Self::new(async move { Err(error) })
    }

    /// Transforms the settled value, failures pass through untouched.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(Option<Value>) -> Option<Value> + Send + 'static,
    {
        Self::new(async move { self.inner.await.map(f) })
    }

    /// Observes the settled value without changing it.
    pub fn inspect<F>(self, f: F) -> Self
    where
        F: FnOnce(&Option<Value>) + Send + 'static,
    {
        Self::new(async move {
            let value = self.inner.await?;
            f(&value);
            Ok(value)
        })
    }

    /// Recovers from a failure with another deferred value.
    pub fn or_else<F>(self, f: F) -> Self
    where
        F: FnOnce(DispatchError) -> Deferred + Send + 'static,
    {
        Self::new(async move {
            match self.inner.await {
                Ok(value) => Ok(value),
                Err(e) => f(e).await,
            }
        })
    }

    pub async fn resolve(self) -> DispatchResult<Option<Value>> {
        self.inner.await
    }
}

impl Future for Deferred {
    type Output = DispatchResult<Option<Value>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Deferred")
    }
}
