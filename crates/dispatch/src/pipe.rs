//! Value transformation pipes applied to resolved route parameters.
//!
//! A [`PipeChain`] applies its pipes left to right, every pipe receiving the awaited output of the
//! previous one together with the [`ArgumentMetadata`] of the parameter being resolved.

use crate::error::{DispatchResult, HttpException};
use crate::param::ArgumentMetadata;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, ready};
use serde_json::{Number, Value};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait Pipe: Send + Sync {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> DispatchResult<Value>;
}

pub type PipeFn = Arc<dyn Fn(Value, ArgumentMetadata) -> BoxFuture<'static, DispatchResult<Value>> + Send + Sync>;

/// A declared pipe: a bare function or an object implementing [`Pipe`].
#[derive(Clone)]
pub enum PipeRef {
    Function(PipeFn),
    Object(Arc<dyn Pipe>),
}

impl PipeRef {
    pub(crate) fn resolve(&self) -> Arc<dyn Pipe> {
        match self {
            PipeRef::Function(f) => Arc::new(FnPipe(Arc::clone(f))),
            PipeRef::Object(pipe) => Arc::clone(pipe),
        }
    }
}

impl Debug for PipeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipeRef::Function(_) => f.write_str("PipeRef::Function"),
            PipeRef::Object(_) => f.write_str("PipeRef::Object"),
        }
    }
}

struct FnPipe(PipeFn);

#[async_trait]
impl Pipe for FnPipe {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        (self.0)(value, metadata.clone()).await
    }
}

/// Creates a pipe from a synchronous transformation.
pub fn pipe_fn<F>(f: F) -> PipeRef
where
    F: Fn(Value, &ArgumentMetadata) -> DispatchResult<Value> + Send + Sync + 'static,
{
    PipeRef::Function(Arc::new(move |value: Value, metadata: ArgumentMetadata| ready(f(value, &metadata)).boxed()))
}

/// Creates a pipe from an async transformation.
pub fn async_pipe_fn<F, Fut>(f: F) -> PipeRef
where
    F: Fn(Value, ArgumentMetadata) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
{
    PipeRef::Function(Arc::new(move |value: Value, metadata: ArgumentMetadata| f(value, metadata).boxed()))
}

/// An ordered list of pipes, assembled once per parameter binding.
#[derive(Clone, Default)]
pub struct PipeChain {
    pipes: Vec<Arc<dyn Pipe>>,
}

impl PipeChain {
    pub fn new(pipes: Vec<Arc<dyn Pipe>>) -> Self {
        Self { pipes }
    }

    pub async fn apply(&self, value: Value, metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        let mut value = value;
        for pipe in &self.pipes {
            value = pipe.transform(value, metadata).await?;
        }
        Ok(value)
    }
}

impl Debug for PipeChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeChain").field("len", &self.pipes.len()).finish()
    }
}

/// Parses a numeric string into an integer, `400 Bad Request` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseIntPipe;

#[async_trait]
impl Pipe for ParseIntPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .map(Value::from)
                .ok_or_else(|| HttpException::bad_request("Validation failed (numeric string is expected)").into()),
            _ => Err(HttpException::bad_request("Validation failed (numeric string is expected)").into()),
        }
    }
}

/// Parses a numeric string into a float, `400 Bad Request` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseFloatPipe;

#[async_trait]
impl Pipe for ParseFloatPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        let parsed = match &value {
            Value::Number(_) => return Ok(value),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(Number::from_f64),
            _ => None,
        };
        parsed
            .map(Value::Number)
            .ok_or_else(|| HttpException::bad_request("Validation failed (numeric string is expected)").into())
    }
}

/// Accepts `true`/`false` as booleans or strings, `400 Bad Request` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseBoolPipe;

#[async_trait]
impl Pipe for ParseBoolPipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(HttpException::bad_request("Validation failed (boolean string is expected)").into()),
        }
    }
}

/// Substitutes a default for a missing (`null`) value.
#[derive(Debug, Clone)]
pub struct DefaultValuePipe(pub Value);

#[async_trait]
impl Pipe for DefaultValuePipe {
    async fn transform(&self, value: Value, _metadata: &ArgumentMetadata) -> DispatchResult<Value> {
        if value.is_null() { Ok(self.0.clone()) } else { Ok(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::param::ParamKind;
    use serde_json::json;
    use std::sync::Mutex;

    fn metadata() -> ArgumentMetadata {
        ArgumentMetadata { data: Some("page".into()), metatype: Some("i64".into()), kind: ParamKind::Query }
    }

    #[tokio::test]
    async fn applies_left_to_right() {
        let append = |suffix: &'static str| {
            pipe_fn(move |value, _| Ok(Value::String(format!("{}{suffix}", value.as_str().unwrap_or_default()))))
                .resolve()
        };
        let chain = PipeChain::new(vec![append("a"), append("b"), append("c")]);

        let value = chain.apply(json!(">"), &metadata()).await.unwrap();
        assert_eq!(value, json!(">abc"));
    }

    #[tokio::test]
    async fn async_pipes_are_awaited_before_the_next_stage() {
        let seen = Arc::new(Mutex::new(vec![]));
        let recorder = {
            let seen = Arc::clone(&seen);
            pipe_fn(move |value, _| {
                seen.lock().unwrap().push(value.clone());
                Ok(value)
            })
        };
        let doubling = async_pipe_fn(|value, _| async move {
            tokio::task::yield_now().await;
            Ok(json!(value.as_i64().unwrap_or_default() * 2))
        });
        let chain = PipeChain::new(vec![ParseIntPipe.into_arc(), doubling.resolve(), recorder.resolve()]);

        assert_eq!(chain.apply(json!("21"), &metadata()).await.unwrap(), json!(42));
        assert_eq!(*seen.lock().unwrap(), vec![json!(42)]);
    }

    #[tokio::test]
    async fn pipes_see_argument_metadata() {
        let pipe = pipe_fn(|_, metadata| Ok(json!([metadata.data, metadata.metatype, metadata.kind.tag()])));
        let chain = PipeChain::new(vec![pipe.resolve()]);
        assert_eq!(chain.apply(Value::Null, &metadata()).await.unwrap(), json!(["page", "i64", "query"]));
    }

    #[tokio::test]
    async fn failing_pipe_stops_the_chain() {
        let reached = Arc::new(Mutex::new(false));
        let after = {
            let reached = Arc::clone(&reached);
            pipe_fn(move |value, _| {
                *reached.lock().unwrap() = true;
                Ok(value)
            })
        };
        let chain = PipeChain::new(vec![ParseIntPipe.into_arc(), after.resolve()]);

        let err = chain.apply(json!("three"), &metadata()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Http(e) if e.status() == http::StatusCode::BAD_REQUEST));
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn builtin_pipes() {
        let meta = metadata();
        assert_eq!(ParseIntPipe.transform(json!("3"), &meta).await.unwrap(), json!(3));
        assert_eq!(ParseIntPipe.transform(json!(7), &meta).await.unwrap(), json!(7));
        assert!(ParseIntPipe.transform(json!(1.5), &meta).await.is_err());
        assert_eq!(ParseFloatPipe.transform(json!("1.5"), &meta).await.unwrap(), json!(1.5));
        assert_eq!(ParseBoolPipe.transform(json!("true"), &meta).await.unwrap(), json!(true));
        assert!(ParseBoolPipe.transform(json!("yes"), &meta).await.is_err());
        assert_eq!(DefaultValuePipe(json!(1)).transform(Value::Null, &meta).await.unwrap(), json!(1));
        assert_eq!(DefaultValuePipe(json!(1)).transform(json!(5), &meta).await.unwrap(), json!(5));
    }

    trait IntoArc {
        fn into_arc(self) -> Arc<dyn Pipe>;
    }

    impl<P: Pipe + 'static> IntoArc for P {
        fn into_arc(self) -> Arc<dyn Pipe> {
            Arc::new(self)
        }
    }
}
