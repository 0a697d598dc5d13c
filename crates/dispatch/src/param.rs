//! Route parameter bindings and their resolution into handler arguments.
//!
//! Every [`ParamBinding`] names a positional argument of the handler and where its value comes
//! from. At request time the [`ParamResolver`] extracts all bindings concurrently, runs the
//! transformable ones through their [`PipeChain`], and only then hands the complete [`Args`] to
//! the target.

use crate::context::{HttpContext, HttpRequest, HttpResponse, TypeKey};
use crate::error::{BuildError, DispatchResult, HttpException};
use crate::pipe::{Pipe, PipeChain, PipeRef};
use futures::future::{BoxFuture, FutureExt, ready, try_join_all};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

/// Where a parameter value is extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Context,
    Request,
    Response,
    Body,
    Param,
    Query,
    Headers,
    Session,
    File,
    Files,
    Custom(String),
}

impl ParamKind {
    pub fn tag(&self) -> &str {
        match self {
            ParamKind::Context => "context",
            ParamKind::Request => "request",
            ParamKind::Response => "response",
            ParamKind::Body => "body",
            ParamKind::Param => "param",
            ParamKind::Query => "query",
            ParamKind::Headers => "headers",
            ParamKind::Session => "session",
            ParamKind::File => "file",
            ParamKind::Files => "files",
            ParamKind::Custom(tag) => tag.as_str(),
        }
    }

    /// Whether values of this kind go through the pipe chain.
    pub fn runs_pipes(&self) -> bool {
        matches!(self, ParamKind::Body | ParamKind::Param | ParamKind::Query | ParamKind::Custom(_))
    }
}

pub type ParamFactory =
    Arc<dyn Fn(Option<String>, Arc<HttpContext>) -> BoxFuture<'static, DispatchResult<Value>> + Send + Sync>;

/// One declared handler parameter.
#[derive(Clone)]
pub struct ParamBinding {
    index: usize,
    kind: ParamKind,
    selector: Option<String>,
    pipes: Vec<PipeRef>,
    factory: Option<ParamFactory>,
}

impl ParamBinding {
    pub fn new(index: usize, kind: ParamKind) -> Self {
        Self { index, kind, selector: None, pipes: vec![], factory: None }
    }

    pub fn context(index: usize) -> Self {
        Self::new(index, ParamKind::Context)
    }

    pub fn request(index: usize) -> Self {
        Self::new(index, ParamKind::Request)
    }

    pub fn response(index: usize) -> Self {
        Self::new(index, ParamKind::Response)
    }

    pub fn body(index: usize) -> Self {
        Self::new(index, ParamKind::Body)
    }

    pub fn param(index: usize) -> Self {
        Self::new(index, ParamKind::Param)
    }

    pub fn query(index: usize) -> Self {
        Self::new(index, ParamKind::Query)
    }

    pub fn headers(index: usize) -> Self {
        Self::new(index, ParamKind::Headers)
    }

    pub fn session(index: usize) -> Self {
        Self::new(index, ParamKind::Session)
    }

    pub fn file(index: usize) -> Self {
        Self::new(index, ParamKind::File)
    }

    pub fn files(index: usize) -> Self {
        Self::new(index, ParamKind::Files)
    }

    /// A parameter produced by a user supplied factory, tagged with `tag`.
    pub fn custom<F>(index: usize, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Option<&str>, &HttpContext) -> Value + Send + Sync + 'static,
    {
        Self::with_factory(
            index,
            tag,
            Arc::new(move |key: Option<String>, http: Arc<HttpContext>| {
                let value: DispatchResult<Value> = Ok(factory(key.as_deref(), http.as_ref()));
                ready(value).boxed()
            }),
        )
    }

    /// A parameter produced by an async factory. A failing factory aborts the request.
    pub fn async_custom<F, Fut>(index: usize, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Option<String>, Arc<HttpContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
    {
        Self::with_factory(index, tag, Arc::new(move |key: Option<String>, http: Arc<HttpContext>| factory(key, http).boxed()))
    }

    fn with_factory(index: usize, tag: impl Into<String>, factory: ParamFactory) -> Self {
        let mut binding = Self::new(index, ParamKind::Custom(tag.into()));
        binding.factory = Some(factory);
        binding
    }

    /// Narrows the extraction to one named entry.
    pub fn select(mut self, key: impl Into<String>) -> Self {
        self.selector = Some(key.into());
        self
    }

    pub fn pipe<P: Pipe + 'static>(self, pipe: P) -> Self {
        self.pipe_ref(PipeRef::Object(Arc::new(pipe)))
    }

    pub fn pipe_ref(mut self, pipe: PipeRef) -> Self {
        self.pipes.push(pipe);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// Extracts the raw value of this binding, before any pipe runs.
    pub async fn extract(&self, http: &Arc<HttpContext>) -> DispatchResult<Arg> {
        if let Some(factory) = &self.factory {
            let value = factory(self.selector.clone(), Arc::clone(http)).await?;
            return Ok(Arg::Value(value));
        }
        Ok(self.extract_raw(http))
    }

    fn extract_raw(&self, http: &Arc<HttpContext>) -> Arg {
        let selector = self.selector();
        match &self.kind {
            ParamKind::Context => Arg::Context(Arc::clone(http)),
            ParamKind::Request => Arg::Request(Arc::clone(http.request())),
            ParamKind::Response => Arg::Response(Arc::clone(http.response())),
            ParamKind::Body => Arg::Value(select_value(http.request().body(), selector)),
            ParamKind::Param => Arg::Value(select_entry(http.params(), selector)),
            ParamKind::Query => Arg::Value(select_entry(http.query(), selector)),
            ParamKind::Headers => Arg::Value(select_headers(http, selector)),
            ParamKind::Session => Arg::Value(http.session().clone()),
            ParamKind::File => {
                let file = http.request().files().iter().find(|file| selector.is_none_or(|key| file.field_name == key));
                Arg::Value(file.and_then(|file| serde_json::to_value(file).ok()).unwrap_or_default())
            }
            ParamKind::Files => {
                let files = http
                    .request()
                    .files()
                    .iter()
                    .filter(|file| selector.is_none_or(|key| file.field_name == key))
                    .filter_map(|file| serde_json::to_value(file).ok())
                    .collect();
                Arg::Value(Value::Array(files))
            }
            ParamKind::Custom(_) => Arg::Value(Value::Null),
        }
    }
}

impl Debug for ParamBinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamBinding")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("selector", &self.selector)
            .field("pipes", &self.pipes.len())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

fn select_value(value: Option<&Value>, selector: Option<&str>) -> Value {
    match (value, selector) {
        (Some(value), Some(key)) => value.get(key).cloned().unwrap_or_default(),
        (Some(value), None) => value.clone(),
        (None, _) => Value::Null,
    }
}

fn select_entry(map: &Map<String, Value>, selector: Option<&str>) -> Value {
    match selector {
        Some(key) => map.get(key).cloned().unwrap_or_default(),
        None => Value::Object(map.clone()),
    }
}

fn select_headers(http: &HttpContext, selector: Option<&str>) -> Value {
    let joined = |name: &str| {
        let values: Vec<&str> = http.headers().get_all(name).iter().filter_map(|value| value.to_str().ok()).collect();
        if values.is_empty() { None } else { Some(Value::String(values.join(", "))) }
    };

    match selector {
        Some(name) => joined(name.to_ascii_lowercase().as_str()).unwrap_or_default(),
        None => {
            let mut map = Map::new();
            for name in http.headers().keys() {
                if let Some(value) = joined(name.as_str()) {
                    map.insert(name.as_str().to_owned(), value);
                }
            }
            Value::Object(map)
        }
    }
}

/// What a pipe knows about the parameter it transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentMetadata {
    /// The selector key of the binding
    pub data: Option<String>,
    /// The declared parameter type
    pub metatype: Option<String>,
    pub kind: ParamKind,
}

/// A resolved handler argument.
#[derive(Debug, Clone, Default)]
pub enum Arg {
    /// No binding targets this position
    #[default]
    Null,
    Context(Arc<HttpContext>),
    Request(Arc<HttpRequest>),
    Response(Arc<HttpResponse>),
    Value(Value),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// The positional arguments of one handler invocation.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Arg>);

static NULL_ARG: Arg = Arg::Null;

impl Args {
    pub fn new(args: Vec<Arg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The argument at `index`, [`Arg::Null`] past the end.
    pub fn get(&self, index: usize) -> &Arg {
        self.0.get(index).unwrap_or(&NULL_ARG)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.get(index).as_value()
    }

    /// Deserializes the value argument at `index`, `400 Bad Request` when it does not fit `T`.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> DispatchResult<T> {
        let value = self.value(index).cloned().unwrap_or_default();
        serde_json::from_value(value)
            .map_err(|e| HttpException::bad_request(format!("invalid argument at position {index}: {e}")).into())
    }

    pub fn context(&self, index: usize) -> Option<&Arc<HttpContext>> {
        match self.get(index) {
            Arg::Context(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn request(&self, index: usize) -> Option<&Arc<HttpRequest>> {
        match self.get(index) {
            Arg::Request(request) => Some(request),
            _ => None,
        }
    }

    pub fn response(&self, index: usize) -> Option<&Arc<HttpResponse>> {
        match self.get(index) {
            Arg::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.0
    }
}

struct ResolvedParam {
    binding: ParamBinding,
    metadata: ArgumentMetadata,
    pipes: Option<PipeChain>,
}

impl ResolvedParam {
    async fn resolve(&self, http: &Arc<HttpContext>) -> DispatchResult<(usize, Arg)> {
        let arg = self.binding.extract(http).await?;
        let arg = match (arg, &self.pipes) {
            (Arg::Value(value), Some(pipes)) => Arg::Value(pipes.apply(value, &self.metadata).await?),
            (arg, _) => arg,
        };
        Ok((self.binding.index, arg))
    }
}

/// The parameter bindings of one route, validated and paired with their pipe chains.
pub struct ParamResolver {
    arity: usize,
    params: Vec<ResolvedParam>,
}

impl ParamResolver {
    /// Builds the resolver of `class::method`.
    ///
    /// `route_pipes` run before the pipes of each binding. The argument count is the number of
    /// declared parameter types, extended to cover the highest bound index.
    pub fn build(
        class: TypeKey,
        method: &str,
        bindings: &[ParamBinding],
        param_types: &[Option<String>],
        route_pipes: &[Arc<dyn Pipe>],
    ) -> Result<Self, BuildError> {
        let mut seen = vec![];
        let mut params = Vec::with_capacity(bindings.len());

        for binding in bindings {
            if seen.contains(&binding.index) {
                return Err(BuildError::DuplicateParamIndex {
                    controller: class.name(),
                    method: method.to_owned(),
                    index: binding.index,
                });
            }
            seen.push(binding.index);

            let metadata = ArgumentMetadata {
                data: binding.selector.clone(),
                metatype: param_types.get(binding.index).cloned().flatten(),
                kind: binding.kind.clone(),
            };
            let pipes = binding.kind.runs_pipes().then(|| {
                let pipes = route_pipes.iter().cloned().chain(binding.pipes.iter().map(PipeRef::resolve)).collect();
                PipeChain::new(pipes)
            });
            params.push(ResolvedParam { binding: binding.clone(), metadata, pipes });
        }

        let arity = seen.iter().map(|index| index + 1).max().unwrap_or(0).max(param_types.len());
        Ok(Self { arity, params })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Resolves every binding concurrently; the first failure aborts the whole resolution.
    pub async fn resolve(&self, http: &Arc<HttpContext>) -> DispatchResult<Args> {
        let resolved = try_join_all(self.params.iter().map(|param| param.resolve(http))).await?;

        let mut args = vec![Arg::Null; self.arity];
        for (index, arg) in resolved {
            args[index] = arg;
        }
        Ok(Args(args))
    }
}

impl Debug for ParamResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamResolver").field("arity", &self.arity).field("params", &self.params.len()).finish()
    }
}
