//! Request handling context shared by every stage of the dispatch pipeline.
//!
//! This module contains:
//! - [`HttpContext`]: the per-request state, owning the request, the response being built,
//!   the matched path parameters, the parsed query and the session
//! - [`HttpRequest`] and [`HttpResponse`]: the request and response facets of the context
//! - [`ExecutionContext`]: the immutable per-route descriptor handed to guards and interceptors

use crate::metadata::{MetadataKind, MetadataValue, Reflector};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, Uri};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;

/// Identifies a controller type in the metadata registry.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    /// The fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A file uploaded with a multipart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub path: String,
}

/// The request facet of an [`HttpContext`]: method, uri, headers, the parsed body and uploaded files.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Value>,
    files: Vec<UploadedFile>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, headers: HeaderMap::new(), body: None, files: vec![] }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }
}

impl From<http::Request<Option<Value>>> for HttpRequest {
    fn from(request: http::Request<Option<Value>>) -> Self {
        let (parts, body) = request.into_parts();
        Self { method: parts.method, uri: parts.uri, headers: parts.headers, body, files: vec![] }
    }
}

/// The response facet of an [`HttpContext`].
///
/// Every pipeline stage writes through a shared reference, so the state sits behind a lock.
/// A fresh response is `404 Not Found` without a body until something writes to it.
#[derive(Debug)]
pub struct HttpResponse {
    state: Mutex<ResponseState>,
}

#[derive(Debug, Clone)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self { state: Mutex::new(ResponseState { status: StatusCode::NOT_FOUND, headers: HeaderMap::new(), body: None }) }
    }

    pub fn status(&self) -> StatusCode {
        self.state.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state.lock().status = status;
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.state.lock().headers.get(name).cloned()
    }

    pub fn headers(&self) -> HeaderMap {
        self.state.lock().headers.clone()
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state.lock().headers.insert(name, value);
    }

    pub fn remove_header(&self, name: &HeaderName) {
        self.state.lock().headers.remove(name);
    }

    pub fn body(&self) -> Option<Value> {
        self.state.lock().body.clone()
    }

    /// Assigns the payload, defaulting the content type to json when none was set.
    pub fn set_body(&self, body: Value) {
        let mut state = self.state.lock();
        if !state.headers.contains_key(CONTENT_TYPE) {
            let content_type = if body.is_string() { mime::TEXT_PLAIN_UTF_8 } else { mime::APPLICATION_JSON };
            if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
                state.headers.insert(CONTENT_TYPE, value);
            }
        }
        state.body = Some(body);
    }

    /// Snapshot of the written response, for the host to send out.
    pub fn to_http(&self) -> Response<Option<Value>> {
        let state = self.state.lock().clone();
        let mut response = Response::new(state.body);
        *response.status_mut() = state.status;
        *response.headers_mut() = state.headers;
        response
    }
}

/// The per-request context every pipeline stage reads from and writes to.
#[derive(Debug)]
pub struct HttpContext {
    request: Arc<HttpRequest>,
    response: Arc<HttpResponse>,
    params: Map<String, Value>,
    query: Map<String, Value>,
    session: Value,
}

impl HttpContext {
    pub fn new(request: HttpRequest) -> Self {
        let query = parse_query(request.uri());
        Self {
            request: Arc::new(request),
            response: Arc::new(HttpResponse::new()),
            params: Map::new(),
            query,
            session: Value::Object(Map::new()),
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = session;
        self
    }

    pub fn request(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    pub fn response(&self) -> &Arc<HttpResponse> {
        &self.response
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn session(&self) -> &Value {
        &self.session
    }

    /// A request header as a string value, `None` when absent or not visible ascii
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|value| value.to_str().ok())
    }
}

fn parse_query(uri: &Uri) -> Map<String, Value> {
    let Some(query) = uri.query() else {
        return Map::new();
    };

    let pairs = match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!(cause = %e, query, "malformed query string ignored");
            return Map::new();
        }
    };

    let mut map = Map::new();
    for (key, value) in pairs {
        // repeated keys collect into an array
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

/// Immutable description of the controller method a route invokes.
///
/// Built once per route and shared by every request of that route.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<ExecutionContextInner>,
}

#[derive(Debug)]
struct ExecutionContextInner {
    class: TypeKey,
    handler: String,
    reflector: Arc<Reflector>,
}

impl ExecutionContext {
    pub(crate) fn new(class: TypeKey, handler: impl Into<String>, reflector: Arc<Reflector>) -> Self {
        Self { inner: Arc::new(ExecutionContextInner { class, handler: handler.into(), reflector }) }
    }

    /// The controller type owning the handler
    pub fn get_class(&self) -> TypeKey {
        self.inner.class
    }

    /// The name of the controller method
    pub fn get_handler(&self) -> &str {
        &self.inner.handler
    }

    /// Custom metadata set with `set_metadata`, the method level value wins over the class level one.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        let kind = MetadataKind::Custom(key.to_owned());
        let reflector = &self.inner.reflector;
        reflector
            .get_method_metadata(&kind, self.inner.class, &self.inner.handler)
            .or_else(|| reflector.get_class_metadata(&kind, self.inner.class))
            .and_then(MetadataValue::as_custom)
    }
}
