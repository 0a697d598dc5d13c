//! Response finalization: static headers, status code, payload or rendered template.

use crate::context::{HttpContext, TypeKey};
use crate::error::{BuildError, DispatchResult};
use crate::metadata::{MetadataKind, MetadataValue, Reflector};
use crate::route::Verb;
use async_trait::async_trait;
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Renders a template into the response of the context.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, template: &str, value: Option<Value>, http: &HttpContext) -> DispatchResult<()>;
}

/// A declared static response header. Without a value the header is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDecl {
    pub name: String,
    pub value: Option<String>,
}

impl HeaderDecl {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()) }
    }

    pub fn clear(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }
}

enum Output {
    Render { template: String, renderer: Arc<dyn Renderer> },
    Payload { status: StatusCode },
}

/// Writes the settled handler result to the response.
pub struct ResponseFinalizer {
    headers: Vec<(HeaderName, Option<HeaderValue>)>,
    output: Output,
}

impl ResponseFinalizer {
    /// A finalizer assigning present results as payload with `status`.
    pub fn new(headers: &[HeaderDecl], status: StatusCode) -> Result<Self, BuildError> {
        Ok(Self { headers: parse_headers(headers)?, output: Output::Payload { status } })
    }

    /// A finalizer handing every result to `renderer`.
    pub fn render(headers: &[HeaderDecl], template: impl Into<String>, renderer: Arc<dyn Renderer>) -> Result<Self, BuildError> {
        Ok(Self { headers: parse_headers(headers)?, output: Output::Render { template: template.into(), renderer } })
    }

    /// Builds the finalizer of `class::method` from its method level metadata.
    pub(crate) fn from_metadata(
        reflector: &Reflector,
        class: TypeKey,
        method: &str,
        verb: Verb,
        renderer: Option<&Arc<dyn Renderer>>,
    ) -> Result<Self, BuildError> {
        let headers = reflector
            .get_method_metadata(&MetadataKind::Headers, class, method)
            .and_then(MetadataValue::as_headers)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Some(template) = reflector.get_method_metadata(&MetadataKind::Render, class, method).and_then(MetadataValue::as_render) {
            let Some(renderer) = renderer else {
                return Err(BuildError::MissingRenderer {
                    controller: class.name(),
                    method: method.to_owned(),
                    template: template.clone(),
                });
            };
            return Self::render(headers, template.clone(), Arc::clone(renderer));
        }

        let declared = reflector.get_method_metadata(&MetadataKind::HttpCode, class, method).and_then(MetadataValue::as_http_code);
        Self::new(headers, default_status(verb, declared.copied()))
    }

    pub async fn finalize(&self, result: Option<Value>, http: &HttpContext) -> DispatchResult<()> {
        let response = http.response();
        for (name, value) in &self.headers {
            match value {
                Some(value) => response.set_header(name.clone(), value.clone()),
                None => response.remove_header(name),
            }
        }

        match &self.output {
            Output::Render { template, renderer } => renderer.render(template, result, http).await,
            Output::Payload { status } => {
                if let Some(value) = result.filter(|value| !value.is_null()) {
                    response.set_status(*status);
                    response.set_body(value);
                }
                Ok(())
            }
        }
    }
}

impl Debug for ResponseFinalizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ResponseFinalizer");
        debug.field("headers", &self.headers);
        match &self.output {
            Output::Render { template, .. } => debug.field("template", template),
            Output::Payload { status } => debug.field("status", status),
        };
        debug.finish()
    }
}

/// The declared status, else `201 Created` for POST routes, else `200 OK`.
pub fn default_status(verb: Verb, declared: Option<StatusCode>) -> StatusCode {
    match (declared, verb) {
        (Some(status), _) => status,
        (None, Verb::Post) => StatusCode::CREATED,
        (None, _) => StatusCode::OK,
    }
}

fn parse_headers(headers: &[HeaderDecl]) -> Result<Vec<(HeaderName, Option<HeaderValue>)>, BuildError> {
    headers
        .iter()
        .map(|decl| {
            let name = HeaderName::from_bytes(decl.name.as_bytes()).map_err(|e| BuildError::invalid_header(&decl.name, e))?;
            let value = decl
                .value
                .as_deref()
                .map(HeaderValue::from_str)
                .transpose()
                .map_err(|e| BuildError::invalid_header(&decl.name, e))?;
            Ok((name, value))
        })
        .collect()
}
