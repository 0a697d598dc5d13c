//! Side table of declared route metadata.
//!
//! [`Reflector`] stores metadata keyed by (declaring type, member name, [`MetadataKind`]). Class
//! level entries have no member name. Reads are pure and absence is never an error: it means
//! "no constraint of this kind".
//!
//! The [`declare`] module writes this table the way controller annotations would.

pub mod declare;

use crate::component::Component;
use crate::context::TypeKey;
use crate::param::ParamBinding;
use crate::response::HeaderDecl;
use crate::route::Verb;
use http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;

pub use declare::{ControllerDecl, ControllerDef, MethodDecl};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Path,
    Method,
    RouteName,
    Guards,
    Pipes,
    Interceptors,
    Filters,
    RouteArgs,
    ParamTypes,
    HttpCode,
    Render,
    Headers,
    Custom(String),
}

#[derive(Debug, Clone)]
pub enum MetadataValue {
    Controller(ControllerPath),
    Path(String),
    Verb(Verb),
    RouteName(String),
    Components(Vec<Component>),
    RouteArgs(Vec<ParamBinding>),
    ParamTypes(Vec<Option<String>>),
    HttpCode(StatusCode),
    Render(String),
    Headers(Vec<HeaderDecl>),
    Custom(Value),
}

macro_rules! metadata_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&self) -> Option<&$ty> {
            match self {
                MetadataValue::$variant(value) => Some(value),
                _ => None,
            }
        }
    };
}

impl MetadataValue {
    metadata_accessor!(as_controller, Controller, ControllerPath);
    metadata_accessor!(as_path, Path, String);
    metadata_accessor!(as_verb, Verb, Verb);
    metadata_accessor!(as_route_name, RouteName, String);
    metadata_accessor!(as_route_args, RouteArgs, Vec<ParamBinding>);
    metadata_accessor!(as_param_types, ParamTypes, Vec<Option<String>>);
    metadata_accessor!(as_http_code, HttpCode, StatusCode);
    metadata_accessor!(as_render, Render, String);
    metadata_accessor!(as_headers, Headers, Vec<HeaderDecl>);
    metadata_accessor!(as_custom, Custom, Value);

    #[inline]
    pub fn as_components(&self) -> Option<&[Component]> {
        match self {
            MetadataValue::Components(components) => Some(components),
            _ => None,
        }
    }
}

/// Class level path metadata: the route prefix, and the resource name for RESTful controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPath {
    pub prefix: String,
    pub name: Option<String>,
    pub restful: bool,
}

type Entries = HashMap<MetadataKind, MetadataValue>;

#[derive(Debug, Default)]
pub struct Reflector {
    classes: HashMap<TypeKey, Entries>,
    methods: HashMap<TypeKey, HashMap<String, Entries>>,
}

impl Reflector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts declaring metadata for the controller type `T`.
    pub fn controller<T: 'static>(&mut self, prefix: &str) -> ControllerDecl<'_> {
        ControllerDecl::new(self, TypeKey::of::<T>(), prefix)
    }

    /// Starts declaring a RESTful resource controller, see [`ControllerDecl::resources`].
    pub fn resources<T: 'static>(&mut self, name: &str, prefix: Option<&str>) -> ControllerDecl<'_> {
        ControllerDecl::resources(self, TypeKey::of::<T>(), name, prefix)
    }

    pub fn set_class_metadata(&mut self, kind: MetadataKind, class: TypeKey, value: MetadataValue) {
        self.classes.entry(class).or_default().insert(kind, value);
    }

    pub fn set_method_metadata(
        &mut self,
        kind: MetadataKind,
        class: TypeKey,
        method: impl Into<String>,
        value: MetadataValue,
    ) {
        self.methods.entry(class).or_default().entry(method.into()).or_default().insert(kind, value);
    }

    pub fn get_class_metadata(&self, kind: &MetadataKind, class: TypeKey) -> Option<&MetadataValue> {
        self.classes.get(&class).and_then(|entries| entries.get(kind))
    }

    pub fn get_method_metadata(&self, kind: &MetadataKind, class: TypeKey, method: &str) -> Option<&MetadataValue> {
        self.methods.get(&class).and_then(|methods| methods.get(method)).and_then(|entries| entries.get(kind))
    }
}
