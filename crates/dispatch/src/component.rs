//! Guards, pipes, interceptors and exception filters as declared in metadata, and the assembly
//! of those declarations into invocable chains.
//!
//! A declaration is either a bare function or an object implementing the capability trait. Both
//! forms resolve to one invocable shape (`Arc<dyn Guard>`, `Arc<dyn Pipe>`, ...) when a route is
//! built. Assembly concatenates class level declarations before method level ones, which fixes the
//! evaluation order of guards and pipes and the nesting order of interceptors.

use crate::context::TypeKey;
use crate::exception::{ExceptionFilter, FilterRef};
use crate::guard::{Guard, GuardRef};
use crate::interceptor::{Interceptor, InterceptorRef};
use crate::metadata::{MetadataKind, MetadataValue, Reflector};
use crate::pipe::{Pipe, PipeRef};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CanActivate,
    Transform,
    Intercept,
    Catch,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::CanActivate => "can_activate",
            Capability::Transform => "transform",
            Capability::Intercept => "intercept",
            Capability::Catch => "catch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Component {
    Guard(GuardRef),
    Pipe(PipeRef),
    Interceptor(InterceptorRef),
    Filter(FilterRef),
}

impl Component {
    pub fn guard<G: Guard + 'static>(guard: G) -> Self {
        Component::Guard(GuardRef::Object(Arc::new(guard)))
    }

    pub fn pipe<P: Pipe + 'static>(pipe: P) -> Self {
        Component::Pipe(PipeRef::Object(Arc::new(pipe)))
    }

    pub fn interceptor<I: Interceptor + 'static>(interceptor: I) -> Self {
        Component::Interceptor(InterceptorRef::Object(Arc::new(interceptor)))
    }

    pub fn filter<F: ExceptionFilter + 'static>(filter: F) -> Self {
        Component::Filter(FilterRef::Object(Arc::new(filter)))
    }

    pub fn capability(&self) -> Capability {
        match self {
            Component::Guard(_) => Capability::CanActivate,
            Component::Pipe(_) => Capability::Transform,
            Component::Interceptor(_) => Capability::Intercept,
            Component::Filter(_) => Capability::Catch,
        }
    }

    pub(crate) fn to_guard(&self) -> Option<Arc<dyn Guard>> {
        match self {
            Component::Guard(guard) => Some(guard.resolve()),
            _ => None,
        }
    }

    pub(crate) fn to_pipe(&self) -> Option<Arc<dyn Pipe>> {
        match self {
            Component::Pipe(pipe) => Some(pipe.resolve()),
            _ => None,
        }
    }

    pub(crate) fn to_interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        match self {
            Component::Interceptor(interceptor) => Some(interceptor.resolve()),
            _ => None,
        }
    }

    pub(crate) fn to_filter(&self) -> Option<Arc<dyn ExceptionFilter>> {
        match self {
            Component::Filter(filter) => Some(filter.resolve()),
            _ => None,
        }
    }
}

impl From<GuardRef> for Component {
    fn from(guard: GuardRef) -> Self {
        Component::Guard(guard)
    }
}

impl From<PipeRef> for Component {
    fn from(pipe: PipeRef) -> Self {
        Component::Pipe(pipe)
    }
}

impl From<InterceptorRef> for Component {
    fn from(interceptor: InterceptorRef) -> Self {
        Component::Interceptor(interceptor)
    }
}

impl From<FilterRef> for Component {
    fn from(filter: FilterRef) -> Self {
        Component::Filter(filter)
    }
}

/// Resolves a list of declarations, dropping every entry without the expected capability.
pub(crate) fn resolve_all<T: ?Sized>(
    components: &[Component],
    expected: Capability,
    resolve: fn(&Component) -> Option<Arc<T>>,
) -> Vec<Arc<T>> {
    components
        .iter()
        .filter_map(|component| {
            let resolved = resolve(component);
            if resolved.is_none() {
                warn!(expected = %expected, found = %component.capability(), "declared component skipped");
            }
            resolved
        })
        .collect()
}

/// Collects the class level then the method level declarations of `kind`.
pub(crate) fn assemble<T: ?Sized>(
    reflector: &Reflector,
    class: TypeKey,
    method: &str,
    kind: &MetadataKind,
    expected: Capability,
    resolve: fn(&Component) -> Option<Arc<T>>,
) -> Vec<Arc<T>> {
    let class_level = reflector.get_class_metadata(kind, class);
    let method_level = reflector.get_method_metadata(kind, class, method);

    class_level
        .into_iter()
        .chain(method_level)
        .filter_map(MetadataValue::as_components)
        .flat_map(|components| resolve_all(components, expected, resolve))
        .collect()
}
