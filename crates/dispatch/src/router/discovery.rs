use crate::handler::TargetHandler;
use crate::metadata::{ControllerDef, ControllerPath, MetadataKind, MetadataValue, Reflector};
use crate::route::{RouteDescriptor, rest_route};
use std::sync::Arc;
use tracing::debug;

/// Enumerates the routes of a declared controller.
///
/// A method is routed when it declares a path, or when its controller is a resource and the
/// method is named after a REST verb. Other methods are skipped.
pub fn scan_controller(reflector: &Reflector, def: &ControllerDef) -> Vec<(RouteDescriptor, Arc<dyn TargetHandler>)> {
    let class = def.class();
    let controller = reflector
        .get_class_metadata(&MetadataKind::Path, class)
        .and_then(MetadataValue::as_controller)
        .cloned()
        .unwrap_or_else(|| ControllerPath { prefix: "/".into(), name: None, restful: false });

    let mut routes = vec![];
    for (method, handler) in def.methods() {
        let declared_path = reflector.get_method_metadata(&MetadataKind::Path, class, method).and_then(MetadataValue::as_path);
        let declared_verb = reflector.get_method_metadata(&MetadataKind::Method, class, method).and_then(MetadataValue::as_verb);
        let declared_name =
            reflector.get_method_metadata(&MetadataKind::RouteName, class, method).and_then(MetadataValue::as_route_name);

        let (verb, path, name) = match (declared_path, declared_verb) {
            (Some(path), Some(verb)) => (*verb, path.clone(), declared_name.cloned()),
            _ => match (controller.restful, rest_route(method)) {
                (true, Some((verb, path))) => {
                    let name = declared_name.cloned().or_else(|| controller.name.as_ref().map(|resource| format!("{resource}.{method}")));
                    (verb, path.to_owned(), name)
                }
                _ => {
                    debug!(controller = class.name(), method, "method without route skipped");
                    continue;
                }
            },
        };

        let descriptor = RouteDescriptor {
            controller: class,
            method: method.to_owned(),
            path: join_path(&controller.prefix, &path),
            verb,
            name,
        };
        routes.push((descriptor, Arc::clone(handler)));
    }
    routes
}

/// Joins a controller prefix and a route path, without doubled or trailing slashes.
pub(crate) fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_owned(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_owned(),
        (false, false) => format!("{prefix}/{path}"),
    }
}
