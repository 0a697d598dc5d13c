use http::header::HeaderName;
use http::{Method, StatusCode, Uri};
use micro_dispatch::{
    Args, ControllerDef, DispatchError, ExceptionKind, HttpException, ParamBinding, ParseIntPipe, Reflector, Router,
    filter_fn, guard_fn, handler_fn, interceptor_fn, pipe_fn,
};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct UserController;

fn router(reflector: Reflector, controller: ControllerDef) -> Router {
    Router::builder().reflector(reflector).controller(controller).build().unwrap()
}

fn request(method: Method, uri: &'static str) -> micro_dispatch::HttpRequest {
    micro_dispatch::HttpRequest::new(method, Uri::from_static(uri))
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn plain_route_answers_ok() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method("ping", handler_fn(|_, _| async { json!({"ok": true}) }), |m| m.get("/ping"))
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users/ping")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::OK);
    assert_eq!(http.response().body(), Some(json!({"ok": true})));
}

#[tokio::test]
async fn post_defaults_to_created() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method("create", handler_fn(|_, _| async { json!({"id": 1}) }), |m| m.post("/"))
        .method("touch", handler_fn(|_, _| async { json!({"id": 1}) }), |m| {
            m.post("/touch").http_code(StatusCode::ACCEPTED)
        })
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::POST, "/users")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::CREATED);
    assert_eq!(http.response().body(), Some(json!({"id": 1})));

    let http = router.handle(request(Method::POST, "/users/touch")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn denied_guard_short_circuits() {
    let later_guard = counter();
    let target = counter();

    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .use_guards([guard_fn(|_, _| false).into()])
        .method(
            "index",
            handler_fn({
                let target = Arc::clone(&target);
                move |_, _| {
                    target.fetch_add(1, Ordering::SeqCst);
                    async { json!([]) }
                }
            }),
            |m| {
                let later_guard = Arc::clone(&later_guard);
                m.get("/").use_guards([guard_fn(move |_, _| {
                    later_guard.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .into()])
            },
        )
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::FORBIDDEN);
    assert_eq!(http.response().body().unwrap()["message"], json!("Forbidden resource"));
    assert_eq!(later_guard.load(Ordering::SeqCst), 0);
    assert_eq!(target.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_argument_runs_through_pipe() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method(
            "index",
            handler_fn(|_, args: Args| async move { json!({ "page": args.value(0).cloned() }) }),
            |m| m.get("/").param(ParamBinding::query(0).select("page").pipe(ParseIntPipe)),
        )
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users?page=3")).await.unwrap();
    assert_eq!(http.response().body(), Some(json!({"page": 3})));

    let http = router.handle(request(Method::GET, "/users?page=three")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn method_filter_catches_before_class_filter() {
    let method_filter = counter();
    let class_filter = counter();

    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .use_filters([{
            let class_filter = Arc::clone(&class_filter);
            filter_fn(Vec::new(), move |_, _| {
                class_filter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .into()
        }])
        .method(
            "show",
            handler_fn(|_, _| async { Err::<Value, _>(HttpException::not_found("user 7 not found")) }),
            |m| {
                let method_filter = Arc::clone(&method_filter);
                m.get("/:id").use_filters([filter_fn([ExceptionKind::NOT_FOUND], move |error, http| {
                    method_filter.fetch_add(1, Ordering::SeqCst);
                    http.response().set_status(error.status());
                    http.response().set_body(json!({"missing": true}));
                    Ok(())
                })
                .into()])
            },
        )
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users/7")).await.unwrap();
    assert_eq!(method_filter.load(Ordering::SeqCst), 1);
    assert_eq!(class_filter.load(Ordering::SeqCst), 0);
    assert_eq!(http.response().status(), StatusCode::NOT_FOUND);
    assert_eq!(http.response().body(), Some(json!({"missing": true})));
}

#[tokio::test]
async fn header_without_result_leaves_status_alone() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method("warm", handler_fn(|_, _| async {}), |m| m.put("/cache").header("X-Cache", "hit"))
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::PUT, "/users/cache")).await.unwrap();
    let cache = http.response().header(&HeaderName::from_static("x-cache"));
    assert_eq!(cache.as_ref().and_then(|value| value.to_str().ok()), Some("hit"));
    assert_eq!(http.response().status(), StatusCode::NOT_FOUND);
    assert!(http.response().body().is_none());
}

#[tokio::test]
async fn pipes_apply_route_then_binding_and_skip_raw_kinds() {
    let suffix = |tag: &'static str| {
        pipe_fn(move |value, _| match value {
            Value::String(s) => Ok(Value::String(format!("{s}{tag}"))),
            other => Ok(other),
        })
    };

    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .use_pipes([suffix("-class").into()])
        .method(
            "show",
            handler_fn(|_, args: Args| async move {
                json!({
                    "id": args.value(0).cloned(),
                    "session": args.value(1).cloned(),
                    "context": args.context(2).is_some(),
                })
            }),
            |m| {
                m.get("/:id")
                    .use_pipes([suffix("-method").into()])
                    .param(ParamBinding::param(0).select("id").pipe_ref(suffix("-binding")))
                    .param(ParamBinding::session(1))
                    .param(ParamBinding::context(2))
            },
        )
        .finish();
    let router = router(reflector, users);

    let session = json!({"user": "ann"});
    let http = router.handle_with_session(request(Method::GET, "/users/7"), session.clone()).await.unwrap();
    assert_eq!(
        http.response().body(),
        Some(json!({"id": "7-class-method-binding", "session": session, "context": true}))
    );
}

#[tokio::test]
async fn interceptors_nest_in_declaration_order() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let layer = |name: &'static str, log: &Arc<Mutex<Vec<String>>>| {
        let log = Arc::clone(log);
        interceptor_fn(move |_, _, next| {
            log.lock().unwrap().push(format!("{name} pre"));
            let log = Arc::clone(&log);
            next.inspect(move |_| log.lock().unwrap().push(format!("{name} post")))
        })
    };

    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .use_interceptors([layer("i1", &log).into()])
        .method(
            "index",
            handler_fn({
                let log = Arc::clone(&log);
                move |_, _| {
                    log.lock().unwrap().push("target".to_owned());
                    async { json!([]) }
                }
            }),
            |m| m.get("/").use_interceptors([layer("i2", &log).into()]),
        )
        .finish();
    let router = router(reflector, users);

    router.handle(request(Method::GET, "/users")).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["i1 pre", "i2 pre", "target", "i2 post", "i1 post"]);
}

#[tokio::test]
async fn interceptor_can_replace_the_result() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .set_metadata("envelope", json!("data"))
        .method("index", handler_fn(|_, _| async { json!(["ann"]) }), |m| {
            m.get("/").use_interceptors([interceptor_fn(|ctx, _, next| {
                let key = ctx.get_metadata("envelope").and_then(Value::as_str).unwrap_or("value").to_owned();
                next.map(move |value| {
                    value.map(|value| {
                        let mut envelope = Map::new();
                        envelope.insert(key, value);
                        Value::Object(envelope)
                    })
                })
            })
            .into()])
        })
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users")).await.unwrap();
    assert_eq!(http.response().body(), Some(json!({"data": ["ann"]})));
}

#[tokio::test]
async fn unmatched_domain_errors_become_internal_errors() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method(
            "index",
            handler_fn(|_, _| async {
                Err::<Value, _>(DispatchError::domain("DatabaseError", std::io::Error::other("connection reset")))
            }),
            |m| m.get("/"),
        )
        .finish();
    let router = router(reflector, users);

    let http = router.handle(request(Method::GET, "/users")).await.unwrap();
    assert_eq!(http.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(http.response().body(), Some(json!({"statusCode": 500, "message": "Internal server error"})));
}

#[tokio::test]
async fn building_twice_behaves_identically() {
    let mut reflector = Reflector::new();
    let users = reflector
        .controller::<UserController>("/users")
        .method(
            "show",
            handler_fn(|_, args: Args| async move { json!({ "id": args.value(0).cloned() }) }),
            |m| m.get("/:id").header("X-Served-By", "users").param(ParamBinding::param(0).select("id").pipe(ParseIntPipe)),
        )
        .finish();
    let reflector = Arc::new(reflector);

    let first = Router::builder().reflector(Arc::clone(&reflector)).controller(users.clone()).build().unwrap();
    let second = Router::builder().reflector(reflector).controller(users).build().unwrap();

    for uri in ["/users/7", "/users/seven"] {
        let a = first.handle(request(Method::GET, uri)).await.unwrap();
        let b = second.handle(request(Method::GET, uri)).await.unwrap();
        assert_eq!(a.response().status(), b.response().status());
        assert_eq!(a.response().body(), b.response().body());
        assert_eq!(a.response().headers(), b.response().headers());
    }
}
