use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, Uri};
use micro_dispatch::{
    Args, Component, DispatchError, DispatchResult, ExceptionKind, ExecutionContext, Guard, HttpContext, HttpException,
    HttpRequest, ParamBinding, ParseIntPipe, Reflector, Renderer, Router, filter_fn, handler_fn, interceptor_fn,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

struct UserController;

#[derive(Deserialize, Debug)]
struct NewUser {
    name: String,
    zip: String,
}

/// Allows the request when the bearer token carries one of the roles declared as `roles`.
struct RolesGuard;

#[async_trait]
impl Guard for RolesGuard {
    async fn can_activate(&self, ctx: &ExecutionContext, http: &Arc<HttpContext>) -> DispatchResult<bool> {
        let Some(roles) = ctx.get_metadata("roles").and_then(Value::as_array) else {
            return Ok(true);
        };
        let role = http.header(AUTHORIZATION.as_str()).and_then(|token| token.strip_prefix("Bearer "));
        Ok(roles.iter().any(|allowed| allowed.as_str() == role))
    }
}

struct PlainRenderer;

#[async_trait]
impl Renderer for PlainRenderer {
    async fn render(&self, template: &str, value: Option<Value>, http: &HttpContext) -> DispatchResult<()> {
        let page = format!("<h1>{template}</h1><pre>{}</pre>", value.unwrap_or(Value::Null));
        http.response().set_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        http.response().set_status(http::StatusCode::OK);
        http.response().set_body(Value::String(page));
        Ok(())
    }
}

async fn show(_: Arc<HttpContext>, args: Args) -> DispatchResult<Value> {
    let id: u64 = args.parse(0)?;
    if id > 100 {
        return Err(HttpException::not_found(format!("user {id} not found")).into());
    }
    Ok(json!({ "id": id, "name": "ann" }))
}

async fn create(_: Arc<HttpContext>, args: Args) -> DispatchResult<Value> {
    let user: NewUser = args.parse(0)?;
    info!(?user, "creating user");
    Ok(json!({ "id": 101, "name": user.name, "zip": user.zip }))
}

fn declare(reflector: &mut Reflector) -> micro_dispatch::ControllerDef {
    reflector
        .resources::<UserController>("users", None)
        .set_metadata("roles", json!(["admin", "reader"]))
        .use_guards([Component::guard(RolesGuard)])
        .use_interceptors([interceptor_fn(|ctx, _, next| {
            let handler = ctx.get_handler().to_owned();
            let started = Instant::now();
            next.inspect(move |_| info!(handler = %handler, elapsed = ?started.elapsed(), "handled"))
        })
        .into()])
        .use_filters([filter_fn([ExceptionKind::NOT_FOUND], |error: DispatchError, http: &HttpContext| {
            http.response().set_status(error.status());
            http.response().set_body(json!({ "error": error.to_string() }));
            Ok(())
        })
        .into()])
        .method("index", handler_fn(|_, _| async { json!([{ "id": 1, "name": "ann" }]) }), |m| m)
        .method("show", handler_fn(show), |m| {
            m.header("Cache-Control", "max-age=60").param(ParamBinding::param(0).select("id").pipe(ParseIntPipe))
        })
        .method("create", handler_fn(create), |m| m.set_metadata("roles", json!(["admin"])).param(ParamBinding::body(0)))
        .method("profile", handler_fn(show), |m| {
            m.get("/:id/profile").render("users/profile").param(ParamBinding::param(0).select("id").pipe(ParseIntPipe))
        })
        .finish()
}

fn request(method: Method, uri: &'static str, role: &'static str) -> HttpRequest {
    HttpRequest::new(method, Uri::from_static(uri)).with_header(AUTHORIZATION, HeaderValue::from_static(role))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut reflector = Reflector::new();
    let users = declare(&mut reflector);
    let router = Router::builder().reflector(reflector).renderer(PlainRenderer).controller(users).build().unwrap();

    let requests = [
        request(Method::GET, "/users", "Bearer reader"),
        request(Method::GET, "/users/7", "Bearer reader"),
        request(Method::GET, "/users/seven", "Bearer reader"),
        request(Method::GET, "/users/404", "Bearer reader"),
        request(Method::GET, "/users/7/profile", "Bearer reader"),
        request(Method::POST, "/users", "Bearer reader").with_body(json!({ "name": "bob", "zip": "10115" })),
        request(Method::POST, "/users", "Bearer admin").with_body(json!({ "name": "bob", "zip": "10115" })),
        request(Method::DELETE, "/users/7", "Bearer admin"),
    ];

    for request in requests {
        let method = request.method().clone();
        let path = request.uri().to_string();
        match router.handle(request).await {
            Ok(http) => {
                let response = http.response().to_http();
                info!(%method, %path, status = %response.status(), body = ?response.body(), "response");
            }
            Err(e) => info!(%method, %path, cause = %e, "request failed"),
        }
    }
}
