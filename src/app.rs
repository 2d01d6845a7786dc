use std::net::SocketAddr;

use axum::{http::Method, middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::guard::{auth_guard, role_guard, RoutePolicy};
use crate::state::AppState;
use crate::users::repo::Role;
use crate::{auth, products, users};

/// Route table for the guards, keyed by method + matched-path template.
/// Everything not listed here requires a valid bearer token and nothing more.
pub fn route_policy() -> RoutePolicy {
    RoutePolicy::new()
        .public(Method::POST, "/api/v1/auth/register")
        .public(Method::POST, "/api/v1/auth/login")
        .public(Method::GET, "/api/v1/health")
        .public(Method::GET, "/api/v1/products")
        .public(Method::GET, "/api/v1/products/:id")
        .restrict(
            Method::POST,
            "/api/v1/products",
            &[Role::Seller, Role::Admin],
        )
        .restrict(
            Method::PATCH,
            "/api/v1/products/:id",
            &[Role::Seller, Role::Admin],
        )
        .restrict(Method::DELETE, "/api/v1/products/:id", &[Role::Admin])
        .restrict(Method::GET, "/api/v1/users", &[Role::Admin])
        .restrict(Method::POST, "/api/v1/users", &[Role::Admin])
        .restrict(Method::GET, "/api/v1/users/:id", &[Role::Admin])
        .restrict(Method::PATCH, "/api/v1/users/:id", &[Role::Admin])
        .restrict(Method::DELETE, "/api/v1/users/:id", &[Role::Admin])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(products::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state.clone())
        // later layer() calls wrap earlier ones: auth runs first, then role
        .layer(middleware::from_fn_with_state(state.clone(), role_guard))
        .layer(middleware::from_fn_with_state(state, auth_guard))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
