use std::collections::{HashMap, HashSet};

use axum::{
    extract::{FromRef, MatchedPath, Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::Role;

/// Declarative route table consumed by the guards. Routes are identified by
/// `"METHOD matched-path-template"`; anything absent from both tables is
/// protected (any valid token) with no role requirement.
#[derive(Debug, Default, Clone)]
pub struct RoutePolicy {
    public: HashSet<String>,
    roles: HashMap<String, Vec<Role>>,
}

fn route_key(method: &Method, path: &str) -> String {
    format!("{} {}", method, path)
}

impl RoutePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(mut self, method: Method, path: &str) -> Self {
        self.public.insert(route_key(&method, path));
        self
    }

    pub fn restrict(mut self, method: Method, path: &str, roles: &[Role]) -> Self {
        self.roles.insert(route_key(&method, path), roles.to_vec());
        self
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.public.contains(&route_key(method, path))
    }

    pub fn required_roles(&self, method: &Method, path: &str) -> Option<&[Role]> {
        self.roles.get(&route_key(method, path)).map(Vec::as_slice)
    }
}

/// Default-deny gate: public routes pass untouched, everything else needs a
/// valid bearer token. On success the decoded claims are attached to the
/// request for the role guard and the handlers.
pub async fn auth_guard(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // No matched route: let the router answer 404
    let Some(path) = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned())
    else {
        return Ok(next.run(req).await);
    };

    if state.policy.is_public(req.method(), &path) {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingToken)?;
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::MissingToken)?;

    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, path = %path, "rejected bearer token");
        ApiError::InvalidToken
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Runs after the auth guard. Routes without a declared role set pass; the
/// rest require the attached identity to hold one of the listed roles.
pub async fn role_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(path) = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned())
    else {
        return Ok(next.run(req).await);
    };

    let Some(required) = state.policy.required_roles(req.method(), &path) else {
        return Ok(next.run(req).await);
    };

    // A restricted route with no attached identity never passes
    let Some(claims) = req.extensions().get::<Claims>() else {
        warn!(path = %path, "role-restricted route reached without claims");
        return Err(ApiError::Forbidden);
    };

    if required.contains(&claims.role) {
        Ok(next.run(req).await)
    } else {
        warn!(user_id = %claims.sub, role = ?claims.role, path = %path, "role not allowed");
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    fn policy() -> RoutePolicy {
        RoutePolicy::new()
            .public(Method::GET, "/things")
            .restrict(Method::DELETE, "/things/:id", &[Role::Admin])
    }

    #[test]
    fn public_lookup_matches_method_and_path() {
        let policy = policy();
        assert!(policy.is_public(&Method::GET, "/things"));
        assert!(!policy.is_public(&Method::POST, "/things"));
        assert!(!policy.is_public(&Method::GET, "/other"));
    }

    #[test]
    fn role_lookup_returns_declared_set() {
        let policy = policy();
        assert_eq!(
            policy.required_roles(&Method::DELETE, "/things/:id"),
            Some(&[Role::Admin][..])
        );
        assert_eq!(policy.required_roles(&Method::GET, "/things/:id"), None);
    }
}

#[cfg(test)]
mod guard_tests {
    use super::*;
    use crate::auth::extractors::CurrentUser;
    use crate::users::repo::{User, UserStatus};
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use jsonwebtoken::{DecodingKey, EncodingKey};
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn make_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "guard@test.com".into(),
            password_hash: "irrelevant".into(),
            first_name: None,
            last_name: None,
            phone: None,
            role,
            status: UserStatus::Active,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    // Stub handlers on the real route templates; the policy under test is the
    // real one from app::route_policy()
    fn test_app() -> (Router, AppState) {
        let state = AppState::fake();
        let app = Router::new()
            .nest(
                "/api/v1",
                Router::new()
                    .route("/health", get(|| async { "ok" }))
                    .route("/products", get(|| async { "products" }))
                    .route(
                        "/me",
                        get(|CurrentUser(claims): CurrentUser| async move { claims.email }),
                    )
                    .route("/users", get(|| async { "users" })),
            )
            .layer(middleware::from_fn_with_state(state.clone(), role_guard))
            .layer(middleware::from_fn_with_state(state.clone(), auth_guard));
        (app, state)
    }

    fn bearer(state: &AppState, role: Role) -> String {
        let keys = JwtKeys::from_ref(state);
        format!("Bearer {}", keys.sign(&make_user(role)).unwrap())
    }

    async fn send(app: Router, uri: &str, auth: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn public_route_needs_no_token() {
        let (app, _) = test_app();
        let response = send(app, "/api/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_header_is_401() {
        let (app, _) = test_app();
        let response = send(app, "/api/v1/me", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_scheme_is_401() {
        let (app, _) = test_app();
        let response = send(app, "/api/v1/me", Some("Basic abc123")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_is_401() {
        let (app, _) = test_app();
        let response = send(app, "/api/v1/me", Some("Bearer not-a-jwt")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_401() {
        let (app, state) = test_app();
        // Same secret and issuer as the app, but already expired
        let expired = JwtKeys {
            encoding: EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            decoding: DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            issuer: state.config.jwt.issuer.clone(),
            audience: state.config.jwt.audience.clone(),
            ttl_minutes: -5,
        };
        let token = expired.sign(&make_user(Role::Customer)).unwrap();
        let response = send(app, "/api/v1/me", Some(&format!("Bearer {token}"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_claims() {
        let (app, state) = test_app();
        let auth = bearer(&state, Role::Customer);
        let response = send(app, "/api/v1/me", Some(&auth)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"guard@test.com");
    }

    #[tokio::test]
    async fn customer_on_admin_route_is_403() {
        let (app, state) = test_app();
        let auth = bearer(&state, Role::Customer);
        let response = send(app, "/api/v1/users", Some(&auth)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn seller_on_admin_route_is_403() {
        let (app, state) = test_app();
        let auth = bearer(&state, Role::Seller);
        let response = send(app, "/api/v1/users", Some(&auth)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_on_admin_route_is_200() {
        let (app, state) = test_app();
        let auth = bearer(&state, Role::Admin);
        let response = send(app, "/api/v1/users", Some(&auth)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_route_without_token_is_401_not_403() {
        // The auth guard answers before the role guard ever runs
        let (app, _) = test_app();
        let response = send(app, "/api/v1/users", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
