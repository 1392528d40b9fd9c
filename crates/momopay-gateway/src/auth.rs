// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token middleware for the webhook and the operator surface.
//!
//! Each surface has its own token. A surface with no token configured
//! rejects every request (fail-closed).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use momopay_security::tokens_match;

/// Expected token for one route group.
#[derive(Clone)]
pub struct AuthConfig {
    /// Which surface this guards, for logs.
    pub surface: &'static str,
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    pub fn new(surface: &'static str, bearer_token: Option<String>) -> Self {
        Self {
            surface,
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("surface", &self.surface)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Rejects the request with 401 unless it carries the surface's bearer token.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = auth.bearer_token.as_deref() else {
        tracing::error!(surface = auth.surface, "no token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if tokens_match(token, expected) => Ok(next.run(request).await),
        _ => {
            tracing::debug!(surface = auth.surface, path = %request.uri().path(), "auth rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn app(token: Option<&str>) -> Router {
        Router::new()
            .route("/guarded", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(
                AuthConfig::new("test", token.map(str::to_string)),
                auth_middleware,
            ))
    }

    async fn status(app: Router, header: Option<&str>) -> StatusCode {
        let mut request = Request::builder().uri("/guarded");
        if let Some(value) = header {
            request = request.header("authorization", value);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn valid_token_passes() {
        assert_eq!(status(app(Some("s3cret")), Some("Bearer s3cret")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_or_missing_token_is_rejected() {
        assert_eq!(
            status(app(Some("s3cret")), Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(app(Some("s3cret")), None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(app(Some("s3cret")), Some("s3cret")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_surface_fails_closed() {
        assert_eq!(status(app(None), Some("Bearer anything")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status(app(Some("")), Some("Bearer ")).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", AuthConfig::new("admin", Some("s3cret".into())));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[redacted]"));
    }
}
