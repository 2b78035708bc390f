use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, name: &str, email: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/users",
            None,
            Some(json!({ "name": name, "email": email, "password": "Passw0rd" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn login(app: &Router, email: &str) -> (String, String) {
        let (status, body) = call(
            app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "Passw0rd" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_refresh_logout_over_http() {
        let app = build_app(AppState::fake());
        let id = register(&app, "Ann", "a@x.com").await;
        let (access, refresh) = login(&app, "a@x.com").await;

        let (status, me) = call(&app, "GET", "/api/me", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], id.as_str());
        assert!(me.get("password_hash").is_none());

        let (status, rotated) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rotated["token_type"], "Bearer");
        assert_eq!(rotated["expires_in"], 15 * 60);
        let new_refresh = rotated["refresh_token"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/logout",
            Some(&access),
            Some(json!({ "refresh_token": new_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": new_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn bad_login_is_unauthorized() {
        let app = build_app(AppState::fake());
        register(&app, "Ann", "a@x.com").await;

        let (s1, b1) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "Wrong0ne" })),
        )
        .await;
        let (s2, b2) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "Passw0rd" })),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(b1, b2);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, "GET", "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/api/users", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/logout",
            None,
            Some(json!({ "refresh_token": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_changes_are_self_only() {
        let app = build_app(AppState::fake());
        let ann = register(&app, "Ann", "a@x.com").await;
        let bob = register(&app, "Bob", "b@x.com").await;
        let (access, _) = login(&app, "a@x.com").await;

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/users/profile/detail/{bob}"),
            Some(&access),
            Some(json!({ "name": "Mallory" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/users/profile/detail/{ann}"),
            Some(&access),
            Some(json!({ "name": "Annie" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Annie");

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/users/profile/email/{ann}"),
            Some(&access),
            Some(json!({ "email": "b@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn user_lookup_routes() {
        let app = build_app(AppState::fake());
        let ann = register(&app, "Ann", "a@x.com").await;
        let (access, _) = login(&app, "a@x.com").await;

        let (status, list) = call(&app, "GET", "/api/users", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, found) = call(&app, "GET", "/api/users/email/a@x.com", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], ann.as_str());

        let (_, exists) = call(&app, "GET", &format!("/api/users/exists/{ann}"), Some(&access), None).await;
        assert_eq!(exists["exists"], true);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = call(&app, "GET", &format!("/api/users/{missing}"), Some(&access), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, verdict) = call(
            &app,
            "POST",
            "/api/users/verify",
            None,
            Some(json!({ "email": "a@x.com", "password": "Passw0rd" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["is_valid"], true);
    }

    #[tokio::test]
    async fn password_change_ends_refresh_session() {
        let app = build_app(AppState::fake());
        let ann = register(&app, "Ann", "a@x.com").await;
        let (access, refresh) = login(&app, "a@x.com").await;

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/users/profile/password/{ann}"),
            Some(&access),
            Some(json!({ "old_password": "Passw0rd", "new_password": "NewPassw0rd" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "DELETE", &format!("/api/users/{ann}"), Some(&access), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
