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
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
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
    use crate::auth::{extractors::TOKEN_HEADER, jwt::JwtKeys, policy::grant_role};
    use crate::users::repo_types::{ProfileChanges, Role, User};
    use axum::{
        body::Body,
        extract::FromRef,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(TOKEN_HEADER, t);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&b).unwrap())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, name: &str, email: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "name": name, "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["success"], true);
        body["token"].as_str().unwrap().to_string()
    }

    async fn me(app: &Router, token: &str) -> Value {
        let (status, body) = send(app, Method::GET, "/api/auth/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }

    async fn make_admin(state: &AppState, id: Uuid) {
        let current = state.users.find_by_id(id).await.unwrap().unwrap();
        let bootstrap = User {
            role: Role::Admin,
            ..current
        };
        state
            .users
            .update(id, &ProfileChanges::default(), grant_role(&bootstrap, Some(Role::Admin)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let req = Request::get("/api/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_login_update_flow() {
        let app = build_app(AppState::fake());

        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let ann = me(&app, &ann_token).await;
        assert_eq!(ann["name"], "Ann");
        assert_eq!(ann["role"], "user");
        assert!(ann.get("passwordHash").is_none());
        assert!(ann.get("password_hash").is_none());
        let ann_id = ann["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ann@x.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["msg"], "Invalid credentials");

        let (status, unknown) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, body);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ann@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let login_token = body["token"].as_str().unwrap().to_string();
        assert_eq!(me(&app, &login_token).await["id"], ann_id.as_str());

        let bob_token = register(&app, "Bob", "bob@x.com", "secret2").await;
        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{ann_id}"),
            Some(&bob_token),
            Some(json!({ "name": "Hacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(me(&app, &ann_token).await["name"], "Ann");

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{ann_id}"),
            Some(&ann_token),
            Some(json!({ "name": "Ann B", "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Ann B");
        assert_eq!(body["data"]["role"], "user");
    }

    #[tokio::test]
    async fn non_admin_role_of_any_value_is_dropped_and_rest_applies() {
        let app = build_app(AppState::fake());
        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let ann_id = me(&app, &ann_token).await["id"].as_str().unwrap().to_string();

        for role in [json!("superadmin"), json!(42), json!({ "level": "root" })] {
            let (status, body) = send(
                &app,
                Method::PUT,
                &format!("/api/users/{ann_id}"),
                Some(&ann_token),
                Some(json!({ "name": "Annie", "role": role })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(body["data"]["name"], "Annie");
            assert_eq!(body["data"]["role"], "user");
        }
        assert_eq!(me(&app, &ann_token).await["name"], "Annie");
    }

    #[tokio::test]
    async fn admin_naming_unknown_role_gets_fixed_validation_message() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let root_token = register(&app, "Root", "root@x.com", "secret1").await;
        let root_id = me(&app, &root_token).await["id"].as_str().unwrap().parse().unwrap();
        make_admin(&state, root_id).await;
        let bob_token = register(&app, "Bob", "bob@x.com", "secret2").await;
        let bob_id = me(&app, &bob_token).await["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{bob_id}"),
            Some(&root_token),
            Some(json!({ "name": "Robert", "role": "superadmin" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "Role must be one of: user, admin");
        assert_eq!(me(&app, &bob_token).await["name"], "Bob");
    }

    #[tokio::test]
    async fn malformed_body_does_not_echo_parser_details() {
        let app = build_app(AppState::fake());
        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let ann_id = me(&app, &ann_token).await["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{ann_id}"),
            Some(&ann_token),
            Some(json!({ "name": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "Invalid request body");
        assert!(!body.to_string().contains("line"));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = build_app(AppState::fake());
        register(&app, "Ann", "ann@x.com", "secret1").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ann 2", "email": "ann@x.com", "password": "secret9" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "duplicate_email");
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_core() {
        let app = build_app(AppState::fake());
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "name": "Ann", "email": "nope", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ann@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn gate_rejections_all_look_the_same() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let ann_id: Uuid = me(&app, &token).await["id"].as_str().unwrap().parse().unwrap();

        let (missing_status, missing) = send(&app, Method::GET, "/api/auth/me", None, None).await;
        let (bad_status, bad) =
            send(&app, Method::GET, "/api/auth/me", Some("garbage.token.here"), None).await;

        let keys = JwtKeys::from_ref(&state);
        let stale = keys
            .issue_at(ann_id, time::OffsetDateTime::now_utc() - time::Duration::hours(1))
            .unwrap();
        let (stale_status, stale_body) =
            send(&app, Method::GET, "/api/auth/me", Some(&stale), None).await;

        state.users.delete(ann_id).await.unwrap();
        let (gone_status, gone) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;

        for status in [missing_status, bad_status, stale_status, gone_status] {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(missing, bad);
        assert_eq!(bad, stale_body);
        assert_eq!(stale_body, gone);
    }

    #[tokio::test]
    async fn admin_routes_require_admin() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let bob_token = register(&app, "Bob", "bob@x.com", "secret2").await;
        let bob_id = me(&app, &bob_token).await["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::GET, "/api/users", Some(&ann_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/users/{bob_id}"),
            Some(&ann_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let ann_id = me(&app, &ann_token).await["id"].as_str().unwrap().parse().unwrap();
        make_admin(&state, ann_id).await;

        let (status, body) = send(&app, Method::GET, "/api/users", Some(&ann_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/users/{bob_id}"),
            Some(&ann_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "bob@x.com");

        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/api/users/{}", Uuid::new_v4()),
            Some(&ann_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(&app, Method::GET, "/api/users/not-a-uuid", Some(&ann_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_can_promote_and_delete_others() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let root_token = register(&app, "Root", "root@x.com", "secret1").await;
        let root_id = me(&app, &root_token).await["id"].as_str().unwrap().parse().unwrap();
        make_admin(&state, root_id).await;

        let bob_token = register(&app, "Bob", "bob@x.com", "secret2").await;
        let bob_id = me(&app, &bob_token).await["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{bob_id}"),
            Some(&root_token),
            Some(json!({ "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "admin");

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/api/users/{bob_id}"),
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], "User deleted");

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/users/{bob_id}"),
            Some(&root_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn owner_can_delete_self_but_not_others() {
        let app = build_app(AppState::fake());
        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        let bob_token = register(&app, "Bob", "bob@x.com", "secret2").await;
        let ann_id = me(&app, &ann_token).await["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/users/{ann_id}"),
            Some(&bob_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::DELETE,
            "/api/users/not-a-uuid",
            Some(&bob_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/users/{ann_id}"),
            Some(&ann_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn email_change_to_taken_address_conflicts() {
        let app = build_app(AppState::fake());
        let ann_token = register(&app, "Ann", "ann@x.com", "secret1").await;
        register(&app, "Bob", "bob@x.com", "secret2").await;
        let ann_id = me(&app, &ann_token).await["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/api/users/{ann_id}"),
            Some(&ann_token),
            Some(json!({ "email": "bob@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
