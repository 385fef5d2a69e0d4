//! HTTP backend of the SOS emergency app admin dashboard.
//!
//! Serves the operator sign-in flow and a guarded JSON API over the content
//! collections, the app users and the administrator registry.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use state::{AppState, StartupError};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/error", delete(auth::clear_error))
        .route("/auth/session", get(auth::session))
        .route("/auth/refresh", post(auth::refresh))
        .route(sos_admin_platform_access::SIGN_IN_PATH, get(auth::sign_in_page))
        .nest("/api", api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use sos_admin_core::IdentityId;
    use sos_admin_platform_access::{AccessConfig, MemoryIdentityProvider};
    use sos_admin_store::MemoryDocumentStore;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        store: Arc<MemoryDocumentStore>,
    }

    impl TestApp {
        fn new() -> Self {
            let provider = MemoryIdentityProvider::new();
            provider.add_account(
                IdentityId::new("root").expect("valid id"),
                "admin@sos.com",
                "secret",
            );
            provider.add_account(
                IdentityId::new("stranger").expect("valid id"),
                "stranger@example.com",
                "secret",
            );
            let store = Arc::new(MemoryDocumentStore::new());
            let state = Arc::new(AppState::new(
                Arc::new(provider),
                store.clone(),
                &AccessConfig::default(),
            ));
            Self {
                router: router(state.clone()),
                state,
                store,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router
                .clone()
                .oneshot(request)
                .await
                .expect("response")
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
        }

        async fn delete(&self, uri: &str) -> Response {
            self.send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .expect("valid request"),
            )
            .await
        }

        async fn send_json(&self, method: &str, uri: &str, body: Value) -> Response {
            self.send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("valid request"),
            )
            .await
        }

        /// Lets the identity listener catch up on sign-in and sign-out
        /// events, then waits for the session to stop loading.
        async fn settle(&self) {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            self.state
                .sessions
                .watch()
                .wait_for(|session| !session.is_loading())
                .await
                .expect("session channel open");
        }

        async fn login(&self, email: &str, password: &str) -> Response {
            let response = self
                .send_json(
                    "POST",
                    "/auth/login",
                    json!({ "email": email, "password": password }),
                )
                .await;
            self.settle().await;
            response
        }

        async fn logout(&self) -> Response {
            let response = self.send_json("POST", "/auth/logout", json!({})).await;
            self.settle().await;
            response
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn signed_out_requests_redirect_to_sign_in() {
        let app = TestApp::new();
        let response = app.get("/api/dashboard").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).map(|v| v.as_bytes()),
            Some(b"/login".as_slice())
        );

        assert_eq!(app.get("/login").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bootstrap_operator_signs_in_as_super_admin() {
        let app = TestApp::new();
        let response = app.login("admin@sos.com", "secret").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["role"], "super_admin");
        assert_eq!(body["superAdmin"], true);

        let response = app.get("/api/dashboard").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["emergencyNumbers"], 0);
        assert_eq!(body["admins"], 0);
        assert_eq!(body["operator"]["email"], "admin@sos.com");
    }

    #[tokio::test]
    async fn guarded_routes_wait_while_session_resolves() {
        let app = TestApp::new();
        assert_eq!(
            app.login("admin@sos.com", "secret").await.status(),
            StatusCode::OK
        );

        app.store.hold_reads(true);
        let refresh = tokio::spawn(app.router.clone().oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refresh")
                .body(Body::empty())
                .expect("valid request"),
        ));
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(app.state.sessions.session().is_loading());

        let response = app.get("/api/dashboard").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        app.store.hold_reads(false);
        let response = refresh.await.expect("task").expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.get("/api/dashboard").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = TestApp::new();
        let response = app.login("admin@sos.com", "wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let session = body_json(app.get("/auth/session").await).await;
        assert_eq!(session["authenticated"], false);
        assert_eq!(session["error"], "invalid email or password");
    }

    #[tokio::test]
    async fn unregistered_identity_is_forbidden_and_signed_out() {
        let app = TestApp::new();
        let response = app.login("stranger@example.com", "secret").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["error"],
            "stranger@example.com is not authorized to use the admin dashboard"
        );

        assert_eq!(app.get("/api/users").await.status(), StatusCode::SEE_OTHER);

        assert_eq!(app.delete("/auth/error").await.status(), StatusCode::NO_CONTENT);
        let session = body_json(app.get("/auth/session").await).await;
        assert_eq!(session["error"], Value::Null);
    }

    #[tokio::test]
    async fn operator_manages_emergency_numbers() {
        let app = TestApp::new();
        assert_eq!(
            app.login("admin@sos.com", "secret").await.status(),
            StatusCode::OK
        );

        let response = app
            .send_json(
                "POST",
                "/api/emergency-numbers",
                json!({ "name": " Police ", "number": "100", "category": "police" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["name"], "Police");
        let id = created["id"].as_str().expect("id").to_string();

        let response = app
            .send_json(
                "POST",
                "/api/emergency-numbers",
                json!({ "name": "", "number": "", "category": "" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .send_json(
                "PUT",
                &format!("/api/emergency-numbers/{id}"),
                json!({ "name": "Police", "number": "112", "category": "police" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["number"], "112");

        let response = app.delete(&format!("/api/emergency-numbers/{id}")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.get(&format!("/api/emergency-numbers/{id}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn super_admin_registers_operators() {
        let app = TestApp::new();
        assert_eq!(
            app.login("admin@sos.com", "secret").await.status(),
            StatusCode::OK
        );

        let response = app
            .send_json(
                "PUT",
                "/api/admins/stranger",
                json!({ "email": "stranger@example.com", "fullName": "Stranger" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let record = body_json(response).await;
        assert_eq!(record["role"], "admin");
        assert_eq!(record["isActive"], true);

        assert_eq!(app.logout().await.status(), StatusCode::NO_CONTENT);

        let response = app.login("stranger@example.com", "secret").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["role"], "admin");

        assert_eq!(app.get("/api/admins").await.status(), StatusCode::OK);

        let response = app
            .send_json("PUT", "/api/admins/root", json!({ "email": "admin@sos.com" }))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_user_is_not_found_but_history_is_empty() {
        let app = TestApp::new();
        app.login("admin@sos.com", "secret").await;

        assert_eq!(app.get("/api/users/nobody").await.status(), StatusCode::NOT_FOUND);

        let response = app.get("/api/users/nobody/sos-history?limit=5").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }
}
