//! HTTP API tests over the in-memory backend

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use voyage_tracker::{
    backend::{memory::MemoryBackend, AuthEvent, AuthProvider, DataStore},
    models::Registration,
    server::{router, AppState},
};

struct TestApp {
    backend: Arc<MemoryBackend>,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let state = AppState::new(backend.clone(), backend.clone(), Duration::from_secs(30));
        Self {
            backend,
            app: router(state),
        }
    }

    async fn sign_up(&self, email: &str, username: &str) -> Uuid {
        let registration = Registration {
            email: email.to_string(),
            password: "secret123".to_string(),
            confirm_password: "secret123".to_string(),
            username: username.to_string(),
            name: "Test User".to_string(),
        };
        self.backend.sign_up(&registration).await.unwrap().id
    }

    async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"email": email, "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

fn voyage_form(name: &str) -> Value {
    json!({
        "name": name,
        "vesselId": "IMO9321483",
        "destination": "Rotterdam",
        "etaDate": "2030-05-01",
        "etaTime": "08:30",
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, _) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_gets_not_found_notice() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["notice"]["title"], "Page not found");
    assert_eq!(body["notice"]["variant"], "destructive");
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": "alice@example.com",
                "password": "secret123",
                "confirmPassword": "secret123",
                "username": "alice",
                "name": "Alice",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["notice"]["title"], "Registration successful");

    let token = app.login("alice@example.com").await;
    let (status, body) = app
        .request(Method::GET, "/auth/session", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display_name"], "alice");
    assert_eq!(body["data"]["is_admin"], false);
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": "bob@example.com",
                "password": "secret123",
                "confirmPassword": "secret124",
                "username": "bob",
                "name": "Bob",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["notice"]["title"], "Registration failed");
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = TestApp::new();
    app.sign_up("carol@example.com", "carol").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "carol@example.com", "password": "nope-nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["notice"]["title"], "Login failed");
}

#[tokio::test]
async fn test_protected_routes_need_a_session() {
    let app = TestApp::new();
    for uri in ["/voyages", "/trips/successful", "/admin/users", "/auth/session"] {
        let (status, body) = app.request(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["notice"]["title"], "Authentication required");
    }

    let (status, _) = app
        .request(Method::GET, "/voyages", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::new();
    app.sign_up("dave@example.com", "dave").await;
    let token = app.login("dave@example.com").await;

    let (status, _) = app
        .request(Method::POST, "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(Method::GET, "/voyages", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_filter_voyages() {
    let app = TestApp::new();
    app.sign_up("erin@example.com", "erin").await;
    let token = app.login("erin@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/voyages",
            Some(&token),
            Some(voyage_form("Nordic Star")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "in-transit");
    assert_eq!(body["data"]["addedBy"], "erin");
    assert_eq!(body["data"]["eta"], "2030-05-01T08:30:00Z");
    assert_eq!(
        body["notice"]["description"],
        "Nordic Star has been added to the tracking system"
    );
    let first_id = body["data"]["id"].as_str().unwrap().to_string();

    app.request(
        Method::POST,
        "/voyages",
        Some(&token),
        Some(voyage_form("Baltic Queen")),
    )
    .await;

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/voyages/{first_id}/status"),
            Some(&token),
            Some(json!({"status": "delayed"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = app
        .request(Method::GET, "/voyages?status=all", Some(&token), None)
        .await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let (_, delayed) = app
        .request(Method::GET, "/voyages?status=delayed", Some(&token), None)
        .await;
    let delayed = delayed["data"].as_array().unwrap();
    assert_eq!(delayed.len(), 1);
    assert_eq!(delayed[0]["name"], "Nordic Star");

    let (_, docked) = app
        .request(Method::GET, "/voyages?status=docked", Some(&token), None)
        .await;
    assert!(docked["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_voyage_with_blank_field() {
    let app = TestApp::new();
    app.sign_up("frank@example.com", "frank").await;
    let token = app.login("frank@example.com").await;

    let mut form = voyage_form("Arctic Tern");
    form["destination"] = json!("   ");
    let (status, body) = app
        .request(Method::POST, "/voyages", Some(&token), Some(form))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["notice"]["title"], "Missing information");
    assert_eq!(
        body["notice"]["description"],
        "Please fill in all required fields"
    );

    let (_, listed) = app
        .request(Method::GET, "/voyages", Some(&token), None)
        .await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_mark_successful_moves_voyage_to_archive() {
    let app = TestApp::new();
    app.sign_up("gina@example.com", "gina").await;
    let token = app.login("gina@example.com").await;

    let (_, created) = app
        .request(
            Method::POST,
            "/voyages",
            Some(&token),
            Some(voyage_form("Sea Falcon")),
        )
        .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/voyages/{id}/successful"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notice"]["title"], "Trip completed");

    let (_, active) = app
        .request(Method::GET, "/voyages", Some(&token), None)
        .await;
    assert!(active["data"].as_array().unwrap().is_empty());

    let (_, archive) = app
        .request(Method::GET, "/trips/successful", Some(&token), None)
        .await;
    let archive = archive["data"].as_array().unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0]["vessel_name"], "Sea Falcon");
    assert_eq!(archive[0]["trip_id"], id.as_str());

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/voyages/{id}/successful"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_mark_unknown_voyage_successful() {
    let app = TestApp::new();
    app.sign_up("hank@example.com", "hank").await;
    let token = app.login("hank@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/voyages/{}/successful", Uuid::new_v4()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["notice"]["title"], "Failed to mark as successful");
}

#[tokio::test]
async fn test_admin_routes_refuse_regular_users() {
    let app = TestApp::new();
    let other = app.sign_up("ivy@example.com", "ivy").await;
    app.sign_up("jack@example.com", "jack").await;
    let token = app.login("jack@example.com").await;

    let (status, body) = app
        .request(Method::GET, "/admin/users", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["notice"]["title"], "Access denied");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/admin/users/{other}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.backend.fetch_profile(other).await.unwrap().is_some());
}

#[tokio::test]
async fn test_admin_manages_users() {
    let app = TestApp::new();
    let admin = app.sign_up("kate@example.com", "kate").await;
    let member = app.sign_up("liam@example.com", "liam").await;
    app.backend.add_admin(admin).await.unwrap();
    let token = app.login("kate@example.com").await;

    let (status, body) = app
        .request(Method::GET, "/admin/users", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    let kate = users.iter().find(|u| u["username"] == "kate").unwrap();
    assert_eq!(kate["is_admin"], true);

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/admin/users/{member}/admin"),
            Some(&token),
            Some(json!({"admin": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice"]["title"], "Admin added");
    assert!(app.backend.is_admin(member).await.unwrap());

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/admin/users/{admin}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/admin/users/{member}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notice"]["title"], "User deleted");

    let (_, body) = app
        .request(Method::GET, "/admin/users", Some(&token), None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new();
    app.sign_up("mia@example.com", "mia").await;
    let token = app.login("mia@example.com").await;

    let (status, body) = app
        .request(
            Method::PUT,
            "/settings/password",
            Some(&token),
            Some(json!({
                "currentPassword": "secret123",
                "newPassword": "short",
                "confirmPassword": "short",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .request(
            Method::PUT,
            "/settings/password",
            Some(&token),
            Some(json!({
                "currentPassword": "secret123",
                "newPassword": "much-longer-secret",
                "confirmPassword": "much-longer-secret",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notice"]["title"], "Password updated");

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "mia@example.com", "password": "much-longer-secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reset_password_does_not_reveal_accounts() {
    let app = TestApp::new();
    app.sign_up("noah@example.com", "noah").await;

    for email in ["noah@example.com", "ghost@example.com"] {
        let (status, body) = app
            .request(
                Method::POST,
                "/auth/reset-password",
                None,
                Some(json!({ "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"]["title"], "Success");
    }
}

#[tokio::test]
async fn test_backend_failure_is_reported() {
    let app = TestApp::new();
    app.sign_up("olga@example.com", "olga").await;
    let token = app.login("olga@example.com").await;
    app.backend.fail_on("list_trips").await;

    let (status, body) = app
        .request(Method::GET, "/voyages", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["notice"]["title"], "Error fetching vessels");
}

#[tokio::test]
async fn test_empty_eta_date_is_missing_information() {
    let app = TestApp::new();
    app.sign_up("pia@example.com", "pia").await;
    let token = app.login("pia@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/voyages",
            Some(&token),
            Some(json!({"name": "N", "vesselId": "V", "destination": "D", "etaDate": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["notice"]["title"], "Missing information");
    assert_eq!(body["notice"]["variant"], "destructive");
}

#[tokio::test]
async fn test_login_without_password_gets_notice() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "a@x.io"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["notice"]["title"], "Login failed");
    assert_eq!(
        body["notice"]["description"],
        "Email and password are required"
    );
}

#[tokio::test]
async fn test_malformed_requests_get_notice() {
    let app = TestApp::new();
    app.sign_up("quinn@example.com", "quinn").await;
    let token = app.login("quinn@example.com").await;

    let (status, body) = app
        .request(
            Method::PUT,
            "/voyages/not-a-uuid/status",
            Some(&token),
            Some(json!({"status": "docked"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["notice"]["title"], "Invalid request");

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/admin/users/{}/admin", Uuid::new_v4()),
            Some(&token),
            Some(json!({"admin": "yes"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["notice"]["variant"], "destructive");
}

#[tokio::test]
async fn test_reset_link_sets_new_password() {
    let app = TestApp::new();
    app.sign_up("jane@example.com", "jane").await;
    let old_token = app.login("jane@example.com").await;
    let mut events = app.backend.subscribe();

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({"email": "jane@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let reset_token = loop {
        if let AuthEvent::PasswordRecovery { token, .. } = events.recv().await.unwrap() {
            break token;
        }
    };

    let confirm = json!({
        "token": reset_token,
        "newPassword": "fresh-pass-9",
        "confirmPassword": "fresh-pass-9",
    });
    let (status, body) = app
        .request(
            Method::POST,
            "/auth/reset-password/confirm",
            None,
            Some(confirm.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notice"]["title"], "Password updated");

    // Earlier sessions stay valid with the provider and re-resolve
    let (status, _) = app
        .request(Method::GET, "/auth/session", Some(&old_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "jane@example.com", "password": "fresh-pass-9"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/reset-password/confirm",
            None,
            Some(confirm),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["notice"]["title"], "Password reset failed");
    assert_eq!(body["notice"]["variant"], "destructive");
}
