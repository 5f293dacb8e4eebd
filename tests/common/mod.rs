#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use townhall::config::Config;
use townhall::services::MemoryMailer;
use townhall::state::SharedState;

pub const ADMIN_LOGIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "password";

pub const MAIL_WAIT: Duration = Duration::from_secs(5);

/// Config backed by a throwaway SQLite file and cheap password hashing.
pub fn test_config() -> (Config, PathBuf) {
    let path = std::env::temp_dir().join(format!("townhall_{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}?mode=rwc", path.display());
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config.mail.retry_delay_ms = 1;

    (config, path)
}

pub struct TempDb(pub PathBuf);

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub async fn spawn_shared() -> (SharedState, Arc<MemoryMailer>, TempDb) {
    let (config, path) = test_config();
    let mailer = Arc::new(MemoryMailer::new());
    let shared = SharedState::with_mailer(config, mailer.clone())
        .await
        .expect("Failed to create shared state");
    (shared, mailer, TempDb(path))
}

pub struct TestApp {
    pub router: Router,
    pub mailer: Arc<MemoryMailer>,
    _db: TempDb,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    /// `name=value` part of the session cookie, when one was set.
    pub cookie: Option<String>,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

pub async fn spawn_app() -> TestApp {
    let (config, path) = test_config();
    let mailer = Arc::new(MemoryMailer::new());

    let state = townhall::api::create_app_state_with_mailer(config, mailer.clone(), None)
        .await
        .expect("Failed to create app state");
    let router = townhall::api::router(state).await;

    TestApp {
        router,
        mailer,
        _db: TempDb(path),
    }
}

/// Tells a request how to identify itself.
#[derive(Clone, Copy)]
pub enum As<'a> {
    Anonymous,
    Cookie(&'a str),
    Bearer(&'a str),
}

impl TestApp {
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>, who: As<'_>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        builder = match who {
            As::Anonymous => builder,
            As::Cookie(cookie) => builder.header(header::COOKIE, cookie),
            As::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        };

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            body,
            cookie,
        }
    }

    pub async fn get(&self, uri: &str, who: As<'_>) -> TestResponse {
        self.call("GET", uri, None, who).await
    }

    pub async fn register(&self, login: &str, email: &str, password: &str) -> TestResponse {
        self.call(
            "POST",
            "/api/users",
            Some(json!({
                "login": login,
                "email": email,
                "password": password,
                "password_confirmation": password,
            })),
            As::Anonymous,
        )
        .await
    }

    /// Logs in and returns the session cookie.
    pub async fn login(&self, login: &str, password: &str) -> String {
        let response = self
            .call(
                "POST",
                "/api/session",
                Some(json!({ "login": login, "password": password })),
                As::Anonymous,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.cookie.expect("login sets a session cookie")
    }

    /// Registers, activates from the mailed link and logs in.
    pub async fn member(&self, login: &str, email: &str, password: &str) -> String {
        let response = self.register(login, email, password).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        let code = mailed_code(&self.mailer, email, "/api/users/activate/").await;
        let response = self
            .get(&format!("/api/users/activate/{code}"), As::Anonymous)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        self.login(login, password).await
    }

    pub async fn admin(&self) -> String {
        self.login(ADMIN_LOGIN, ADMIN_PASSWORD).await
    }
}

/// Waits for a message to `to` linking `marker` and returns the code that follows it.
pub async fn mailed_code(mailer: &MemoryMailer, to: &str, marker: &str) -> String {
    let envelope = mailer
        .wait_for(MAIL_WAIT, |e| e.to == to && e.body.contains(marker))
        .await
        .unwrap_or_else(|| panic!("no mail to {to} containing {marker}"));

    envelope
        .body
        .split(marker)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .expect("mail carries a code")
        .to_string()
}
