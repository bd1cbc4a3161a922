//! Shared fixtures for the HTTP tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use keyward_auth::UserLoader;
use keyward_core::{KeywardError, KeywardResult, Settings};
use keyward_web::{demo::DemoUser, App, AppBuilder};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, sync::LazyLock};
use tower::ServiceExt;

static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

pub const ADMIN_PASSWORD: &str = "admin-password";

/// Plain-text user table; hashing is covered by the demo loader's own tests
#[derive(Default)]
pub struct TestUsers {
    users: HashMap<String, (DemoUser, String)>,
}

impl TestUsers {
    pub fn with(mut self, login_id: &str, role: &str, password: &str) -> Self {
        self.users.insert(
            login_id.to_string(),
            (DemoUser::new(login_id, login_id, role), password.to_string()),
        );
        self
    }
}

#[async_trait]
impl UserLoader<DemoUser> for TestUsers {
    async fn user_by_id(&self, login_id: &str) -> KeywardResult<DemoUser> {
        self.users
            .get(login_id)
            .map(|(user, _)| user.clone())
            .ok_or_else(|| KeywardError::not_found(format!("user '{}'", login_id)))
    }

    async fn load_user(&self, login_id: &str, password: &str) -> KeywardResult<DemoUser> {
        match self.users.get(login_id) {
            Some((user, expected)) if expected == password => Ok(user.clone()),
            _ => Err(KeywardError::InvalidCredentials),
        }
    }
}

pub fn test_settings() -> Settings {
    LazyLock::force(&TRACING);
    let mut settings = Settings::default();
    settings.auth.token.keys = vec!["test-signing-key".to_string()];
    settings
}

pub fn default_users() -> TestUsers {
    TestUsers::default()
        .with("admin", "admin", ADMIN_PASSWORD)
        .with("viewer", "viewer", "viewer-password")
        .with("orphan", "missing-role", "orphan-password")
}

pub fn builder(users: TestUsers) -> AppBuilder<DemoUser> {
    AppBuilder::new(test_settings(), Arc::new(users))
}

pub async fn spawn_app() -> App<DemoUser> {
    builder(default_users())
        .build()
        .await
        .expect("Failed to build app")
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and decode the JSON body (`Null` when empty)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

pub async fn login(router: &Router, login_id: &str, password: &str) -> String {
    let (status, body) = send(
        router,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(serde_json::json!({ "login_id": login_id, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("token in login response").to_string()
}
