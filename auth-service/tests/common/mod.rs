//! Test helpers for auth-service integration tests.
//!
//! Builds the full router on the in-memory store, a recording mailer and a
//! manually driven clock, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use auth_service::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, JwtConfig, OtpConfig, SecurityConfig,
        SessionConfig, SmtpConfig, TimeoutConfig,
    },
    services::{AuthService, InMemoryStore, ManualClock, MockEmailService},
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Str0ng!Pass";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "auth-service-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: SecretString::new("integration-test-secret-0123456789abcdef".to_string()),
            token_expiry_hours: 24,
        },
        session: SessionConfig { expiry_hours: 24 },
        otp: OtpConfig {
            expiry_minutes: 10,
            max_attempts: 5,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: SecretString::new(String::new()),
            from: "noreply@example.com".to_string(),
        },
        timeouts: TimeoutConfig {
            store_seconds: 5,
            email_seconds: 5,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub mailer: Arc<MockEmailService>,
    pub clock: Arc<ManualClock>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(MockEmailService::new());
        let clock = Arc::new(ManualClock::default());

        let auth_service = AuthService::new(
            store.clone(),
            mailer.clone(),
            clock.clone(),
            &config,
        )
        .expect("Failed to build auth service");

        let state = AppState {
            config,
            auth_service,
        };
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            store,
            mailer,
            clock,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body), None).await
    }

    pub async fn get_authorized(&self, path: &str, bearer: &str) -> TestResponse {
        self.request(Method::GET, path, None, Some(bearer)).await
    }

    pub async fn register(&self, email: &str) -> TestResponse {
        self.post(
            "/auth/register",
            json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    pub fn last_code(&self, email: &str) -> String {
        self.mailer
            .last_code_for(email)
            .expect("No verification code was mailed")
    }

    pub async fn verify(&self, email: &str, code: &str) -> TestResponse {
        self.post("/auth/verify", json!({ "email": email, "code": code }))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/auth/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register, verify and log in; returns the access token.
    pub async fn verified_token(&self, email: &str) -> String {
        assert_eq!(self.register(email).await.status, StatusCode::CREATED);
        let code = self.last_code(email);
        assert_eq!(self.verify(email, &code).await.status, StatusCode::OK);
        let login = self.login(email, PASSWORD).await;
        assert_eq!(login.status, StatusCode::OK);
        login.body["access_token"]
            .as_str()
            .expect("access_token missing")
            .to_string()
    }
}

/// A six-digit code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> String {
    if code == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}
