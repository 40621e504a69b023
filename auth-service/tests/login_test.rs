//! Login and bearer-token authorization over HTTP.

mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let app = TestApp::spawn().await;
    app.verified_token("known@example.com").await;

    let wrong_password = app.login("known@example.com", "Wr0ng!Pass").await;
    let unknown_email = app.login("unknown@example.com", PASSWORD).await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn login_accepts_mixed_case_email() {
    let app = TestApp::spawn().await;
    app.verified_token("case@example.com").await;

    let res = app.login("  Case@Example.COM ", PASSWORD).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn each_login_gets_a_distinct_session_id() {
    let app = TestApp::spawn().await;
    app.verified_token("twice@example.com").await;

    let a = app.login("twice@example.com", PASSWORD).await;
    let b = app.login("twice@example.com", PASSWORD).await;
    assert_ne!(a.body["session_id"], b.body["session_id"]);
}

#[tokio::test]
async fn token_authorizes_until_expiry() {
    let app = TestApp::spawn().await;
    let token = app.verified_token("exp@example.com").await;

    let res = app.get_authorized("/users/me", &token).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["email"], "exp@example.com");

    app.clock.advance(chrono::Duration::hours(24));
    let res = app.get_authorized("/users/me", &token).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}
