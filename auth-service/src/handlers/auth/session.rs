use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::{
    dtos::auth::{LoginRequest, TokenResponse},
    middleware::AuthUser,
    models::SessionInfo,
    services::CredentialKind,
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials or email not verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.auth_service.login(&req.email, &req.password).await?;
    Ok((StatusCode::OK, Json(TokenResponse::from(issued))))
}

/// Open a server-side session with email and password
#[utoipa::path(
    post,
    path = "/auth/sessions",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionInfo),
        (status = 401, description = "Invalid credentials or email not verified", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn open_session(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    user_agent: Option<TypedHeader<UserAgent>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .auth_service
        .open_session(
            &req.email,
            &req.password,
            user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
            connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SessionInfo::from(session))))
}

/// Close the session presented as the bearer credential
#[utoipa::path(
    delete,
    path = "/auth/sessions/current",
    responses(
        (status = 204, description = "Session closed"),
        (status = 400, description = "Credential is not a session", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn close_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    match user.0.credential {
        CredentialKind::Session { session_id } => {
            state.auth_service.close_session(&session_id).await?;
            Ok(StatusCode::NO_CONTENT)
        }
        CredentialKind::Token { .. } => Err(AppError::BadRequest(anyhow::anyhow!(
            "Signed tokens expire on their own and cannot be closed"
        ))),
    }
}
