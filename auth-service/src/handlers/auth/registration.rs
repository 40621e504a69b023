use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{RegisterRequest, RegisterResponse, ResendOtpRequest, VerifyOtpRequest},
        MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Register a new user
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered, verification code sent", body = RegisterResponse),
        (status = 400, description = "Password does not meet policy", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let registration = state
        .auth_service
        .register(&req.email, &req.password)
        .await?;

    let message = if registration.otp.as_ref().is_some_and(|otp| otp.delivered) {
        "Registration successful. Please check your email for a verification code."
    } else {
        "Registration successful, but the verification email could not be sent. Please request a new code."
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: registration.user.user_id,
            message: message.to_string(),
        }),
    ))
}

/// Verify an email address with the emailed code
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified successfully", body = MessageResponse),
        (status = 400, description = "Malformed code", body = ErrorResponse),
        (status = 401, description = "Invalid or expired code", body = ErrorResponse),
        (status = 404, description = "No pending verification", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.verify(&req.email, &req.code).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Email verified successfully")),
    ))
}

/// Request a fresh verification code
///
/// Responds identically whether or not the email belongs to a pending account.
#[utoipa::path(
    post,
    path = "/auth/otp/resend",
    request_body = ResendOtpRequest,
    responses(
        (status = 202, description = "If the account is pending verification, a new code was sent", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.resend_otp(&req.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "If the account is awaiting verification, a new code has been sent.",
        )),
    ))
}
