use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{RegisterRequest, VerifyRequest},
        ApiResponse,
    },
    AppState,
};

/// Register a new account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) =
        payload.map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid JSON input")))?;

    let data = state.auth.register(req).await?;

    let message = if data.email_verification_required {
        "Registration successful! Please check your email to verify your account."
    } else {
        "Registration successful!"
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(message, Some(data))),
    ))
}

/// Consume an email verification token
pub async fn verify_email(
    State(state): State<AppState>,
    Query(req): Query<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.verify_email(&req.token).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message("Email verified successfully")),
    ))
}
