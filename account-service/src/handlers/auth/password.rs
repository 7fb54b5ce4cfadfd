use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{PasswordResetConfirm, PasswordResetRequest},
        ApiResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Request a password reset link. The response is identical whether or
/// not the email belongs to an account.
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_password_reset(&req.email).await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message(
            "If your email is registered, you will receive a password reset link shortly.",
        )),
    ))
}

/// Set a new password using a reset token
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth
        .reset_password(&req.token, &req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::message(
            "Password reset successful. You can now login with your new password.",
        )),
    ))
}
