use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::{
    dtos::{auth::LoginRequest, ApiResponse},
    utils::ValidatedJson,
    AppState,
};

pub const SESSION_COOKIE: &str = "session_token";
pub const REMEMBER_COOKIE: &str = "remember_token";

fn auth_cookie(name: &'static str, value: String, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Login with email or username
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.auth.login(req).await?;

    let session_ttl = time::Duration::minutes(state.config.security.session_ttl_minutes);
    let mut jar = jar.add(auth_cookie(
        SESSION_COOKIE,
        outcome.session_token,
        session_ttl,
    ));

    if let Some(remember) = outcome.remember {
        jar = jar.add(auth_cookie(
            REMEMBER_COOKIE,
            remember.token,
            time::Duration::days(30),
        ));
    }

    Ok((
        jar,
        (
            StatusCode::OK,
            Json(ApiResponse::new("Login successful!", Some(outcome.user))),
        ),
    ))
}

/// Destroy the session and drop both auth cookies
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.auth.logout(cookie.value()).await?;
    }

    let jar = jar
        .remove(removal_cookie(SESSION_COOKIE))
        .remove(removal_cookie(REMEMBER_COOKIE));

    Ok((
        jar,
        (
            StatusCode::OK,
            Json(ApiResponse::message("Logout successful")),
        ),
    ))
}

/// Return the account behind the current session
pub async fn current_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let profile = match jar.get(SESSION_COOKIE) {
        Some(cookie) => state.auth.current_user(cookie.value()).await?,
        None => None,
    };

    let profile =
        profile.ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not logged in")))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::new("OK", Some(profile))),
    ))
}
