mod common;

use account_service::dtos::auth::LoginRequest;
use account_service::services::{CredentialStore, ServiceError};
use chrono::{Duration, Utc};
use common::{register_request, TestApp};

/// Register alice, consume her verification token.
async fn registered_and_verified() -> TestApp {
    let app = TestApp::new();
    app.state.auth.register(register_request()).await.unwrap();
    let token = app
        .stored_user("alice@example.com")
        .await
        .verification_token
        .unwrap();
    app.state.auth.verify_email(&token).await.unwrap();
    app
}

#[tokio::test]
async fn reset_request_is_uniform_for_unknown_and_known_emails() {
    let app = registered_and_verified().await;

    // Neither call distinguishes itself to the caller
    app.state
        .auth
        .request_password_reset("unknown@example.com")
        .await
        .expect("unknown email must not error");
    app.state
        .auth
        .request_password_reset("alice@example.com")
        .await
        .expect("known email must not error");

    // But only the real account got a token, expiring about an hour out
    let user = app.stored_user("alice@example.com").await;
    let expires = user.reset_token_expires.expect("reset expiry missing");
    assert!(user.reset_token.is_some());
    assert!(expires > Utc::now() + Duration::minutes(55));
    assert!(expires <= Utc::now() + Duration::hours(1));
}

#[tokio::test]
async fn reset_password_replaces_hash_and_clears_token() {
    let app = registered_and_verified().await;
    app.state
        .auth
        .request_password_reset("alice@example.com")
        .await
        .unwrap();

    let before = app.stored_user("alice@example.com").await;
    let token = before.reset_token.clone().unwrap();

    app.state
        .auth
        .reset_password(&token, "brand-new-password")
        .await
        .expect("reset failed");

    let after = app.stored_user("alice@example.com").await;
    assert_ne!(after.password_hash, before.password_hash);
    assert!(after.reset_token.is_none());
    assert!(after.reset_token_expires.is_none());
    assert!(app
        .activity
        .events_for(after.id)
        .contains(&"password_reset".to_string()));

    // Old password is dead, new one works
    assert!(matches!(
        app.state
            .auth
            .login(LoginRequest {
                identifier: "alice1".to_string(),
                password: "password1".to_string(),
                remember: false,
            })
            .await,
        Err(ServiceError::InvalidCredentials)
    ));
    app.state
        .auth
        .login(LoginRequest {
            identifier: "alice1".to_string(),
            password: "brand-new-password".to_string(),
            remember: false,
        })
        .await
        .expect("login with new password failed");
}

#[tokio::test]
async fn reset_rejects_short_password_without_consuming_token() {
    let app = registered_and_verified().await;
    app.state
        .auth
        .request_password_reset("alice@example.com")
        .await
        .unwrap();
    let token = app
        .stored_user("alice@example.com")
        .await
        .reset_token
        .unwrap();

    assert!(matches!(
        app.state.auth.reset_password(&token, "short").await,
        Err(ServiceError::PasswordTooShort(8))
    ));

    // The token survives the failed attempt
    let user = app.stored_user("alice@example.com").await;
    assert_eq!(user.reset_token.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn reset_rejects_expired_token_even_if_it_matches() {
    let app = registered_and_verified().await;
    let user_id = app.stored_user("alice@example.com").await.id;

    app.store
        .set_reset_token(user_id, "expired-token", Utc::now() - Duration::minutes(5))
        .await
        .unwrap();

    assert!(matches!(
        app.state
            .auth
            .reset_password("expired-token", "perfectly-long-password")
            .await,
        Err(ServiceError::InvalidResetToken)
    ));
}

#[tokio::test]
async fn reset_token_is_single_use() {
    let app = registered_and_verified().await;
    app.state
        .auth
        .request_password_reset("alice@example.com")
        .await
        .unwrap();
    let token = app
        .stored_user("alice@example.com")
        .await
        .reset_token
        .unwrap();

    app.state
        .auth
        .reset_password(&token, "first-new-password")
        .await
        .unwrap();

    assert!(matches!(
        app.state
            .auth
            .reset_password(&token, "second-new-password")
            .await,
        Err(ServiceError::InvalidResetToken)
    ));
}
