use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::ValidateEmail;

use crate::{
    config::AccountConfig,
    dtos::auth::{LoginRequest, RegisterData, RegisterRequest},
    models::{SanitizedUser, Session, UserProfile},
    services::{
        activity::{self, ActivitySink},
        error::ServiceError,
        store::{CredentialStore, NewUser, StoreError},
        EmailProvider, SessionSink,
    },
    utils::{hash_password, verify_password, Password, PasswordHashString},
};

const REMEMBER_TOKEN_DAYS: i64 = 30;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Policy knobs the auth service needs from configuration.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub password_min_length: usize,
    pub email_verification_required: bool,
    pub session_ttl: std::time::Duration,
    pub base_url: String,
}

impl AuthPolicy {
    pub fn from_config(config: &AccountConfig) -> Self {
        Self {
            password_min_length: config.security.password_min_length,
            email_verification_required: config.security.email_verification_required,
            session_ttl: std::time::Duration::from_secs(
                config.security.session_ttl_minutes as u64 * 60,
            ),
            base_url: config.app.base_url.clone(),
        }
    }
}

/// A remember-me credential handed back to the caller for cookie storage.
#[derive(Debug, Clone)]
pub struct RememberIssued {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: SanitizedUser,
    pub session_token: String,
    pub remember: Option<RememberIssued>,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionSink>,
    email: Arc<dyn EmailProvider>,
    activity: Arc<dyn ActivitySink>,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionSink>,
        email: Arc<dyn EmailProvider>,
        activity: Arc<dyn ActivitySink>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            sessions,
            email,
            activity,
            policy,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterData, ServiceError> {
        let errors = validate_registration(&req, self.policy.password_min_length);
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors));
        }

        let password_hash = hash_password(&Password::new(req.password.clone()))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let verification_token = generate_token();
        let email_verified = !self.policy.email_verification_required;

        let user = self
            .store
            .insert_user(NewUser {
                username: req.username,
                email: req.email,
                password_hash: password_hash.into_string(),
                full_name: req.full_name,
                phone: req.phone,
                institution: req.institution,
                email_verified,
                verification_token: if email_verified {
                    None
                } else {
                    Some(verification_token.clone())
                },
            })
            .await
            .map_err(|e| match e {
                StoreError::DuplicateIdentity => ServiceError::IdentityTaken,
                e => ServiceError::Store(e),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        self.activity
            .record(
                user.id,
                activity::USER_REGISTERED,
                "User registered successfully",
            )
            .await;

        if !email_verified {
            // Best effort: a failed dispatch must not fail the registration
            let email = Arc::clone(&self.email);
            let to = user.email.clone();
            let base_url = self.policy.base_url.clone();
            tokio::spawn(async move {
                if let Err(e) = email
                    .send_verification_email(&to, &verification_token, &base_url)
                    .await
                {
                    tracing::warn!(error = %e, to = %to, "Failed to send verification email");
                }
            });
        }

        Ok(RegisterData {
            user_id: user.id,
            email_verification_required: !email_verified,
        })
    }

    /// Authenticate by email or username. A missing account and a wrong
    /// password are indistinguishable to the caller; an unverified email
    /// is reported distinctly since a correct password already implies
    /// the account exists.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome, ServiceError> {
        let user = self
            .store
            .find_by_identifier(&req.identifier)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(user.password_hash.clone()),
        ) {
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(ServiceError::EmailNotVerified);
        }

        let now = Utc::now();
        self.store.update_last_login(user.id, now).await?;

        let session_token = generate_token();
        let session = Session::for_user(&user);
        self.sessions
            .create(&session_token, &session, self.policy.session_ttl)
            .await
            .map_err(ServiceError::Internal)?;

        self.activity
            .record(user.id, activity::USER_LOGIN, "User logged in successfully")
            .await;

        let remember = if req.remember {
            let token = generate_token();
            let expires_at = now + Duration::days(REMEMBER_TOKEN_DAYS);
            self.store
                .set_remember_token(user.id, &token, expires_at)
                .await?;
            Some(RememberIssued { token, expires_at })
        } else {
            None
        };

        Ok(LoginOutcome {
            user: user.sanitized(),
            session_token,
            remember,
        })
    }

    /// Destroy the session and invalidate the remember token. Logging out
    /// an already-dead session is not an error.
    pub async fn logout(&self, session_token: &str) -> Result<(), ServiceError> {
        if let Some(session) = self
            .sessions
            .get(session_token)
            .await
            .map_err(ServiceError::Internal)?
        {
            self.activity
                .record(session.user_id, activity::USER_LOGOUT, "User logged out")
                .await;
            // Remember tokens do not survive an explicit logout
            self.store.clear_remember_token(session.user_id).await?;
        }

        self.sessions
            .destroy(session_token)
            .await
            .map_err(ServiceError::Internal)?;
        Ok(())
    }

    pub async fn is_logged_in(&self, session_token: &str) -> Result<bool, ServiceError> {
        Ok(self
            .sessions
            .get(session_token)
            .await
            .map_err(ServiceError::Internal)?
            .is_some())
    }

    /// Re-read the account behind the session; a session referencing a
    /// deactivated or deleted account yields None.
    pub async fn current_user(
        &self,
        session_token: &str,
    ) -> Result<Option<UserProfile>, ServiceError> {
        let Some(session) = self
            .sessions
            .get(session_token)
            .await
            .map_err(ServiceError::Internal)?
        else {
            return Ok(None);
        };

        let user = self.store.find_active_by_id(session.user_id).await?;
        Ok(user.map(|u| u.profile()))
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        match self.store.consume_verification_token(token).await? {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "Email verified");
                Ok(())
            }
            None => Err(ServiceError::InvalidVerificationToken),
        }
    }

    /// Always succeeds with the same outward result whether or not the
    /// email belongs to an account, to avoid an existence oracle.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        if let Some(user) = self.store.find_by_email(email).await? {
            let token = generate_token();
            let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
            self.store.set_reset_token(user.id, &token, expires).await?;

            tracing::info!(user_id = %user.id, "Password reset requested");

            let email_provider = Arc::clone(&self.email);
            let to = user.email.clone();
            let base_url = self.policy.base_url.clone();
            tokio::spawn(async move {
                if let Err(e) = email_provider
                    .send_password_reset_email(&to, &token, &base_url)
                    .await
                {
                    tracing::warn!(error = %e, to = %to, "Failed to send password reset email");
                }
            });
        }

        Ok(())
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        if new_password.chars().count() < self.policy.password_min_length {
            return Err(ServiceError::PasswordTooShort(
                self.policy.password_min_length,
            ));
        }

        let password_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        match self
            .store
            .consume_reset_token(token, password_hash.as_str(), Utc::now())
            .await?
        {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "Password reset successful");
                self.activity
                    .record(
                        user_id,
                        activity::PASSWORD_RESET,
                        "Password reset successfully",
                    )
                    .await;
                Ok(())
            }
            None => Err(ServiceError::InvalidResetToken),
        }
    }
}

/// Accumulate registration problems into a field -> message map rather
/// than failing on the first one.
fn validate_registration(req: &RegisterRequest, password_min: usize) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();

    let required = [
        ("fullName", "Full name", &req.full_name),
        ("email", "Email", &req.email),
        ("username", "Username", &req.username),
        ("phone", "Phone", &req.phone),
        ("institution", "Institution", &req.institution),
        ("password", "Password", &req.password),
        ("confirmPassword", "Confirm password", &req.confirm_password),
    ];
    for (field, label, value) in required {
        if value.trim().is_empty() {
            errors.insert(field.to_string(), format!("{} is required", label));
        }
    }

    if !req.email.is_empty() && !req.email.validate_email() {
        errors.insert("email".to_string(), "Invalid email format".to_string());
    }

    if !req.username.is_empty() {
        if req.username.chars().count() < 3 {
            errors.insert(
                "username".to_string(),
                "Username must be at least 3 characters".to_string(),
            );
        }
        if !req
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            errors.insert(
                "username".to_string(),
                "Username may only contain letters, numbers, and underscores".to_string(),
            );
        }
    }

    if !req.password.is_empty() {
        if req.password.chars().count() < password_min {
            errors.insert(
                "password".to_string(),
                format!("Password must be at least {} characters", password_min),
            );
        }
        if req.password != req.confirm_password {
            errors.insert(
                "confirmPassword".to_string(),
                "Password confirmation does not match".to_string(),
            );
        }
    }

    if !req.phone.is_empty()
        && !req
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '-' | '(' | ')'))
    {
        errors.insert("phone".to_string(), "Invalid phone number format".to_string());
    }

    if !req.terms {
        errors.insert(
            "terms".to_string(),
            "You must accept the terms and conditions".to_string(),
        );
    }

    errors
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}
