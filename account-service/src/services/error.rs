use service_core::error::AppError;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::services::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("Email or username already registered")]
    IdentityTaken,

    #[error("Email/username or password incorrect")]
    InvalidCredentials,

    #[error("Please verify your email before logging in")]
    EmailNotVerified,

    #[error("Verification token is invalid or has already been used")]
    InvalidVerificationToken,

    #[error("Reset token is invalid or has expired")]
    InvalidResetToken,

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(fields) => AppError::ValidationFailed(fields),
            ServiceError::PasswordTooShort(min) => AppError::ValidationFailed(BTreeMap::from([(
                "password".to_string(),
                format!("Password must be at least {} characters", min),
            )])),
            ServiceError::IdentityTaken => {
                AppError::Conflict(anyhow::anyhow!("Email or username already registered"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Email/username or password incorrect"))
            }
            ServiceError::EmailNotVerified => {
                AppError::Forbidden(anyhow::anyhow!("Please verify your email before logging in"))
            }
            ServiceError::InvalidVerificationToken => AppError::NotFound(anyhow::anyhow!(
                "Verification token is invalid or has already been used"
            )),
            ServiceError::InvalidResetToken => {
                AppError::BadRequest(anyhow::anyhow!("Reset token is invalid or has expired"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
