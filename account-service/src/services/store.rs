//! Credential store: durable account rows and their one-shot tokens.
//!
//! The store is injected as a trait object so the auth service can be
//! exercised against an in-memory implementation in tests. The Postgres
//! implementation relies on unique constraints and conditional updates to
//! close the check-then-act races: duplicate registration fails on the
//! constraint, token consumption succeeds for exactly one caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::User;
use service_core::error::AppError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username or email already taken")]
    DuplicateIdentity,

    #[error("store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// Input row for account creation. The id, role, and created timestamp
/// are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: String,
    pub institution: String,
    pub email_verified: bool,
    pub verification_token: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup by email or username, active accounts only.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    /// Exact-match lookup by email, active accounts only.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Insert a new account. Uniqueness of username and email is enforced
    /// here; a collision returns [`StoreError::DuplicateIdentity`].
    async fn insert_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn set_remember_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn clear_remember_token(&self, id: Uuid) -> Result<(), StoreError>;

    /// Mark the account holding this verification token as verified and
    /// clear the token, in one conditional write. Returns the account id
    /// if a row actually changed; a consumed or unknown token yields None.
    async fn consume_verification_token(&self, token: &str) -> Result<Option<Uuid>, StoreError>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Swap in the new password hash and clear the reset token, in one
    /// conditional write gated on the token still matching and not being
    /// past its expiry. Returns the account id if a row changed.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

// ==================== PostgreSQL implementation ====================

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a connection pool against the configured database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateIdentity;
        }
    }
    StoreError::Unavailable(anyhow::Error::new(e))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE (email = $1 OR username = $1) AND is_active = TRUE",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND is_active = TRUE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = TRUE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, full_name, phone, institution,
                               email_verified, verification_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.full_name)
        .bind(&new_user.phone)
        .bind(&new_user.institution)
        .bind(new_user.email_verified)
        .bind(&new_user.verification_token)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_remember_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET remember_token = $2, remember_token_expires = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn clear_remember_token(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET remember_token = NULL, remember_token_expires = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE users SET email_verified = TRUE, verification_token = NULL
            WHERE verification_token = $1 AND email_verified = FALSE
            RETURNING id
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(|(id,)| id))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET reset_token = $2, reset_token_expires = $3 WHERE id = $1")
            .bind(id)
            .bind(token)
            .bind(expires)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE users SET password_hash = $2, reset_token = NULL, reset_token_expires = NULL
            WHERE reset_token = $1 AND reset_token_expires > $3 AND is_active = TRUE
            RETURNING id
            "#,
        )
        .bind(token)
        .bind(new_password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(|(id,)| id))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

// ==================== In-memory implementation ====================

/// Hash-map backed store for tests and local development. Conditional
/// updates run under one lock, which gives the same exactly-once token
/// consumption the Postgres implementation gets from conditional UPDATEs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivation happens outside the auth core; tests use this to
    /// simulate it.
    pub fn deactivate(&self, id: Uuid) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.is_active = false;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.is_active && (u.email == identifier || u.username == identifier))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.is_active && u.email == email)
            .cloned())
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(&id).filter(|u| u.is_active).cloned())
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.email == new_user.email || u.username == new_user.username)
        {
            return Err(StoreError::DuplicateIdentity);
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            full_name: new_user.full_name,
            phone: new_user.phone,
            institution: new_user.institution,
            role: "user".to_string(),
            is_active: true,
            email_verified: new_user.email_verified,
            verification_token: new_user.verification_token,
            reset_token: None,
            reset_token_expires: None,
            remember_token: None,
            remember_token_expires: None,
            created_at: Utc::now(),
            last_login: None,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_remember_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.remember_token = Some(token.to_string());
            user.remember_token_expires = Some(expires);
        }
        Ok(())
    }

    async fn clear_remember_token(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.remember_token = None;
            user.remember_token_expires = None;
        }
        Ok(())
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .values_mut()
            .find(|u| !u.email_verified && u.verification_token.as_deref() == Some(token));
        Ok(user.map(|u| {
            u.email_verified = true;
            u.verification_token = None;
            u.id
        }))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.reset_token = Some(token.to_string());
            user.reset_token_expires = Some(expires);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users.values_mut().find(|u| {
            u.is_active
                && u.reset_token.as_deref() == Some(token)
                && u.reset_token_expires.map(|exp| exp > now).unwrap_or(false)
        });
        Ok(user.map(|u| {
            u.password_hash = new_password_hash.to_string();
            u.reset_token = None;
            u.reset_token_expires = None;
            u.id
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
