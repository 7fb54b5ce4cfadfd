//! Test helpers for account-service integration tests.
//!
//! Everything runs against in-memory collaborators, so no database,
//! Redis, or SMTP server is needed.

#![allow(dead_code)]

use account_service::{
    build_router,
    config::{
        AccountConfig, AppConfig, DatabaseConfig, Environment, RedisConfig, SecurityConfig,
        SmtpConfig,
    },
    dtos::auth::RegisterRequest,
    services::{
        AuthPolicy, AuthService, CredentialStore, InMemorySessionStore, MemoryCredentialStore,
        MockEmailService, RecordingActivitySink, SessionSink,
    },
    AppState,
};
use axum::Router;
use std::sync::Arc;

pub fn test_config() -> AccountConfig {
    AccountConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "account-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "test@example.com".to_string(),
            password: "unused".to_string(),
            from_address: "test@example.com".to_string(),
        },
        app: AppConfig {
            base_url: "http://localhost:3000".to_string(),
        },
        security: SecurityConfig {
            password_min_length: 8,
            email_verification_required: true,
            session_ttl_minutes: 60,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryCredentialStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub activity: Arc<RecordingActivitySink>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AccountConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();

        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let activity = Arc::new(RecordingActivitySink::new());

        let auth = AuthService::new(
            store.clone() as Arc<dyn CredentialStore>,
            sessions.clone() as Arc<dyn SessionSink>,
            Arc::new(MockEmailService),
            activity.clone(),
            AuthPolicy::from_config(&config),
        );

        let state = AppState {
            config,
            store: store.clone() as Arc<dyn CredentialStore>,
            sessions: sessions.clone() as Arc<dyn SessionSink>,
            auth,
        };

        Self {
            state,
            store,
            sessions,
            activity,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// The stored account row, tokens included, for assertions.
    pub async fn stored_user(&self, email: &str) -> account_service::models::User {
        self.store
            .find_by_email(email)
            .await
            .expect("store lookup failed")
            .expect("no account for email")
    }
}

pub fn register_request() -> RegisterRequest {
    RegisterRequest {
        full_name: "Alice Example".to_string(),
        email: "alice@example.com".to_string(),
        username: "alice1".to_string(),
        phone: "+62 811-234-567".to_string(),
        institution: "Example University".to_string(),
        password: "password1".to_string(),
        confirm_password: "password1".to_string(),
        terms: true,
    }
}
