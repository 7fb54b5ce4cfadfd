//! Session sink: where authenticated identity is recorded between requests.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::Session;

#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Record a session under an opaque token with a bounded lifetime.
    async fn create(
        &self,
        token: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), anyhow::Error>;

    async fn get(&self, token: &str) -> Result<Option<Session>, anyhow::Error>;

    async fn destroy(&self, token: &str) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisSessionStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    fn key(token: &str) -> String {
        format!("session:{}", token)
    }
}

#[async_trait]
impl SessionSink for RedisSessionStore {
    async fn create(
        &self,
        token: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(session)?;

        redis::cmd("SET")
            .arg(Self::key(token))
            .arg(payload)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store session: {}", e))
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, anyhow::Error> {
        let mut conn = self.manager.clone();

        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::key(token))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read session: {}", e))?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn destroy(&self, token: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();

        redis::cmd("DEL")
            .arg(Self::key(token))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to destroy session: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// Process-local session sink for tests and single-node development.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, (Session, Instant)>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionSink for InMemorySessionStore {
    async fn create(
        &self,
        token: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), anyhow::Error> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(token.to_string(), (session.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, anyhow::Error> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some((session, deadline)) = sessions.get(token).cloned() {
            if deadline > Instant::now() {
                return Ok(Some(session));
            }
            sessions.remove(token);
        }
        Ok(None)
    }

    async fn destroy(&self, token: &str) -> Result<(), anyhow::Error> {
        self.sessions.lock().unwrap().remove(token);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
