//! Append-only activity sink for account lifecycle events.

use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

pub const USER_REGISTERED: &str = "user_registered";
pub const USER_LOGIN: &str = "user_login";
pub const USER_LOGOUT: &str = "user_logout";
pub const PASSWORD_RESET: &str = "password_reset";

/// Fire-and-forget event sink; recording never fails an operation.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, user_id: Uuid, event_type: &str, message: &str);
}

/// Writes activity events to the structured log.
pub struct LogActivitySink;

#[async_trait]
impl ActivitySink for LogActivitySink {
    async fn record(&self, user_id: Uuid, event_type: &str, message: &str) {
        tracing::info!(user_id = %user_id, event = %event_type, "{}", message);
    }
}

/// Captures events in memory so tests can assert on them.
#[derive(Default)]
pub struct RecordingActivitySink {
    pub events: Mutex<Vec<(Uuid, String, String)>>,
}

impl RecordingActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, user_id: Uuid) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == user_id)
            .map(|(_, event, _)| event.clone())
            .collect()
    }
}

#[async_trait]
impl ActivitySink for RecordingActivitySink {
    async fn record(&self, user_id: Uuid, event_type: &str, message: &str) {
        self.events.lock().unwrap().push((
            user_id,
            event_type.to_string(),
            message.to_string(),
        ));
    }
}
