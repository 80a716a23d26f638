// src/models.rs

use serde::Deserialize;

/// Placeholder written into `tags` for every entry the bot records.
pub const DEFAULT_TAGS: &str = "tags";

#[derive(Debug)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String, // local time, "%Y-%m-%d %H:%M:%S"
    pub text: String,
    pub summary: String,
    pub tags: String,
}

/// An already-authenticated mention delivered by the chat platform.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Slack wraps the event in an `event_callback` envelope; bare events are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventPayload {
    Envelope { event: InboundEvent },
    Bare(InboundEvent),
}

impl InboundEvent {
    pub fn from_json(line: &str) -> crate::error::Result<Self> {
        let payload: EventPayload = serde_json::from_str(line)?;
        Ok(match payload {
            EventPayload::Envelope { event } => event,
            EventPayload::Bare(event) => event,
        })
    }
}
