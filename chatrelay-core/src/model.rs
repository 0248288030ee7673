use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, RelayError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

/// Identifiers supplied by the caller for one proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Absent for throwaway streams; persistence and the trailer frame only
    /// happen when this is set.
    pub conversation_id: Option<String>,
    pub model_id: String,
    pub owner_id: String,
    pub provider_id: String,
}

/// The assembled assistant message handed to the persistence collaborator.
/// Built exactly once per session, after the full text is final, and only
/// when a conversation id is present.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PersistedMessage {
    pub conversation_id: String,
    pub content: String,
    pub reasoning_content: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub model_id: String,
    pub provider_id: String,
}

/// Per-session accounting handed to the usage collaborator. Emitted exactly
/// once per naturally completed stream, zeros if the upstream never reported.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub owner_id: String,
    pub conversation_id: Option<String>,
    /// Calendar day, UTC.
    pub date: NaiveDate,
    pub model_id: String,
    pub provider_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrailerMetadata {
    #[serde(rename = "isDone")]
    pub is_done: bool,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// The single synthetic frame appended after relay completes, carrying the
/// persisted message's identifier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrailerEvent {
    pub metadata: TrailerMetadata,
}

impl TrailerEvent {
    #[must_use]
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            metadata: TrailerMetadata {
                is_done: true,
                message_id: message_id.into(),
            },
        }
    }

    /// Encode as one wire frame: `data: {json}` plus the blank separator line.
    pub fn encode(&self) -> CoreResult<String> {
        let json = serde_json::to_string(self).map_err(|e| RelayError::Other(e.into()))?;
        Ok(format!("data: {json}\n\n"))
    }
}
