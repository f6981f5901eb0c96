//! Message-related models and the ingestion adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::de::{self, string_or_u64, UserRef};
use super::{ConversationId, MessageId, UserId};

/// Message as delivered by the API (history page, send response, or push event).
///
/// The timestamp arrives as either `fecha` or `enviado_en`, and `remitente`
/// is either a bare id or an embedded user object.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(deserialize_with = "string_or_u64")]
    pub id: u64,
    #[serde(default)]
    pub contenido: Option<String>,
    #[serde(default)]
    pub remitente: Option<UserRef>,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub enviado_en: Option<String>,
    #[serde(default)]
    pub leido: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("message {0} has no sender")]
    MissingSender(MessageId),
    #[error("message {0} has no content")]
    MissingBody(MessageId),
}

impl RawMessage {
    /// Convert to the canonical shape. `conversation_id` is the scope the
    /// message was requested for.
    pub fn normalize(self, conversation_id: ConversationId) -> Result<Message, NormalizeError> {
        let sender_id = self
            .remitente
            .as_ref()
            .map(UserRef::id)
            .ok_or(NormalizeError::MissingSender(self.id))?;
        let body = self.contenido.ok_or(NormalizeError::MissingBody(self.id))?;
        let sent_at = self
            .enviado_en
            .as_deref()
            .or(self.fecha.as_deref())
            .and_then(de::parse_timestamp);

        Ok(Message {
            id: self.id,
            conversation_id,
            sender_id,
            body,
            sent_at,
            read: self.leido.unwrap_or(false),
        })
    }
}

/// Canonical chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    /// `None` when the API sent no timestamp or one that could not be parsed.
    pub sent_at: Option<DateTime<Utc>>,
    /// Client-side approximation; there is no read-receipt endpoint.
    pub read: bool,
}

impl Message {
    /// Ordering key: milliseconds since the epoch, with missing timestamps at zero.
    pub fn sort_key(&self) -> i64 {
        self.sent_at.map(|t| t.timestamp_millis()).unwrap_or(0)
    }

    pub fn is_from(&self, user: Option<UserId>) -> bool {
        user == Some(self.sender_id)
    }
}

/// Decode one JSON message payload (push event body) and normalize it.
pub fn decode_message(
    payload: &str,
    conversation_id: ConversationId,
) -> anyhow::Result<Message> {
    let raw: RawMessage = serde_json::from_str(payload)?;
    Ok(raw.normalize(conversation_id)?)
}
