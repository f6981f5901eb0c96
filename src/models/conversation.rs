//! Conversation-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::de::{self, string_or_u64, UserRef};
use super::{ConversationId, UserId, UserSummary};

/// Conversation summary as returned by `GET/POST /chat/conversaciones/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConversation {
    #[serde(deserialize_with = "string_or_u64")]
    pub id: u64,
    #[serde(default)]
    pub participantes: Vec<UserRef>,
    #[serde(default)]
    pub ultimo_mensaje: Option<RawLastMessage>,
    #[serde(default)]
    pub mensajes_no_leidos: Option<u32>,
    #[serde(default)]
    pub fecha_actualizacion: Option<String>,
}

/// Denormalized last-message preview: either plain text or a message object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLastMessage {
    Text(String),
    Message {
        #[serde(default)]
        contenido: Option<String>,
        #[serde(default)]
        remitente: Option<UserRef>,
        #[serde(default)]
        fecha: Option<String>,
        #[serde(default)]
        enviado_en: Option<String>,
        #[serde(default)]
        leido: Option<bool>,
    },
}

/// Last-message preview shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub body: String,
    pub sender_id: Option<UserId>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read: Option<bool>,
}

/// Canonical conversation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_ids: Vec<UserId>,
    pub other_participant: Option<UserSummary>,
    pub last_message: Option<MessagePreview>,
    pub updated_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl RawConversation {
    /// Profiles embedded in the participant list, when the API sends objects.
    pub fn embedded_profiles(&self) -> Vec<UserSummary> {
        self.participantes
            .iter()
            .filter_map(|p| match p {
                UserRef::Object(user) if user.has_profile() => Some(user.clone().into()),
                _ => None,
            })
            .collect()
    }

    /// Convert to the canonical shape. The other participant is filled in by the
    /// conversation list synchronizer.
    pub fn normalize(self, current_user: Option<UserId>) -> Conversation {
        let embedded = self.embedded_profiles();
        let participant_ids: Vec<UserId> = self.participantes.iter().map(UserRef::id).collect();

        let last_message = self.ultimo_mensaje.map(|last| match last {
            RawLastMessage::Text(body) => MessagePreview {
                body,
                sender_id: None,
                sent_at: None,
                read: None,
            },
            RawLastMessage::Message {
                contenido,
                remitente,
                fecha,
                enviado_en,
                leido,
            } => MessagePreview {
                body: contenido.unwrap_or_default(),
                sender_id: remitente.as_ref().map(UserRef::id),
                sent_at: enviado_en
                    .as_deref()
                    .or(fecha.as_deref())
                    .and_then(de::parse_timestamp),
                read: leido,
            },
        });

        let unread_count = self.mensajes_no_leidos.unwrap_or_else(|| {
            // Without a server count, approximate: an unread last message from
            // someone else counts as one.
            match &last_message {
                Some(MessagePreview {
                    sender_id: Some(sender),
                    read: Some(false),
                    ..
                }) if Some(*sender) != current_user => 1,
                _ => 0,
            }
        });

        let other_participant = other_participant_id(&participant_ids, current_user)
            .and_then(|other| embedded.into_iter().find(|u| u.id == other));

        Conversation {
            id: self.id,
            participant_ids,
            other_participant,
            last_message,
            updated_at: self
                .fecha_actualizacion
                .as_deref()
                .and_then(de::parse_timestamp),
            unread_count,
        }
    }
}

/// The participant that is not the current user (first one when unknown).
pub fn other_participant_id(participants: &[UserId], current_user: Option<UserId>) -> Option<UserId> {
    participants
        .iter()
        .copied()
        .find(|id| Some(*id) != current_user)
}

impl Conversation {
    pub fn other_participant_id(&self, current_user: Option<UserId>) -> Option<UserId> {
        other_participant_id(&self.participant_ids, current_user)
    }

    /// Display title: the other participant's name, or a placeholder.
    pub fn title(&self) -> String {
        match &self.other_participant {
            Some(user) => user.name.clone(),
            None => format!("Conversation {}", self.id),
        }
    }
}
