//! Outbound messages: send and delete.
//!
//! Send is "send, then reflect": nothing is shown until the server returns
//! the persisted message, which then goes through the same merge as every
//! other producer, so a later push of the same id cannot duplicate it.

use thiserror::Error;

use super::session::ChatSession;
use crate::api::ApiError;
use crate::models::{ConversationId, Message, MessageId};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Message is empty")]
    EmptyBody,

    #[error("Failed to send message")]
    Api(#[from] ApiError),
}

/// Trimmed body, or `EmptyBody` if nothing is left.
pub fn validate_body(body: &str) -> Result<&str, SendError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(SendError::EmptyBody);
    }
    Ok(trimmed)
}

impl ChatSession {
    /// Post a message and merge the persisted result if its conversation is
    /// still selected. On failure the store is untouched and the caller keeps
    /// the draft.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        body: &str,
    ) -> Result<Message, SendError> {
        let body = validate_body(body)?;
        let message = self.api().send_message(conversation_id, body).await?;
        tracing::debug!("Sent message {} to conversation {}", message.id, conversation_id);

        let mut state = self.lock();
        if state.store.conversation_id() == Some(conversation_id) {
            if state.store.merge_all([message.clone()]) {
                self.publish(&state);
            }
        } else {
            tracing::debug!("Conversation {} no longer selected; not reflecting send", conversation_id);
        }
        Ok(message)
    }

    /// Delete one message. A 404 counts as already deleted.
    pub async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        match self.api().delete_message(conversation_id, message_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("Message {} was already gone", message_id);
            }
            Err(e) => return Err(e),
        }

        let mut state = self.lock();
        if state.store.conversation_id() == Some(conversation_id) && state.store.remove(message_id)
        {
            self.publish(&state);
        }
        Ok(())
    }
}
