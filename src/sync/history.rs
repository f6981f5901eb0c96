//! History loader: the most recent page of a conversation.

use crate::api::{ApiError, ChatApi};
use crate::models::{ConversationId, Message};

/// Default page size for history loads and polling.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Load state of the active conversation's history, for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryState {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// User-visible error; the store was left untouched and a retry is possible.
    Failed(String),
}

/// Fetch the newest `limit` messages and return them oldest-first.
///
/// A 404 (conversation without messages yet) is an empty page, not an error.
pub async fn load_history(
    api: &dyn ChatApi,
    conversation_id: ConversationId,
    limit: usize,
) -> Result<Vec<Message>, ApiError> {
    let mut messages = match api.list_messages(conversation_id, limit).await {
        Ok(messages) => messages,
        Err(e) if e.is_not_found() => {
            tracing::debug!("No messages yet for conversation {}", conversation_id);
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    // Wire order is newest first; reverse before the stable sort so equal
    // timestamps end up in ascending arrival order.
    messages.reverse();
    messages.sort_by_key(Message::sort_key);
    tracing::debug!(
        "Loaded {} messages for conversation {}",
        messages.len(),
        conversation_id
    );
    Ok(messages)
}
