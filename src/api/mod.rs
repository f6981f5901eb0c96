//! API client module for the SkillSwap REST/SSE API

mod chat;
pub mod client;
mod error;
mod me;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use chat::HttpChatApi;
pub use error::ApiError;
pub use me::{fetch_current_user, whoami};

use crate::models::{
    ConversationId, Message, MessageId, RawConversation, UserId, UserSummary,
};

/// Raw body chunks of an event-stream response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// The chat operations the sync engine consumes.
///
/// `HttpChatApi` is the production implementation; engine tests script a fake.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Whether a bearer credential is available for the push subscription.
    /// Without one the channel goes straight to polling.
    fn has_credential(&self) -> bool;

    async fn current_user(&self) -> Result<UserSummary, ApiError>;

    async fn user_profile(&self, id: UserId) -> Result<UserSummary, ApiError>;

    async fn list_conversations(&self) -> Result<Vec<RawConversation>, ApiError>;

    async fn get_or_create_conversation(
        &self,
        participant: UserId,
    ) -> Result<RawConversation, ApiError>;

    /// Most recent `limit` messages, newest first as delivered by the server.
    async fn list_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError>;

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        body: &str,
    ) -> Result<Message, ApiError>;

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ApiError>;

    /// Open the push subscription, resuming after `last_id`.
    async fn open_stream(
        &self,
        conversation_id: ConversationId,
        last_id: MessageId,
    ) -> Result<ByteStream, ApiError>;
}
