//! SkillSwap chat endpoints (`/chat/conversaciones/...`)
//!
//! Converts wire payloads into canonical models at this boundary; nothing
//! past here sees `fecha` vs `enviado_en` or id-or-object senders.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use super::client::ApiClient;
use super::{ApiError, ByteStream, ChatApi};
use crate::models::{
    ConversationId, Message, MessageId, RawConversation, RawMessage, RawUser,
    UserId, UserSummary,
};

/// List endpoints answer with either a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Plain(items) => items,
            Listing::Paged { results } => results,
        }
    }
}

/// `ChatApi` over HTTP.
pub struct HttpChatApi {
    client: ApiClient,
}

impl HttpChatApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

/// Normalize a page of messages, dropping (and logging) malformed entries.
fn normalize_page(raw: Vec<RawMessage>, conversation_id: ConversationId) -> Vec<Message> {
    raw.into_iter()
        .filter_map(|m| match m.normalize(conversation_id) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!("Skipping malformed message in conversation {}: {}", conversation_id, e);
                None
            }
        })
        .collect()
}

/// Keep at most `limit` messages, the newest ones, in case the server
/// ignored the `limit` parameter.
fn newest_page(mut page: Vec<Message>, limit: usize) -> Vec<Message> {
    if page.len() > limit {
        page.sort_by_key(|m| std::cmp::Reverse(m.sort_key()));
        page.truncate(limit);
    }
    page
}

#[async_trait]
impl ChatApi for HttpChatApi {
    fn has_credential(&self) -> bool {
        self.client.has_credential()
    }

    async fn current_user(&self) -> Result<UserSummary, ApiError> {
        super::fetch_current_user(&self.client).await
    }

    async fn user_profile(&self, id: UserId) -> Result<UserSummary, ApiError> {
        let raw: RawUser = self
            .client
            .get_json(&format!("/usuarios/{}/", id), &[])
            .await?;
        Ok(raw.into())
    }

    async fn list_conversations(&self) -> Result<Vec<RawConversation>, ApiError> {
        let listing: Listing<RawConversation> =
            self.client.get_json("/chat/conversaciones/", &[]).await?;
        Ok(listing.into_vec())
    }

    async fn get_or_create_conversation(
        &self,
        participant: UserId,
    ) -> Result<RawConversation, ApiError> {
        let body = serde_json::json!({ "participantes": [participant] });
        self.client.post_json("/chat/conversaciones/", &body).await
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let path = format!("/chat/conversaciones/{}/mensajes/", conversation_id);
        let listing: Listing<RawMessage> = self
            .client
            .get_json(
                &path,
                &[
                    ("limit", limit.to_string()),
                    ("ordering", "-enviado_en".to_string()),
                ],
            )
            .await?;
        let page = normalize_page(listing.into_vec(), conversation_id);
        Ok(newest_page(page, limit))
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        body: &str,
    ) -> Result<Message, ApiError> {
        let path = format!("/chat/conversaciones/{}/enviar/", conversation_id);
        let payload = serde_json::json!({ "contenido": body });
        let raw: RawMessage = self.client.post_json(&path, &payload).await?;
        raw.normalize(conversation_id)
            .map_err(|e| ApiError::decode("sent message", e))
    }

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        let path = format!(
            "/chat/conversaciones/{}/mensajes/{}/",
            conversation_id, message_id
        );
        self.client.delete(&path).await
    }

    async fn open_stream(
        &self,
        conversation_id: ConversationId,
        last_id: MessageId,
    ) -> Result<ByteStream, ApiError> {
        let path = format!("/chat/conversaciones/{}/stream/", conversation_id);
        let resp = self
            .client
            .get_stream(&path, &[("last_id", last_id.to_string())])
            .await?;
        let url = resp.url().to_string();

        Ok(resp
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| ApiError::transport(&url, e))
            })
            .boxed())
    }
}
