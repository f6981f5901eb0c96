//! Scripted in-memory `ChatApi` for engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::api::{ApiError, ByteStream, ChatApi};
use crate::models::{
    ConversationId, Message, MessageId, RawConversation, UserId, UserSummary,
};

type ErrorFn = Box<dyn Fn() -> ApiError + Send + Sync>;
pub type StreamSender = mpsc::UnboundedSender<Result<Vec<u8>, ApiError>>;

/// A message from [`FakeApi::OTHER`] at `10:00 + minute` on a fixed day.
pub fn message(conversation_id: ConversationId, id: MessageId, minute: u32) -> Message {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    Message {
        id,
        conversation_id,
        sender_id: FakeApi::OTHER,
        body: format!("message {}", id),
        sent_at: Some(base + Duration::minutes(i64::from(minute))),
        read: false,
    }
}

/// Wire form of a push event carrying `message`.
pub fn sse_frame(message: &Message) -> Vec<u8> {
    let payload = serde_json::json!({
        "id": message.id,
        "contenido": message.body,
        "remitente": message.sender_id,
        "enviado_en": message.sent_at.map(|t| t.to_rfc3339()),
    });
    format!("id: {}\ndata: {}\n\n", message.id, payload).into_bytes()
}

/// Conversation between [`FakeApi::ME`] and `other`, updated at `10:00 + minute`.
pub fn conversation(id: ConversationId, other: UserId, last: &str, minute: u32) -> RawConversation {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "participantes": [FakeApi::ME, other],
        "ultimo_mensaje": last,
        "fecha_actualizacion": format!("2024-05-01T10:{:02}:00Z", minute),
    }))
    .unwrap()
}

pub fn profile(id: UserId, name: &str) -> UserSummary {
    UserSummary {
        id,
        name: name.to_string(),
        avatar: None,
        email: None,
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct FakeState {
    reject_current_user: bool,
    reject_stream: bool,
    current_user_calls: usize,
    profiles: HashMap<UserId, UserSummary>,
    profile_calls: HashMap<UserId, usize>,
    conversations: Vec<RawConversation>,
    conversation_calls: usize,
    conversation_error: Option<ErrorFn>,
    history: HashMap<ConversationId, Vec<Message>>,
    history_errors: HashMap<ConversationId, ErrorFn>,
    history_calls: HashMap<ConversationId, usize>,
    history_gates: HashMap<ConversationId, Arc<Notify>>,
    next_message_id: MessageId,
    send_error: Option<ErrorFn>,
    sent: Vec<(ConversationId, String)>,
    delete_error: Option<ErrorFn>,
    deleted: Vec<(ConversationId, MessageId)>,
    streams: HashMap<ConversationId, mpsc::UnboundedReceiver<Result<Vec<u8>, ApiError>>>,
    stream_opens: Vec<(ConversationId, MessageId)>,
}

pub struct FakeApi {
    credential: bool,
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub const ME: UserId = 1;
    pub const OTHER: UserId = 2;

    pub fn new() -> Self {
        Self {
            credential: true,
            state: Mutex::new(FakeState {
                next_message_id: 1000,
                ..FakeState::default()
            }),
        }
    }

    pub fn without_credential() -> Self {
        Self {
            credential: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn reject_current_user(&self) {
        self.lock().reject_current_user = true;
    }

    pub fn reject_stream(&self) {
        self.lock().reject_stream = true;
    }

    pub fn current_user_calls(&self) -> usize {
        self.lock().current_user_calls
    }

    pub fn set_profile(&self, profile: UserSummary) {
        self.lock().profiles.insert(profile.id, profile);
    }

    pub fn profile_calls(&self, id: UserId) -> usize {
        self.lock().profile_calls.get(&id).copied().unwrap_or(0)
    }

    pub fn set_conversations(&self, conversations: Vec<RawConversation>) {
        self.lock().conversations = conversations;
    }

    pub fn fail_conversations(&self, err: impl Fn() -> ApiError + Send + Sync + 'static) {
        self.lock().conversation_error = Some(Box::new(err));
    }

    pub fn conversation_calls(&self) -> usize {
        self.lock().conversation_calls
    }

    /// Serve `messages` (wire order) for the conversation.
    pub fn set_history(&self, conversation_id: ConversationId, messages: Vec<Message>) {
        self.lock().history.insert(conversation_id, messages);
    }

    pub fn fail_history(
        &self,
        conversation_id: ConversationId,
        err: impl Fn() -> ApiError + Send + Sync + 'static,
    ) {
        self.lock().history_errors.insert(conversation_id, Box::new(err));
    }

    pub fn clear_history_failure(&self, conversation_id: ConversationId) {
        self.lock().history_errors.remove(&conversation_id);
    }

    pub fn history_calls(&self, conversation_id: ConversationId) -> usize {
        self.lock()
            .history_calls
            .get(&conversation_id)
            .copied()
            .unwrap_or(0)
    }

    /// Hold every history request for the conversation until the returned
    /// `Notify` is signalled once per request.
    pub fn gate_history(&self, conversation_id: ConversationId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock()
            .history_gates
            .insert(conversation_id, Arc::clone(&gate));
        gate
    }

    pub fn set_next_message_id(&self, id: MessageId) {
        self.lock().next_message_id = id;
    }

    pub fn fail_send(&self, err: impl Fn() -> ApiError + Send + Sync + 'static) {
        self.lock().send_error = Some(Box::new(err));
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.lock().sent.clone()
    }

    pub fn fail_delete(&self, err: impl Fn() -> ApiError + Send + Sync + 'static) {
        self.lock().delete_error = Some(Box::new(err));
    }

    pub fn deleted(&self) -> Vec<(ConversationId, MessageId)> {
        self.lock().deleted.clone()
    }

    /// Make the next `open_stream` for the conversation succeed; chunks and
    /// errors pushed into the sender are delivered in order, dropping it ends
    /// the stream.
    pub fn register_stream(&self, conversation_id: ConversationId) -> StreamSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().streams.insert(conversation_id, rx);
        tx
    }

    pub fn stream_opens(&self) -> Vec<(ConversationId, MessageId)> {
        self.lock().stream_opens.clone()
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn current_user(&self) -> Result<UserSummary, ApiError> {
        let mut state = self.lock();
        state.current_user_calls += 1;
        if state.reject_current_user {
            return Err(ApiError::Unauthorized {
                url: "/auth/user/".into(),
            });
        }
        Ok(profile(Self::ME, "Me"))
    }

    async fn user_profile(&self, id: UserId) -> Result<UserSummary, ApiError> {
        let mut state = self.lock();
        *state.profile_calls.entry(id).or_default() += 1;
        state.profiles.get(&id).cloned().ok_or(ApiError::NotFound {
            url: format!("/usuarios/{}/", id),
        })
    }

    async fn list_conversations(&self) -> Result<Vec<RawConversation>, ApiError> {
        let mut state = self.lock();
        state.conversation_calls += 1;
        if let Some(err) = &state.conversation_error {
            return Err(err());
        }
        Ok(state.conversations.clone())
    }

    async fn get_or_create_conversation(
        &self,
        participant: UserId,
    ) -> Result<RawConversation, ApiError> {
        let mut state = self.lock();
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.participantes.iter().any(|p| p.id() == participant))
        {
            return Ok(existing.clone());
        }
        let id = state.conversations.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let created = conversation(id, participant, "", 0);
        state.conversations.push(created.clone());
        Ok(created)
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let gate = {
            let mut state = self.lock();
            *state.history_calls.entry(conversation_id).or_default() += 1;
            state.history_gates.get(&conversation_id).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.lock();
        if let Some(err) = state.history_errors.get(&conversation_id) {
            return Err(err());
        }
        Ok(state
            .history
            .get(&conversation_id)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        body: &str,
    ) -> Result<Message, ApiError> {
        let mut state = self.lock();
        if let Some(err) = &state.send_error {
            return Err(err());
        }
        state.sent.push((conversation_id, body.to_string()));
        let id = state.next_message_id;
        state.next_message_id += 1;
        Ok(Message {
            id,
            conversation_id,
            sender_id: Self::ME,
            body: body.to_string(),
            sent_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            read: false,
        })
    }

    async fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        if let Some(err) = &state.delete_error {
            return Err(err());
        }
        state.deleted.push((conversation_id, message_id));
        Ok(())
    }

    async fn open_stream(
        &self,
        conversation_id: ConversationId,
        last_id: MessageId,
    ) -> Result<ByteStream, ApiError> {
        let mut state = self.lock();
        state.stream_opens.push((conversation_id, last_id));
        if state.reject_stream {
            return Err(ApiError::Unauthorized {
                url: "/stream/".into(),
            });
        }
        match state.streams.remove(&conversation_id) {
            Some(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => Err(ApiError::Transport {
                url: "/stream/".into(),
                message: "connection refused".into(),
            }),
        }
    }
}
