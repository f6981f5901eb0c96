//! One-shot CLI commands over the sync engine.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::cache::CurrentUser;
use super::conversations::ConversationSync;
use super::history::{self, HistoryState};
use super::session::ChatSession;
use crate::api::client::ApiClient;
use crate::api::{ChatApi, HttpChatApi};
use crate::config::{Config, SyncSettings};
use crate::models::{Conversation, ConversationId, Message, MessageId, UserId};

/// Shared engine pieces built from the effective configuration.
pub struct Engine {
    pub api: Arc<dyn ChatApi>,
    pub settings: SyncSettings,
    pub current_user: Arc<CurrentUser>,
}

impl Engine {
    pub fn from_config() -> Result<Self> {
        let config = Config::load_effective()?;
        let client = ApiClient::from_config(&config)?;
        let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(client));
        Ok(Self {
            current_user: Arc::new(CurrentUser::new(Arc::clone(&api))),
            settings: config.sync_settings(),
            api,
        })
    }

    pub fn session(&self) -> ChatSession {
        ChatSession::with_current_user(
            Arc::clone(&self.api),
            self.settings.clone(),
            Arc::clone(&self.current_user),
        )
    }

    pub fn conversations(&self) -> ConversationSync {
        ConversationSync::new(
            Arc::clone(&self.api),
            Arc::clone(&self.current_user),
            &self.settings,
        )
    }
}

/// One-line rendering used by `read` and `watch`.
pub fn format_message(message: &Message, me: Option<UserId>) -> String {
    let time = message
        .sent_at
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------------".to_string());
    let who = if message.is_from(me) {
        "me".to_string()
    } else {
        format!("user {}", message.sender_id)
    };
    format!("[{}] #{} {}: {}", time, message.id, who, message.body)
}

fn print_conversation(conversation: &Conversation) {
    println!("{}", conversation.title());
    println!("  ID: {}", conversation.id);
    if let Some(updated) = conversation.updated_at {
        println!(
            "  Last: {}",
            updated.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
    }
    if let Some(preview) = &conversation.last_message {
        if !preview.body.trim().is_empty() {
            println!("  > {}", preview.body.trim());
        }
    }
    if conversation.unread_count > 0 {
        println!("  Unread: {}", conversation.unread_count);
    }
}

pub async fn list_conversations(limit: usize) -> Result<()> {
    let engine = Engine::from_config()?;
    let conversations = engine
        .conversations()
        .fetch()
        .await
        .context("Failed to load conversations")?;

    println!("\nConversations:");
    println!("{:-<60}", "");

    if conversations.is_empty() {
        println!("  (no conversations yet)");
        return Ok(());
    }

    for conversation in conversations.iter().take(limit) {
        print_conversation(conversation);
        println!();
    }
    Ok(())
}

pub async fn open_conversation(user_id: UserId) -> Result<()> {
    let engine = Engine::from_config()?;
    let conversation = engine
        .conversations()
        .get_or_create(user_id)
        .await
        .with_context(|| format!("Failed to open a conversation with user {}", user_id))?;
    print_conversation(&conversation);
    Ok(())
}

pub async fn read_messages(conversation_id: ConversationId, limit: usize) -> Result<()> {
    let engine = Engine::from_config()?;
    let me = engine.current_user.get().await.ok().map(|u| u.id);
    let messages = history::load_history(engine.api.as_ref(), conversation_id, limit)
        .await
        .context("Failed to load messages")?;

    if messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    for message in &messages {
        println!("{}", format_message(message, me));
    }
    Ok(())
}

pub async fn send_message(conversation_id: ConversationId, body: &str) -> Result<()> {
    let engine = Engine::from_config()?;
    let message = engine
        .session()
        .send(conversation_id, body)
        .await
        .context("Message not sent")?;
    println!("Message sent (id {}).", message.id);
    Ok(())
}

pub async fn delete_message(conversation_id: ConversationId, message_id: MessageId) -> Result<()> {
    let engine = Engine::from_config()?;
    engine
        .session()
        .delete_message(conversation_id, message_id)
        .await
        .context("Failed to delete message")?;
    println!("Message deleted.");
    Ok(())
}

/// Follow a conversation headless: history, then live updates (or polling),
/// printing each message as it lands until Ctrl-C.
pub async fn watch(conversation_id: ConversationId) -> Result<()> {
    let engine = Engine::from_config()?;
    let session = engine.session();
    let mut updates = session.subscribe();

    session
        .select_conversation(conversation_id)
        .await
        .context("Failed to load messages")?;

    let me = session.current_user_id();
    let mut printed: Option<MessageId> = None;
    let print_new = |printed: &mut Option<MessageId>| {
        for message in session.messages() {
            if printed.map_or(true, |last| message.id > last) {
                println!("{}", format_message(&message, me));
                *printed = Some(printed.map_or(message.id, |last| last.max(message.id)));
            }
        }
    };
    print_new(&mut printed);
    eprintln!(
        "-- watching conversation {} ({}), Ctrl-C to stop",
        conversation_id,
        session.channel_phase().as_str()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            rev = updates.changed() => {
                if rev.is_none() {
                    break;
                }
                if let HistoryState::Failed(e) = session.history_state() {
                    anyhow::bail!("History failed: {}", e);
                }
                print_new(&mut printed);
            }
        }
    }

    session.close();
    Ok(())
}
