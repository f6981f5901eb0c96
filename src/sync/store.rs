//! Ordered, deduplicated message collection for the active conversation.
//!
//! Every producer (history, live channel, polling, send) goes through
//! [`MessageStore::merge_incoming`]; consumers observe changes through a
//! [`Subscription`] instead of polling the store.

use tokio::sync::watch;

use crate::models::{ConversationId, Message, MessageId};

/// Result of merging one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Messages for one conversation, ascending by `sent_at`, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStore {
    conversation_id: Option<ConversationId>,
    messages: Vec<Message>,
}

impl MessageStore {
    /// Empty the store and re-key it to another conversation (or none).
    pub fn reset(&mut self, conversation_id: Option<ConversationId>) {
        self.conversation_id = conversation_id;
        self.messages.clear();
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest message id present.
    pub fn newest_id(&self) -> Option<MessageId> {
        self.messages.iter().map(|m| m.id).max()
    }

    /// Insert a new message or replace an existing one with the same id.
    ///
    /// Replacement keeps the entry's position unless its timestamp moved.
    /// Insertion goes after every entry with an equal or earlier timestamp,
    /// so ties keep arrival order.
    ///
    /// `read` is sticky: a server copy never clears a locally set flag.
    pub fn merge_incoming(&mut self, mut message: Message) -> MergeOutcome {
        if let Some(pos) = self.messages.iter().position(|m| m.id == message.id) {
            message.read |= self.messages[pos].read;
            if self.messages[pos] == message {
                return MergeOutcome::Unchanged;
            }
            let moved = self.messages[pos].sort_key() != message.sort_key();
            self.messages[pos] = message;
            if moved {
                self.messages.sort_by_key(Message::sort_key);
            }
            return MergeOutcome::Updated;
        }

        let key = message.sort_key();
        let at = self.messages.partition_point(|m| m.sort_key() <= key);
        self.messages.insert(at, message);
        MergeOutcome::Inserted
    }

    /// Merge a batch; returns true if anything changed.
    pub fn merge_all(&mut self, messages: impl IntoIterator<Item = Message>) -> bool {
        messages
            .into_iter()
            .fold(false, |changed, m| {
                self.merge_incoming(m) != MergeOutcome::Unchanged || changed
            })
    }

    /// Remove by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        before != self.messages.len()
    }

    /// Mark every message read locally. Returns true if any flag flipped.
    pub fn mark_all_read(&mut self) -> bool {
        let mut changed = false;
        for m in self.messages.iter_mut().filter(|m| !m.read) {
            m.read = true;
            changed = true;
        }
        changed
    }
}

/// What subscribers see after each publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreRevision {
    pub conversation_id: Option<ConversationId>,
    /// Bumped on every publish.
    pub version: u64,
    pub len: usize,
}

/// Publishing side of the store's change notifications.
pub struct StoreNotifier {
    tx: watch::Sender<StoreRevision>,
}

impl Default for StoreNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StoreRevision::default());
        Self { tx }
    }

    /// Notify subscribers of the store's current shape.
    pub fn publish(&self, store: &MessageStore) {
        self.tx.send_modify(|rev| {
            rev.conversation_id = store.conversation_id();
            rev.len = store.len();
            rev.version += 1;
        });
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> StoreRevision {
        *self.tx.borrow()
    }
}

/// A live subscription to store changes. Dropping it unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<StoreRevision>,
}

impl Subscription {
    /// Wait for the next publish. Returns `None` once the store is gone.
    ///
    /// Publishes that happen while nobody is waiting coalesce into one.
    pub async fn changed(&mut self) -> Option<StoreRevision> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
