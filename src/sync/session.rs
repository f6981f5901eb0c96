//! Per-conversation message synchronization session.
//!
//! Owns the Message Store, the live channel state and the background tasks
//! (push stream, polling fallback) for the selected conversation. Every async
//! operation carries the [`Scope`] it was issued under; results whose scope
//! is no longer current are dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use super::cache::CurrentUser;
use super::channel::{ChannelAction, ChannelMode, ChannelPhase, LiveChannel};
use super::history::{self, HistoryState};
use super::store::{MessageStore, StoreNotifier, StoreRevision, Subscription};
use super::{live, polling};
use crate::api::{ApiError, ChatApi};
use crate::config::SyncSettings;
use crate::models::{ConversationId, Message, MessageId, UserId};

/// Identity of one conversation selection. Re-selecting the same
/// conversation yields a new scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub conversation_id: ConversationId,
    generation: u64,
}

#[derive(Default)]
pub(super) struct SessionState {
    generation: u64,
    pub(super) store: MessageStore,
    pub(super) channel: LiveChannel,
    history: HistoryState,
    /// Set once the server rejects the credential; never cleared.
    expired: Option<ApiError>,
    live_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl SessionState {
    pub(super) fn is_current(&self, scope: Scope) -> bool {
        self.generation == scope.generation
            && self.store.conversation_id() == Some(scope.conversation_id)
    }

    fn stop_tasks(&mut self) {
        if let Some(task) = self.live_task.take() {
            task.abort();
        }
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

pub(super) struct Inner {
    api: Arc<dyn ChatApi>,
    settings: SyncSettings,
    current_user: Arc<CurrentUser>,
    state: Mutex<SessionState>,
    notifier: StoreNotifier,
}

/// Handle to the synchronization session. Cheap to clone.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

/// Non-owning handle held by background tasks, so a dropped session stops them.
#[derive(Clone)]
pub(super) struct WeakSession(Weak<Inner>);

impl WeakSession {
    pub(super) fn upgrade(&self) -> Option<ChatSession> {
        self.0.upgrade().map(|inner| ChatSession { inner })
    }
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, settings: SyncSettings) -> Self {
        let current_user = Arc::new(CurrentUser::new(Arc::clone(&api)));
        Self::with_current_user(api, settings, current_user)
    }

    /// Share an already constructed current-user cache (e.g. with the
    /// conversation list synchronizer).
    pub fn with_current_user(
        api: Arc<dyn ChatApi>,
        settings: SyncSettings,
        current_user: Arc<CurrentUser>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                settings,
                current_user,
                state: Mutex::new(SessionState::default()),
                notifier: StoreNotifier::new(),
            }),
        }
    }

    pub(super) fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn api(&self) -> Arc<dyn ChatApi> {
        Arc::clone(&self.inner.api)
    }

    pub(super) fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub(super) fn publish(&self, state: &SessionState) {
        self.inner.notifier.publish(&state.store);
    }

    // -- Observation ---------------------------------------------------------

    /// Subscribe to store changes. Drop the subscription to unsubscribe.
    pub fn subscribe(&self) -> Subscription {
        self.inner.notifier.subscribe()
    }

    pub fn revision(&self) -> StoreRevision {
        self.inner.notifier.current()
    }

    /// Snapshot of the active conversation's messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().store.messages().to_vec()
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.lock().store.conversation_id()
    }

    pub fn history_state(&self) -> HistoryState {
        self.lock().history.clone()
    }

    pub fn channel_phase(&self) -> ChannelPhase {
        self.lock().channel.phase()
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.lock().channel.mode()
    }

    /// The live channel's resume cursor.
    pub fn last_seen_message_id(&self) -> MessageId {
        self.lock().channel.cursor().last_seen()
    }

    pub fn is_polling(&self) -> bool {
        self.lock()
            .poll_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.inner.current_user.id()
    }

    pub fn is_current(&self, scope: Scope) -> bool {
        self.lock().is_current(scope)
    }

    /// The 401 that invalidated this session, from any foreground or
    /// background request.
    pub fn session_expired(&self) -> Option<ApiError> {
        self.lock().expired.clone()
    }

    // -- Selection -----------------------------------------------------------

    /// Select a conversation and load its history. Any work for the
    /// previously selected conversation is abandoned.
    ///
    /// Returns the history error for display; a load superseded by another
    /// selection returns `Ok(())` and changes nothing.
    pub async fn select_conversation(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        let scope = self.begin_selection(conversation_id);
        self.load_scoped(scope).await
    }

    /// Re-run a failed history load for the current selection.
    pub async fn retry_history(&self) -> Result<(), ApiError> {
        let scope = {
            let mut state = self.lock();
            let Some(conversation_id) = state.store.conversation_id() else {
                return Ok(());
            };
            if !matches!(state.history, HistoryState::Failed(_)) {
                return Ok(());
            }
            state.history = HistoryState::Loading;
            self.publish(&state);
            Scope {
                conversation_id,
                generation: state.generation,
            }
        };
        self.load_scoped(scope).await
    }

    /// Deselect: tear down the stream and polling, clear the store.
    pub fn close(&self) {
        let mut state = self.lock();
        state.stop_tasks();
        state.generation += 1;
        state.store.reset(None);
        state.channel.deselect();
        state.history = HistoryState::Idle;
        self.publish(&state);
    }

    /// Mark every loaded message as read. Local only; there is no
    /// read-receipt endpoint.
    pub fn mark_read(&self) {
        let mut state = self.lock();
        if state.store.mark_all_read() {
            self.publish(&state);
        }
    }

    fn begin_selection(&self, conversation_id: ConversationId) -> Scope {
        let mut state = self.lock();
        state.stop_tasks();
        state.generation += 1;
        state.store.reset(Some(conversation_id));
        state.channel.select();
        state.history = HistoryState::Loading;
        self.publish(&state);
        tracing::info!("Selected conversation {}", conversation_id);

        Scope {
            conversation_id,
            generation: state.generation,
        }
    }

    async fn load_scoped(&self, scope: Scope) -> Result<(), ApiError> {
        // Needed to classify own vs. other messages; fetched once per session.
        if let Err(e) = self.inner.current_user.get().await {
            if e.is_unauthorized() {
                self.on_unauthorized(scope, e.clone());
                return Err(e);
            }
            tracing::warn!("Could not resolve current user: {}", e);
        }

        let result = history::load_history(
            self.inner.api.as_ref(),
            scope.conversation_id,
            self.inner.settings.history_limit,
        )
        .await;

        let mut state = self.lock();
        if !state.is_current(scope) {
            tracing::debug!(
                "Discarding stale history for conversation {}",
                scope.conversation_id
            );
            return Ok(());
        }

        match result {
            Ok(messages) => {
                state.store.merge_all(messages);
                let newest = state.store.newest_id();
                state.history = HistoryState::Loaded;
                let action = state
                    .channel
                    .history_resolved(newest, self.inner.api.has_credential());
                self.apply_action(&mut state, scope, action);
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "History load failed for conversation {}: {}",
                    scope.conversation_id,
                    e
                );
                if e.is_unauthorized() {
                    state.expired = Some(e.clone());
                }
                state.history = HistoryState::Failed(e.to_string());
                self.publish(&state);
                Err(e)
            }
        }
    }

    /// Record a rejected credential and stop background work. Subscribers
    /// are notified even when `scope` is stale.
    pub(super) fn on_unauthorized(&self, scope: Scope, err: ApiError) {
        let mut state = self.lock();
        tracing::warn!("Session rejected by server: {}", err);
        state.stop_tasks();
        if state.is_current(scope) {
            state.history = HistoryState::Failed(err.to_string());
        }
        state.expired = Some(err);
        self.publish(&state);
    }

    /// Carry out a channel transition's side effect. Called with the lock held.
    pub(super) fn apply_action(&self, state: &mut SessionState, scope: Scope, action: ChannelAction) {
        match action {
            ChannelAction::None => {}
            ChannelAction::Connect { last_id } => {
                tracing::debug!(
                    "Opening live channel for conversation {} after id {}",
                    scope.conversation_id,
                    last_id
                );
                let task = tokio::spawn(live::run(self.downgrade(), scope, last_id));
                state.live_task = Some(task);
            }
            ChannelAction::StartPolling => {
                tracing::info!(
                    "Live channel unavailable for conversation {}, polling every {}s",
                    scope.conversation_id,
                    self.inner.settings.poll_interval.as_secs()
                );
                // The stream task is already on its way out; detach it.
                state.live_task.take();
                if let Some(old) = state.poll_task.take() {
                    old.abort();
                }
                let task = tokio::spawn(polling::run(
                    self.downgrade(),
                    scope,
                    self.inner.settings.poll_interval,
                ));
                state.poll_task = Some(task);
            }
            ChannelAction::StopPolling => {
                if let Some(task) = state.poll_task.take() {
                    tracing::debug!("Stopping polling for conversation {}", scope.conversation_id);
                    task.abort();
                }
            }
        }
    }
}
