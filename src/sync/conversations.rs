//! Conversation list synchronizer.
//!
//! Fetches conversation summaries, fills in the other participant's profile
//! and publishes the list through a watch channel. Refreshes periodically,
//! but only while the list is visible.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::cache::{CurrentUser, ProfileCache};
use crate::api::{ApiError, ChatApi};
use crate::config::SyncSettings;
use crate::models::{Conversation, UserId};

pub type ConversationList = Arc<Vec<Conversation>>;

pub struct ConversationSync {
    api: Arc<dyn ChatApi>,
    current_user: Arc<CurrentUser>,
    profiles: ProfileCache,
    period: Duration,
    tx: watch::Sender<ConversationList>,
}

/// Same length and same most recent update: treat as unchanged.
fn same_shape(old: &[Conversation], new: &[Conversation]) -> bool {
    let newest = |list: &[Conversation]| list.iter().filter_map(|c| c.updated_at).max();
    old.len() == new.len() && newest(old) == newest(new)
}

impl ConversationSync {
    pub fn new(api: Arc<dyn ChatApi>, current_user: Arc<CurrentUser>, settings: &SyncSettings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self {
            profiles: ProfileCache::new(Arc::clone(&api), settings.profile_cache_ttl),
            api,
            current_user,
            period: settings.conversation_refresh,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationList> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConversationList {
        Arc::clone(&self.tx.borrow())
    }

    /// Fetch and denormalize without publishing.
    pub async fn fetch(&self) -> Result<Vec<Conversation>, ApiError> {
        let me = match self.current_user.get().await {
            Ok(user) => Some(user.id),
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                tracing::warn!("Could not resolve current user: {}", e);
                None
            }
        };

        let raw = self.api.list_conversations().await?;
        for conversation in &raw {
            for profile in conversation.embedded_profiles() {
                self.profiles.insert(profile).await;
            }
        }

        let mut conversations: Vec<Conversation> =
            raw.into_iter().map(|c| c.normalize(me)).collect();

        let missing: Vec<UserId> = conversations
            .iter()
            .filter(|c| c.other_participant.is_none())
            .filter_map(|c| c.other_participant_id(me))
            .collect();
        if !missing.is_empty() {
            let profiles = self.profiles.get_many(&missing).await;
            for conversation in conversations.iter_mut().filter(|c| c.other_participant.is_none()) {
                conversation.other_participant = conversation
                    .other_participant_id(me)
                    .and_then(|id| profiles.get(&id).cloned());
            }
        }

        tracing::debug!("Fetched {} conversations", conversations.len());
        Ok(conversations)
    }

    /// Fetch and publish. Returns whether subscribers saw a new list.
    pub async fn refresh(&self) -> Result<bool, ApiError> {
        let list = self.fetch().await?;
        Ok(self.tx.send_if_modified(|current| {
            if same_shape(current, &list) {
                return false;
            }
            *current = Arc::new(list);
            true
        }))
    }

    /// Get or create the 1:1 conversation with `participant` and refresh the list.
    pub async fn get_or_create(&self, participant: UserId) -> Result<Conversation, ApiError> {
        let raw = self.api.get_or_create_conversation(participant).await?;
        for profile in raw.embedded_profiles() {
            self.profiles.insert(profile).await;
        }
        let me = self.current_user.get().await.ok().map(|u| u.id);
        let mut conversation = raw.normalize(me);
        if conversation.other_participant.is_none() {
            if let Some(other) = conversation.other_participant_id(me) {
                conversation.other_participant = self.profiles.get(other).await.ok();
            }
        }

        if let Err(e) = self.refresh().await {
            tracing::warn!("Conversation list refresh failed: {}", e);
        }
        Ok(conversation)
    }

    /// Transient failures are logged and retried on the next tick; a 401
    /// is returned.
    async fn refresh_logged(&self) -> Result<(), ApiError> {
        match self.refresh().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unauthorized() => Err(e),
            Err(e) => {
                tracing::warn!("Conversation refresh failed: {}", e);
                Ok(())
            }
        }
    }

    /// Refresh loop driven by visibility. Fetches immediately whenever the
    /// list becomes visible, then every period; nothing runs while hidden.
    /// Ends with `Ok` when the visibility sender is dropped, or with the
    /// error when the server rejects the session.
    pub async fn run(self: Arc<Self>, mut visible: watch::Receiver<bool>) -> Result<(), ApiError> {
        loop {
            while !*visible.borrow_and_update() {
                if visible.changed().await.is_err() {
                    return Ok(());
                }
            }

            self.refresh_logged().await?;
            let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.refresh_logged().await?,
                    changed = visible.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        if !*visible.borrow_and_update() {
                            tracing::debug!("Conversation list hidden, suspending refresh");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{conversation, profile, settle, FakeApi};

    fn sync(api: &Arc<FakeApi>) -> Arc<ConversationSync> {
        let current_user = Arc::new(CurrentUser::new(api.clone()));
        Arc::new(ConversationSync::new(
            api.clone(),
            current_user,
            &SyncSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_denormalizes_with_one_fetch_per_participant() {
        let api = Arc::new(FakeApi::new());
        api.set_profile(profile(5, "Ana"));
        api.set_profile(profile(6, "Luis"));
        api.set_conversations(vec![
            conversation(10, 5, "hola", 3),
            conversation(11, 6, "hey", 2),
            conversation(12, 5, "otra", 1),
        ]);
        let s = sync(&api);

        assert!(s.refresh().await.unwrap());
        let list = s.current();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].title(), "Ana");
        assert_eq!(list[1].title(), "Luis");
        assert_eq!(list[2].title(), "Ana");
        assert_eq!(api.profile_calls(5), 1);
        assert_eq!(api.profile_calls(6), 1);
    }

    #[tokio::test]
    async fn test_embedded_profile_skips_lookup() {
        let api = Arc::new(FakeApi::new());
        let raw = serde_json::from_value(serde_json::json!({
            "id": 3,
            "participantes": [1, {"id": 7, "username": "maria"}],
        }))
        .unwrap();
        api.set_conversations(vec![raw]);
        let s = sync(&api);

        s.refresh().await.unwrap();
        assert_eq!(s.current()[0].title(), "maria");
        assert_eq!(api.profile_calls(7), 0);
    }

    #[tokio::test]
    async fn test_missing_profile_still_listed() {
        let api = Arc::new(FakeApi::new());
        api.set_conversations(vec![conversation(10, 9, "hi", 0)]);
        let s = sync(&api);

        s.refresh().await.unwrap();
        assert_eq!(s.current()[0].title(), "Conversation 10");
    }

    #[tokio::test]
    async fn test_unchanged_shape_keeps_reference() {
        let api = Arc::new(FakeApi::new());
        api.set_conversations(vec![conversation(10, 5, "a", 3)]);
        let s = sync(&api);
        let mut rx = s.subscribe();

        assert!(s.refresh().await.unwrap());
        let first = s.current();
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        api.set_conversations(vec![conversation(10, 5, "edited preview", 3)]);
        assert!(!s.refresh().await.unwrap());
        assert!(Arc::ptr_eq(&first, &s.current()));
        assert!(!rx.has_changed().unwrap());

        api.set_conversations(vec![conversation(10, 5, "newer", 4)]);
        assert!(s.refresh().await.unwrap());
        assert!(!Arc::ptr_eq(&first, &s.current()));
    }

    #[tokio::test]
    async fn test_refresh_error_propagates() {
        let api = Arc::new(FakeApi::new());
        api.fail_conversations(|| ApiError::Unauthorized { url: "x".into() });
        let s = sync(&api);
        assert!(s.refresh().await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn test_get_or_create() {
        let api = Arc::new(FakeApi::new());
        api.set_profile(profile(8, "Sofia"));
        let s = sync(&api);

        let created = s.get_or_create(8).await.unwrap();
        assert_eq!(created.title(), "Sofia");
        let again = s.get_or_create(8).await.unwrap();
        assert_eq!(created.id, again.id);
        assert_eq!(s.current().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_only_while_visible() {
        let api = Arc::new(FakeApi::new());
        api.set_conversations(vec![conversation(10, 5, "a", 0)]);
        let s = sync(&api);
        let (visible_tx, visible_rx) = watch::channel(true);
        let task = tokio::spawn(Arc::clone(&s).run(visible_rx));

        settle().await;
        assert_eq!(api.conversation_calls(), 1);

        time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(api.conversation_calls(), 2);

        visible_tx.send(false).unwrap();
        settle().await;
        time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(api.conversation_calls(), 2);

        visible_tx.send(true).unwrap();
        settle().await;
        assert_eq!(api.conversation_calls(), 3);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(api.conversation_calls(), 3);

        drop(visible_tx);
        settle().await;
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_ends_with_rejected_session() {
        let api = Arc::new(FakeApi::new());
        api.set_conversations(vec![conversation(10, 5, "a", 0)]);
        let s = sync(&api);
        let (_visible_tx, visible_rx) = watch::channel(true);
        let task = tokio::spawn(Arc::clone(&s).run(visible_rx));
        settle().await;

        api.fail_conversations(|| ApiError::Unauthorized { url: "x".into() });
        time::advance(Duration::from_secs(120)).await;
        settle().await;

        assert!(task.is_finished());
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(s.current().len(), 1);
    }
}
