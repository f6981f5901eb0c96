//! Push subscription task for the selected conversation.
//!
//! One task per selection: open the stream resuming after the cursor, decode
//! events into messages, merge them. Any transport error degrades the channel
//! to polling; the stream is not reopened until the conversation is selected
//! again.

use futures::StreamExt;

use super::session::{ChatSession, Scope, WeakSession};
use super::sse::{SseDecoder, SseEvent};
use crate::api::ApiError;
use crate::models::{decode_message, MessageId};

pub(super) async fn run(session: WeakSession, scope: Scope, last_id: MessageId) {
    let Some(api) = session.upgrade().map(|s| s.api()) else {
        return;
    };

    let mut stream = match api.open_stream(scope.conversation_id, last_id).await {
        Ok(stream) => stream,
        Err(e) => {
            if let Some(s) = session.upgrade() {
                if e.is_unauthorized() {
                    s.on_unauthorized(scope, e);
                } else {
                    s.on_transport_error(scope, &e);
                }
            }
            return;
        }
    };

    match session.upgrade() {
        Some(s) if s.on_stream_open(scope) => {}
        _ => return,
    }

    let mut decoder = SseDecoder::new();
    let error = loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                let Some(s) = session.upgrade() else {
                    return;
                };
                for event in decoder.feed(&chunk) {
                    if !s.on_push_event(scope, &event) {
                        tracing::debug!(
                            "Closing stale stream for conversation {}",
                            scope.conversation_id
                        );
                        return;
                    }
                }
            }
            Some(Err(e)) => break e,
            None => {
                break ApiError::Transport {
                    url: "/stream/".into(),
                    message: "stream closed by server".into(),
                }
            }
        }
    };

    if let Some(s) = session.upgrade() {
        s.on_transport_error(scope, &error);
    }
}

impl ChatSession {
    /// Returns false when the selection has moved on.
    pub(super) fn on_stream_open(&self, scope: Scope) -> bool {
        let mut state = self.lock();
        if !state.is_current(scope) {
            return false;
        }
        let action = state.channel.connected();
        self.apply_action(&mut state, scope, action);
        tracing::info!("Live channel open for conversation {}", scope.conversation_id);
        true
    }

    /// Merge one push event. Returns false when the selection has moved on.
    pub(super) fn on_push_event(&self, scope: Scope, event: &SseEvent) -> bool {
        if !event.is_message() {
            return self.is_current(scope);
        }

        let message = match decode_message(&event.data, scope.conversation_id) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    "Dropping malformed push event for conversation {}: {:#}",
                    scope.conversation_id,
                    e
                );
                return self.is_current(scope);
            }
        };

        let mut state = self.lock();
        if !state.is_current(scope) {
            return false;
        }
        state.channel.observed(message.id);
        if state.store.merge_all([message]) {
            self.publish(&state);
        }
        true
    }

    pub(super) fn on_transport_error(&self, scope: Scope, err: &ApiError) {
        let mut state = self.lock();
        if !state.is_current(scope) {
            return;
        }
        tracing::warn!(
            "Live channel for conversation {} failed: {}",
            scope.conversation_id,
            err
        );
        let action = state.channel.transport_failed();
        self.apply_action(&mut state, scope, action);
        self.publish(&state);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::ApiError;
    use crate::config::SyncSettings;
    use crate::sync::testing::{message, settle, sse_frame, FakeApi};
    use crate::sync::{ChannelMode, ChannelPhase, ChatSession};

    fn ids(s: &ChatSession) -> Vec<u64> {
        s.messages().iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn test_push_merges_and_advances_cursor() {
        let api = Arc::new(FakeApi::new());
        api.set_history(1, vec![message(1, 2, 1), message(1, 1, 0)]);
        let tx = api.register_stream(1);
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;

        tx.send(Ok(sse_frame(&message(1, 3, 2)))).unwrap();
        settle().await;

        assert_eq!(ids(&s), vec![1, 2, 3]);
        assert_eq!(s.last_seen_message_id(), 3);
        assert_eq!(s.channel_phase(), ChannelPhase::Live);
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let api = Arc::new(FakeApi::new());
        let tx = api.register_stream(1);
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;

        let frame = sse_frame(&message(1, 7, 0));
        let (a, b) = frame.split_at(10);
        tx.send(Ok(a.to_vec())).unwrap();
        settle().await;
        assert!(s.messages().is_empty());
        tx.send(Ok(b.to_vec())).unwrap();
        settle().await;
        assert_eq!(ids(&s), vec![7]);
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let api = Arc::new(FakeApi::new());
        let tx = api.register_stream(1);
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;

        tx.send(Ok(b"data: {not json\n\n".to_vec())).unwrap();
        tx.send(Ok(sse_frame(&message(1, 4, 0)))).unwrap();
        settle().await;

        assert_eq!(ids(&s), vec![4]);
        assert_eq!(s.channel_phase(), ChannelPhase::Live);
    }

    #[tokio::test]
    async fn test_transport_error_degrades_to_polling() {
        let api = Arc::new(FakeApi::new());
        api.set_history(1, vec![message(1, 1, 0)]);
        let tx = api.register_stream(1);
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;
        assert_eq!(s.channel_phase(), ChannelPhase::Live);

        tx.send(Err(ApiError::Transport {
            url: "/stream/".into(),
            message: "reset".into(),
        }))
        .unwrap();
        settle().await;

        assert_eq!(s.channel_phase(), ChannelPhase::Degraded);
        assert_eq!(s.channel_mode(), ChannelMode::UsingPollingFallback);
        assert!(s.is_polling());
        // No reconnect attempt while degraded.
        assert_eq!(api.stream_opens().len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_degrades() {
        let api = Arc::new(FakeApi::new());
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;

        assert_eq!(api.stream_opens(), vec![(1, 0)]);
        assert_eq!(s.channel_phase(), ChannelPhase::Degraded);
        assert!(s.is_polling());
    }

    #[tokio::test]
    async fn test_rejected_stream_expires_session() {
        let api = Arc::new(FakeApi::new());
        api.reject_stream();
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;

        assert!(s.session_expired().is_some_and(|e| e.is_unauthorized()));
        assert!(!s.is_polling());
        assert_eq!(api.history_calls(1), 1);
    }

    #[tokio::test]
    async fn test_switch_ignores_old_stream() {
        let api = Arc::new(FakeApi::new());
        let old = api.register_stream(1);
        let _new = api.register_stream(2);
        let s = ChatSession::new(api.clone(), SyncSettings::default());
        s.select_conversation(1).await.unwrap();
        settle().await;
        s.select_conversation(2).await.unwrap();
        settle().await;

        // The old task was aborted, so its stream receiver is gone.
        assert!(old.send(Ok(sse_frame(&message(1, 9, 0)))).is_err());
        assert!(s.messages().is_empty());
        assert_eq!(s.active_conversation(), Some(2));
        assert_eq!(s.channel_phase(), ChannelPhase::Live);
    }
}
