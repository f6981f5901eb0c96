//! Periodic re-fetch of the newest history page while the live channel is
//! degraded.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use super::history;
use super::session::{ChatSession, Scope, WeakSession};
use crate::models::Message;

/// First tick fires immediately, then every `period`. Ends when the session
/// is dropped, the scope goes stale, or the task is aborted.
pub(super) async fn run(session: WeakSession, scope: Scope, period: Duration) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(s) = session.upgrade() else {
            return;
        };
        if !s.is_current(scope) {
            return;
        }

        let api = s.api();
        let limit = s.settings().history_limit;
        match history::load_history(api.as_ref(), scope.conversation_id, limit).await {
            Ok(messages) => {
                if !s.on_poll_result(scope, messages) {
                    return;
                }
            }
            Err(e) if e.is_unauthorized() => {
                s.on_unauthorized(scope, e);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    "Polling conversation {} failed: {}",
                    scope.conversation_id,
                    e
                );
            }
        }
    }
}

impl ChatSession {
    /// Returns false when the selection has moved on.
    pub(super) fn on_poll_result(&self, scope: Scope, messages: Vec<Message>) -> bool {
        let mut state = self.lock();
        if !state.is_current(scope) {
            return false;
        }
        for m in &messages {
            state.channel.observed(m.id);
        }
        if state.store.merge_all(messages) {
            tracing::debug!("Polling picked up new messages for {}", scope.conversation_id);
            self.publish(&state);
        }
        true
    }
}
