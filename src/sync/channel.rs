//! Live update channel state machine
//!
//! Pure state and transitions; the transport side lives in `live.rs` and the
//! polling side in `polling.rs`. The session applies the returned
//! [`ChannelAction`]s.

use crate::models::MessageId;

/// Lifecycle of the push subscription for the selected conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No conversation selected.
    #[default]
    Idle,
    LoadingHistory,
    /// Stream being opened with the cursor as resume point.
    Connecting,
    Live,
    /// Transport failed or no credential; polling has taken over.
    /// Terminal until the conversation is selected again.
    Degraded,
}

impl ChannelPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelPhase::Idle => "idle",
            ChannelPhase::LoadingHistory => "loading",
            ChannelPhase::Connecting => "connecting",
            ChannelPhase::Live => "live",
            ChannelPhase::Degraded => "polling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    #[default]
    UsingLiveChannel,
    UsingPollingFallback,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    None,
    /// Open the push stream resuming after `last_id`.
    Connect { last_id: MessageId },
    StartPolling,
    StopPolling,
}

/// Highest message id observed in the current selection. Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last_seen: MessageId,
}

impl Cursor {
    pub fn last_seen(&self) -> MessageId {
        self.last_seen
    }

    pub fn advance(&mut self, id: MessageId) {
        self.last_seen = self.last_seen.max(id);
    }
}

/// Channel state for one conversation selection.
#[derive(Debug, Clone, Default)]
pub struct LiveChannel {
    phase: ChannelPhase,
    mode: ChannelMode,
    cursor: Cursor,
}

impl LiveChannel {
    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// A conversation was (re)selected: full reset, then load history.
    pub fn select(&mut self) {
        *self = Self {
            phase: ChannelPhase::LoadingHistory,
            ..Self::default()
        };
    }

    /// No conversation selected.
    pub fn deselect(&mut self) {
        *self = Self::default();
    }

    /// History finished (with messages or empty). Opens the stream when a
    /// credential is available, otherwise falls straight back to polling.
    pub fn history_resolved(
        &mut self,
        newest: Option<MessageId>,
        has_credential: bool,
    ) -> ChannelAction {
        if self.phase != ChannelPhase::LoadingHistory {
            return ChannelAction::None;
        }
        if let Some(id) = newest {
            self.cursor.advance(id);
        }
        if has_credential {
            self.phase = ChannelPhase::Connecting;
            ChannelAction::Connect {
                last_id: self.cursor.last_seen(),
            }
        } else {
            self.degrade()
        }
    }

    /// The stream responded successfully.
    pub fn connected(&mut self) -> ChannelAction {
        match self.phase {
            ChannelPhase::Connecting => {
                self.phase = ChannelPhase::Live;
                ChannelAction::None
            }
            ChannelPhase::Degraded => {
                self.phase = ChannelPhase::Live;
                self.mode = ChannelMode::UsingLiveChannel;
                ChannelAction::StopPolling
            }
            _ => ChannelAction::None,
        }
    }

    /// Any transport error while connecting or live.
    pub fn transport_failed(&mut self) -> ChannelAction {
        match self.phase {
            ChannelPhase::Connecting | ChannelPhase::Live => self.degrade(),
            _ => ChannelAction::None,
        }
    }

    fn degrade(&mut self) -> ChannelAction {
        self.phase = ChannelPhase::Degraded;
        self.mode = ChannelMode::UsingPollingFallback;
        ChannelAction::StartPolling
    }

    /// A message was observed from any source.
    pub fn observed(&mut self, id: MessageId) {
        self.cursor.advance(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut ch = LiveChannel::default();
        assert_eq!(ch.phase(), ChannelPhase::Idle);

        ch.select();
        assert_eq!(ch.phase(), ChannelPhase::LoadingHistory);

        assert_eq!(
            ch.history_resolved(Some(2), true),
            ChannelAction::Connect { last_id: 2 }
        );
        assert_eq!(ch.phase(), ChannelPhase::Connecting);

        assert_eq!(ch.connected(), ChannelAction::None);
        assert_eq!(ch.phase(), ChannelPhase::Live);
        assert_eq!(ch.mode(), ChannelMode::UsingLiveChannel);
    }

    #[test]
    fn test_empty_history_connects_from_zero() {
        let mut ch = LiveChannel::default();
        ch.select();
        assert_eq!(
            ch.history_resolved(None, true),
            ChannelAction::Connect { last_id: 0 }
        );
    }

    #[test]
    fn test_missing_credential_goes_straight_to_polling() {
        let mut ch = LiveChannel::default();
        ch.select();
        assert_eq!(ch.history_resolved(Some(4), false), ChannelAction::StartPolling);
        assert_eq!(ch.phase(), ChannelPhase::Degraded);
        assert_eq!(ch.mode(), ChannelMode::UsingPollingFallback);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let mut ch = LiveChannel::default();
        ch.select();
        ch.history_resolved(Some(1), true);
        ch.connected();

        assert_eq!(ch.transport_failed(), ChannelAction::StartPolling);
        assert_eq!(ch.phase(), ChannelPhase::Degraded);
        // A second error does not restart polling.
        assert_eq!(ch.transport_failed(), ChannelAction::None);
        // Late history results are ignored outside LoadingHistory.
        assert_eq!(ch.history_resolved(Some(9), true), ChannelAction::None);
        assert_eq!(ch.phase(), ChannelPhase::Degraded);
    }

    #[test]
    fn test_failure_while_connecting() {
        let mut ch = LiveChannel::default();
        ch.select();
        ch.history_resolved(None, true);
        assert_eq!(ch.transport_failed(), ChannelAction::StartPolling);
    }

    #[test]
    fn test_return_to_live_stops_polling() {
        let mut ch = LiveChannel::default();
        ch.select();
        ch.history_resolved(None, false);
        assert_eq!(ch.connected(), ChannelAction::StopPolling);
        assert_eq!(ch.phase(), ChannelPhase::Live);
        assert_eq!(ch.mode(), ChannelMode::UsingLiveChannel);
    }

    #[test]
    fn test_reselect_resets_everything() {
        let mut ch = LiveChannel::default();
        ch.select();
        ch.history_resolved(Some(10), false);
        ch.observed(12);

        ch.select();
        assert_eq!(ch.phase(), ChannelPhase::LoadingHistory);
        assert_eq!(ch.mode(), ChannelMode::UsingLiveChannel);
        assert_eq!(ch.cursor().last_seen(), 0);
    }

    #[test]
    fn test_cursor_never_decreases() {
        let mut ch = LiveChannel::default();
        ch.select();
        for id in [3, 9, 4, 9, 1, 10, 2] {
            let before = ch.cursor().last_seen();
            ch.observed(id);
            assert!(ch.cursor().last_seen() >= before);
        }
        assert_eq!(ch.cursor().last_seen(), 10);
    }
}
