//! TUI application state and main event loop
//!
//! The loop is a single `tokio::select!` over terminal events, store
//! revisions, conversation list updates, background task notices and a log
//! refresh tick. Network work runs in spawned tasks that report back through
//! the notice channel.

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    DisableFocusChange, EnableFocusChange, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::{mpsc, watch};

use super::compose::ComposeState;
use super::logs::{LogBuffer, LogPane};
use super::ui;
use crate::api::ApiError;
use crate::models::{ConversationId, Message, UserId};
use crate::sync::commands::Engine;
use crate::sync::{
    ChannelPhase, ChatSession, ConversationList, ConversationSync, HistoryState, ScrollAction,
    ScrollCoordinator, SendError, StoreRevision, Viewport,
};

/// At-bottom threshold in rows (about 50px of text).
const AT_BOTTOM_ROWS: u32 = 3;
/// How often captured log lines are pulled into the log pane.
const LOG_REFRESH: Duration = Duration::from_millis(250);

/// Active pane in the TUI
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Conversations,
    Messages,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Conversations => "conversations",
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Conversations => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Conversations,
        }
    }
}

/// Results reported by spawned tasks.
pub enum Notice {
    Sent,
    SendFailed { draft: String, error: String },
    SessionExpired(ApiError),
}

/// Scroll position of the message pane, in rows from the top.
#[derive(Debug, Default)]
pub struct MessageScroll {
    pub offset: u32,
    pub content_height: u32,
    pub viewport_height: u32,
    /// Set by the coordinator; applied at the next draw once heights are known.
    pub pin_to_bottom: bool,
}

impl MessageScroll {
    fn max_offset(&self) -> u32 {
        self.content_height.saturating_sub(self.viewport_height)
    }

    /// Called during draw with the freshly measured heights.
    pub fn layout(&mut self, content_height: u32, viewport_height: u32) {
        self.content_height = content_height;
        self.viewport_height = viewport_height;
        if self.pin_to_bottom {
            self.offset = self.max_offset();
            self.pin_to_bottom = false;
        }
        self.offset = self.offset.min(self.max_offset());
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            offset: self.offset,
            content_height: self.content_height,
            viewport_height: self.viewport_height,
        }
    }
}

/// Application state
pub struct App {
    pub should_exit: bool,
    session: ChatSession,
    pub conversations: ConversationList,
    /// Highlighted row in the conversation list.
    pub selected: usize,
    pub active: Option<ConversationId>,
    pub me: Option<UserId>,
    pub messages: Vec<Message>,
    pub history: HistoryState,
    pub phase: ChannelPhase,
    pub scroll: MessageScroll,
    coordinator: ScrollCoordinator,
    pub compose: ComposeState,
    pub active_pane: Pane,
    pub status_message: Option<String>,
    pub status_is_error: bool,
    pub logs: LogPane,
    notices: mpsc::UnboundedSender<Notice>,
    expired: Option<ApiError>,
}

impl App {
    fn new(session: ChatSession, logs: LogBuffer, notices: mpsc::UnboundedSender<Notice>) -> Self {
        Self {
            should_exit: false,
            session,
            conversations: Arc::new(Vec::new()),
            selected: 0,
            active: None,
            me: None,
            messages: Vec::new(),
            history: HistoryState::Idle,
            phase: ChannelPhase::Idle,
            scroll: MessageScroll::default(),
            coordinator: ScrollCoordinator::new(AT_BOTTOM_ROWS),
            compose: ComposeState::default(),
            active_pane: Pane::default(),
            status_message: None,
            status_is_error: false,
            logs: LogPane::new(logs),
            notices,
            expired: None,
        }
    }

    /// Title of the open conversation, if it is in the list.
    pub fn active_title(&self) -> Option<String> {
        let id = self.active?;
        Some(
            self.conversations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.title())
                .unwrap_or_else(|| format!("Conversation {}", id)),
        )
    }

    fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status_message = Some(message.into());
        self.status_is_error = is_error;
    }

    fn set_conversations(&mut self, list: ConversationList) {
        // Keep the highlight on the same conversation when the order changes.
        let highlighted = self.conversations.get(self.selected).map(|c| c.id);
        self.conversations = list;
        self.selected = highlighted
            .and_then(|id| self.conversations.iter().position(|c| c.id == id))
            .unwrap_or(0)
            .min(self.conversations.len().saturating_sub(1));
    }

    /// Pull the store snapshot after a revision and apply the scroll policy.
    /// Revisions of a conversation other than the one opened are ignored.
    fn sync_store(&mut self, revision: StoreRevision) {
        if let Some(e) = self.session.session_expired() {
            self.on_notice(Notice::SessionExpired(e));
            return;
        }
        if revision.conversation_id != self.active {
            return;
        }
        self.messages = self.session.messages();
        self.history = self.session.history_state();
        self.phase = self.session.channel_phase();
        self.me = self.me.or_else(|| self.session.current_user_id());

        let loaded = self.history == HistoryState::Loaded;
        if self.coordinator.observe(self.messages.len(), loaded) == ScrollAction::ScrollToBottom {
            self.scroll.pin_to_bottom = true;
        }
        if loaded {
            self.session.mark_read();
        }
    }

    fn open(&mut self, conversation_id: ConversationId) {
        if self.active == Some(conversation_id) {
            self.active_pane = Pane::Compose;
            return;
        }
        self.active = Some(conversation_id);
        self.coordinator.reset();
        self.scroll = MessageScroll::default();
        self.messages.clear();
        self.status_message = None;
        self.active_pane = Pane::Compose;

        let session = self.session.clone();
        let notices = self.notices.clone();
        tokio::spawn(async move {
            if let Err(e) = session.select_conversation(conversation_id).await {
                if e.is_unauthorized() {
                    let _ = notices.send(Notice::SessionExpired(e));
                }
            }
        });
    }

    fn retry(&mut self) {
        if !matches!(self.history, HistoryState::Failed(_)) {
            return;
        }
        let session = self.session.clone();
        let notices = self.notices.clone();
        tokio::spawn(async move {
            if let Err(e) = session.retry_history().await {
                if e.is_unauthorized() {
                    let _ = notices.send(Notice::SessionExpired(e));
                }
            }
        });
    }

    fn send_draft(&mut self) {
        let Some(conversation_id) = self.active else {
            self.set_status("Open a conversation first", true);
            return;
        };
        let Some(draft) = self.compose.take() else {
            return;
        };

        let session = self.session.clone();
        let notices = self.notices.clone();
        tokio::spawn(async move {
            let notice = match session.send(conversation_id, &draft).await {
                Ok(_) => Notice::Sent,
                Err(SendError::Api(e)) if e.is_unauthorized() => Notice::SessionExpired(e),
                Err(e) => Notice::SendFailed {
                    error: match &e {
                        SendError::Api(api) => format!("{}: {}", e, api),
                        SendError::EmptyBody => e.to_string(),
                    },
                    draft,
                },
            };
            let _ = notices.send(notice);
        });
    }

    fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Sent => self.status_message = None,
            Notice::SendFailed { draft, error } => {
                self.compose.restore(draft);
                self.set_status(error, true);
            }
            Notice::SessionExpired(e) => {
                self.expired = Some(e);
                self.should_exit = true;
            }
        }
    }

    fn scroll_by(&mut self, delta: i64) {
        let max = self.scroll.max_offset() as i64;
        self.scroll.offset = (self.scroll.offset as i64 + delta).clamp(0, max) as u32;
        self.coordinator.on_user_scroll(self.scroll.viewport());
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return;
        }

        match key.code {
            KeyCode::Esc => self.should_exit = true,
            KeyCode::Tab => self.active_pane = self.active_pane.next(),
            KeyCode::F(2) => self.logs.toggle(),
            _ => match self.active_pane {
                Pane::Conversations => self.handle_list_key(key),
                Pane::Messages => self.handle_messages_key(key),
                Pane::Compose => self.handle_compose_key(key),
            },
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Char('r') => self.retry(),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.conversations.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(id) = self.conversations.get(self.selected).map(|c| c.id) {
                    self.open(id);
                }
            }
            _ => {}
        }
    }

    fn handle_messages_key(&mut self, key: KeyEvent) {
        let page = self.scroll.viewport_height.max(1) as i64;
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Char('r') => self.retry(),
            KeyCode::Up => self.scroll_by(-1),
            KeyCode::Down => self.scroll_by(1),
            KeyCode::PageUp => self.scroll_by(-page),
            KeyCode::PageDown => self.scroll_by(page),
            KeyCode::End => self.scroll_by(i64::from(u32::MAX)),
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.send_draft(),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.compose.clear()
            }
            KeyCode::Char(c) => self.compose.insert_char(c),
            KeyCode::Backspace => self.compose.backspace(),
            KeyCode::Delete => self.compose.delete(),
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Home => self.compose.move_home(),
            KeyCode::End => self.compose.move_end(),
            _ => {}
        }
    }

    fn handle_event(&mut self, event: Event, visible: &watch::Sender<bool>) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::FocusGained => {
                visible.send_replace(true);
            }
            Event::FocusLost => {
                visible.send_replace(false);
            }
            // Heights are re-measured on the next draw.
            Event::Resize(_, _) => {}
            _ => {}
        }
    }
}

/// Run the TUI until the user quits. A rejected session ends the TUI with
/// the `ApiError` so the caller can clear it.
pub async fn run(initial: Option<ConversationId>, logs: LogBuffer) -> Result<()> {
    let engine = Engine::from_config()?;

    let mut terminal = ratatui::init();
    // Not every terminal reports focus; without it the list stays "visible".
    let _ = execute!(stdout(), EnableFocusChange);
    let result = run_app(&mut terminal, engine, initial, logs).await;
    let _ = execute!(stdout(), DisableFocusChange);
    ratatui::restore();

    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    engine: Engine,
    initial: Option<ConversationId>,
    logs: LogBuffer,
) -> Result<()> {
    let session = engine.session();
    let conversations = Arc::new(engine.conversations());
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let (visible_tx, visible_rx) = watch::channel(true);
    let refresher = {
        let conversations = Arc::clone(&conversations);
        let notices = notice_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = conversations.run(visible_rx).await {
                let _ = notices.send(Notice::SessionExpired(e));
            }
        })
    };

    let mut list_rx = conversations.subscribe();
    let mut store = session.subscribe();
    let mut events = EventStream::new();
    let mut log_tick = tokio::time::interval(LOG_REFRESH);

    let mut app = App::new(session.clone(), logs, notice_tx);
    if let Some(id) = initial {
        app.open(id);
    }

    let outcome = loop {
        if app.should_exit {
            break Ok(());
        }
        terminal.draw(|frame| ui::render(frame, &mut app))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => app.handle_event(event, &visible_tx),
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            },
            Ok(()) = list_rx.changed() => {
                let list = Arc::clone(&list_rx.borrow_and_update());
                app.set_conversations(list);
            }
            Some(revision) = store.changed() => app.sync_store(revision),
            Some(notice) = notice_rx.recv() => app.on_notice(notice),
            _ = log_tick.tick() => app.logs.refresh(),
        }
    };

    refresher.abort();
    session.close();

    match app.expired.take() {
        Some(e) => Err(e.into()),
        None => outcome,
    }
}
