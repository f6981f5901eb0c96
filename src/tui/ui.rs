//! UI rendering for the TUI

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};

use super::app::{App, Pane};
use super::compose;
use super::logs;
use crate::models::{Message, UserId};
use crate::sync::{ChannelPhase, HistoryState};

const SIDEBAR_WIDTH: u16 = 28;

fn pane_border(focused: bool) -> (BorderType, Style) {
    if focused {
        (BorderType::Double, Style::default().fg(Color::Yellow))
    } else {
        (BorderType::Plain, Style::default().fg(Color::DarkGray))
    }
}

/// Main render function. Takes `&mut App` so the message pane can record
/// its measured height for scrolling.
pub fn render(frame: &mut Frame, app: &mut App) {
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let (main_area, log_area) = if app.logs.visible {
        let [main, log] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(logs::LOG_PANE_HEIGHT),
        ])
        .areas(main_area);
        (main, Some(log))
    } else {
        (main_area, None)
    };

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .areas(main_area);
    render_conversations(sidebar_area, frame.buffer_mut(), app);

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);
    render_messages(messages_area, frame.buffer_mut(), app);

    let title = app.active_title();
    compose::render(
        frame,
        compose_area,
        &app.compose,
        title.as_deref(),
        app.active_pane == Pane::Compose,
    );

    if let Some(area) = log_area {
        logs::render(area, frame.buffer_mut(), &app.logs);
    }

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        " SkillSwap Chat",
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    let who = app
        .me
        .map(|id| format!("user {} ", id))
        .unwrap_or_default();
    let padding = (area.width as usize).saturating_sub(" SkillSwap Chat".len() + who.len());

    let line = Line::from(vec![
        title,
        Span::raw(" ".repeat(padding)),
        Span::styled(who, Style::default().fg(Color::Cyan)),
    ]);
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_conversations(area: Rect, buf: &mut Buffer, app: &App) {
    let (border_type, border_style) = pane_border(app.active_pane == Pane::Conversations);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(" Conversations ");
    let inner = block.inner(area);
    block.render(area, buf);

    if app.conversations.is_empty() {
        Paragraph::new(Span::styled(" (loading...)", Style::default().fg(Color::DarkGray)))
            .render(inner, buf);
        return;
    }

    // Keep the highlighted row in view.
    let rows = inner.height as usize;
    let first = app.selected.saturating_sub(rows.saturating_sub(1));

    let lines: Vec<Line> = app
        .conversations
        .iter()
        .enumerate()
        .skip(first)
        .take(rows)
        .map(|(i, c)| {
            let marker = if app.active == Some(c.id) { ">" } else { " " };
            let mut style = Style::default();
            if i == app.selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            let mut spans = vec![Span::styled(format!("{} {}", marker, c.title()), style)];
            if c.unread_count > 0 {
                spans.push(Span::styled(
                    format!(" ({})", c.unread_count),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ));
            }
            Line::from(spans)
        })
        .collect();
    Paragraph::new(lines).render(inner, buf);
}

/// Rows for one message: a header line then one line per body line.
fn message_lines(message: &Message, me: Option<UserId>, other_name: &str) -> Vec<Line<'static>> {
    let own = message.is_from(me);
    let (name, color) = if own {
        ("You".to_string(), Color::Green)
    } else {
        (other_name.to_string(), Color::Cyan)
    };
    let time = message
        .sent_at
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default();

    let mut header = vec![
        Span::styled(name, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::styled(format!("  {}", time), Style::default().fg(Color::DarkGray)),
    ];
    if !own && !message.read {
        header.push(Span::styled(" *", Style::default().fg(Color::Yellow)));
    }

    let mut lines = vec![Line::from(header)];
    lines.extend(
        message
            .body
            .lines()
            .map(|l| Line::from(format!("  {}", l))),
    );
    lines
}

fn render_messages(area: Rect, buf: &mut Buffer, app: &mut App) {
    let (border_type, border_style) = pane_border(app.active_pane == Pane::Messages);
    let title = app
        .active_title()
        .map(|t| format!(" {} ", t))
        .unwrap_or_else(|| " Messages ".to_string());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(title);
    let inner = block.inner(area);
    block.render(area, buf);

    let placeholder = match (&app.history, app.active) {
        (_, None) => Some(("Select a conversation and press Enter".to_string(), Color::DarkGray)),
        (HistoryState::Loading | HistoryState::Idle, _) => {
            Some(("Loading messages...".to_string(), Color::DarkGray))
        }
        (HistoryState::Failed(e), _) => Some((format!("{}  (press r to retry)", e), Color::Red)),
        (HistoryState::Loaded, _) if app.messages.is_empty() => {
            Some(("No messages yet. Say hello!".to_string(), Color::DarkGray))
        }
        _ => None,
    };
    if let Some((text, color)) = placeholder {
        Paragraph::new(Span::styled(format!(" {}", text), Style::default().fg(color)))
            .render(inner, buf);
        return;
    }

    let other = app
        .active_title()
        .unwrap_or_else(|| "Them".to_string());
    let mut lines: Vec<Line> = Vec::new();
    for message in &app.messages {
        lines.extend(message_lines(message, app.me, &other));
    }

    app.scroll.layout(lines.len() as u32, inner.height as u32);
    let start = app.scroll.offset as usize;
    let visible: Vec<Line> = lines
        .into_iter()
        .skip(start)
        .take(inner.height as usize)
        .collect();
    Paragraph::new(visible).render(inner, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(msg) = &app.status_message {
        let color = if app.status_is_error {
            Color::Red
        } else {
            Color::Green
        };
        Paragraph::new(Span::styled(format!(" {} ", msg), Style::default().fg(color)))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep = Span::styled(" | ", Style::default().fg(Color::Gray));
    let phase_color = match app.phase {
        ChannelPhase::Live => Color::Green,
        ChannelPhase::Degraded => Color::Yellow,
        _ => Color::Gray,
    };
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.phase.as_str()), Style::default().fg(phase_color)),
        sep.clone(),
        Span::styled(
            format!("Tab: {}", app.active_pane.as_str()),
            Style::default().fg(Color::Cyan),
        ),
        sep.clone(),
        Span::styled("Enter: open/send", Style::default().fg(Color::Gray)),
        sep.clone(),
        Span::styled("r: retry", Style::default().fg(Color::Gray)),
        sep.clone(),
        Span::styled("F2: log", Style::default().fg(Color::Gray)),
        sep,
        Span::styled("Esc: quit", Style::default().fg(Color::Gray)),
    ]);
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
