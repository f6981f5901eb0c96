//! Tracing capture while the TUI owns the screen, and the pane that shows it.
//!
//! `LogBuffer` is a bounded queue that tracing-subscriber's fmt layer writes
//! into through `MakeWriter`; `LogPane` drains it on every tick.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing_subscriber::fmt::MakeWriter;

/// Lines held between drains; older lines are dropped first.
const CAPTURE_CAPACITY: usize = 500;
/// Lines kept for display.
const PANE_HISTORY: usize = 1000;
/// Height of the pane when shown.
pub const LOG_PANE_HEIGHT: u16 = 8;

#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        while lines.len() >= CAPTURE_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.drain(..).collect()
    }
}

/// Per-event writer; splits on newlines and pushes whole lines.
pub struct LineWriter {
    target: LogBuffer,
    partial: Vec<u8>,
}

impl LineWriter {
    fn emit_complete_lines(&mut self) {
        while let Some(nl) = self.partial.iter().position(|&b| b == b'\n') {
            let rest = self.partial.split_off(nl + 1);
            let mut line = std::mem::replace(&mut self.partial, rest);
            line.pop();
            self.target.push(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.partial.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.target.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            target: self.clone(),
            partial: Vec::new(),
        }
    }
}

pub struct LogPane {
    source: LogBuffer,
    lines: VecDeque<String>,
    pub visible: bool,
}

impl LogPane {
    pub fn new(source: LogBuffer) -> Self {
        Self {
            source,
            lines: VecDeque::new(),
            visible: false,
        }
    }

    pub fn refresh(&mut self) {
        self.lines.extend(self.source.drain());
        while self.lines.len() > PANE_HISTORY {
            self.lines.pop_front();
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }
}

fn level_color(line: &str) -> Option<Color> {
    [
        ("ERROR", Color::Red),
        ("WARN", Color::Yellow),
        ("INFO", Color::Green),
        ("DEBUG", Color::DarkGray),
        ("TRACE", Color::DarkGray),
    ]
    .into_iter()
    .find(|(level, _)| line.split_whitespace().take(2).any(|w| w == *level))
    .map(|(_, color)| color)
}

pub fn render(area: Rect, buf: &mut Buffer, pane: &LogPane) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(" Log (F2) ", Style::default().fg(Color::Cyan)));
    let inner = block.inner(area);
    block.render(area, buf);

    let rows = inner.height as usize;
    let skip = pane.lines.len().saturating_sub(rows);
    let lines: Vec<Line> = pane
        .lines
        .iter()
        .skip(skip)
        .map(|l| {
            let color = level_color(l).unwrap_or(Color::White);
            Line::from(Span::styled(l.clone(), Style::default().fg(color)))
        })
        .collect();
    Paragraph::new(lines).render(inner, buf);
}
