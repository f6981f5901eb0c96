//! Single-line compose input.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// Height of the compose box: border + input + border.
pub const COMPOSE_HEIGHT: u16 = 3;

#[derive(Debug, Default)]
pub struct ComposeState {
    input: String,
    /// Cursor position in characters.
    cursor: usize,
}

impl ComposeState {
    pub fn text(&self) -> &str {
        &self.input
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let end = self.byte_offset(self.cursor);
        let start = self.byte_offset(self.cursor - 1);
        self.input.replace_range(start..end, "");
        self.cursor -= 1;
    }

    pub fn delete(&mut self) {
        if self.cursor >= self.input.chars().count() {
            return;
        }
        let start = self.byte_offset(self.cursor);
        let end = self.byte_offset(self.cursor + 1);
        self.input.replace_range(start..end, "");
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor = 0;
    }

    /// Take the draft for sending, leaving the box empty. Whitespace-only
    /// drafts stay put and return `None`.
    pub fn take(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }
        self.cursor = 0;
        Some(std::mem::take(&mut self.input))
    }

    /// Put a draft back after a failed send, unless the user already typed
    /// something new.
    pub fn restore(&mut self, draft: String) {
        if self.input.is_empty() {
            self.input = draft;
            self.move_end();
        }
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map_or(self.input.len(), |(i, _)| i)
    }
}

/// Visible slice of the input and the cursor column within it, scrolled
/// horizontally so the cursor stays in view.
fn visible_window(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let chars: Vec<char> = input.chars().collect();
    let col = |range: &[char]| range.iter().map(|c| c.width().unwrap_or(0)).sum::<usize>();

    let mut start = 0;
    while start < cursor && col(&chars[start..cursor]) >= width {
        start += 1;
    }

    let mut shown = String::new();
    let mut used = 0;
    for c in &chars[start..] {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        shown.push(*c);
        used += w;
    }
    (shown, col(&chars[start..cursor.min(chars.len())]))
}

pub fn render(frame: &mut Frame, area: Rect, state: &ComposeState, target: Option<&str>, focused: bool) {
    let (border_type, border_color) = if focused {
        (BorderType::Double, Color::Yellow)
    } else {
        (BorderType::Plain, Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width < 2 || inner.height == 0 {
        return;
    }
    let width = inner.width as usize - 1;

    let line = if state.input.is_empty() {
        let placeholder = match target {
            Some(name) => format!(" Message {}", name),
            None => " Select a conversation".to_string(),
        };
        Line::from(Span::styled(placeholder, Style::default().fg(Color::DarkGray)))
    } else {
        let (shown, _) = visible_window(&state.input, state.cursor, width);
        Line::from(format!(" {}", shown))
    };
    frame.render_widget(Paragraph::new(line), inner);

    if focused {
        let (_, cursor_col) = visible_window(&state.input, state.cursor, width);
        frame.set_cursor_position((inner.x + 1 + cursor_col as u16, inner.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> ComposeState {
        let mut state = ComposeState::default();
        for c in text.chars() {
            state.insert_char(c);
        }
        state
    }

    #[test]
    fn test_editing_multibyte() {
        let mut state = typed("año");
        state.move_left();
        state.backspace();
        assert_eq!(state.text(), "ao");
        state.move_home();
        state.delete();
        assert_eq!(state.text(), "o");
    }

    #[test]
    fn test_take_and_restore() {
        let mut state = typed("hola");
        assert_eq!(state.take().as_deref(), Some("hola"));
        assert!(state.is_empty());

        state.restore("hola".to_string());
        assert_eq!(state.text(), "hola");

        state.clear();
        state.insert_char('x');
        state.restore("hola".to_string());
        assert_eq!(state.text(), "x");
    }

    #[test]
    fn test_blank_draft_not_taken() {
        let mut state = typed("   ");
        assert!(state.take().is_none());
        assert_eq!(state.text(), "   ");
    }

    #[test]
    fn test_window_follows_cursor() {
        let (shown, col) = visible_window("abcdefghij", 10, 4);
        assert_eq!(shown, "hij");
        assert_eq!(col, 3);

        let (shown, col) = visible_window("abcdefghij", 0, 4);
        assert_eq!(shown, "abcd");
        assert_eq!(col, 0);
    }
}
