//! Terminal chat view
//!
//! Conversation list, message pane and compose line using Ratatui.

mod app;
mod compose;
mod logs;
mod ui;

pub use app::run;
pub use logs::LogBuffer;
