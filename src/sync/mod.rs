//! Real-time message pipeline for the selected conversation
//!
//! History load, live push channel with polling fallback, sends, and the
//! conversation list, all feeding explicit stores that the views subscribe to.

pub mod cache;
pub mod channel;
pub mod commands;
pub mod conversations;
pub mod history;
mod live;
mod polling;
pub mod scroll;
mod send;
pub mod session;
pub mod sse;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelMode, ChannelPhase};
pub use conversations::{ConversationList, ConversationSync};
pub use history::HistoryState;
pub use scroll::{ScrollAction, ScrollCoordinator, Viewport};
pub use send::{validate_body, SendError};
pub use session::{ChatSession, Scope};
pub use store::{StoreRevision, Subscription};
