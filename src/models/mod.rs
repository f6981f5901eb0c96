//! Data models for SkillSwap chat entities
//!
//! Wire types (`Raw*`) mirror the API's JSON and are converted exactly once,
//! at ingestion, into the canonical types the rest of the client works with.

mod conversation;
mod de;
mod message;
mod user;

pub use conversation::*;
pub use message::*;
pub use user::*;

/// Server-assigned conversation identifier.
pub type ConversationId = u64;
/// Server-assigned message identifier. Monotonically increasing per conversation.
pub type MessageId = u64;
/// Server-assigned user identifier.
pub type UserId = u64;
