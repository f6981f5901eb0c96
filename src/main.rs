//! SkillSwap Chat - terminal client for the SkillSwap chat
//!
//! Conversation list, message history, live updates with polling fallback,
//! and sending, from the command line or a terminal UI.

mod api;
mod auth;
mod config;
mod models;
mod sync;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::models::{ConversationId, MessageId, UserId};
use crate::sync::commands;

#[derive(Parser)]
#[command(name = "skillswap-chat")]
#[command(about = "Terminal client for SkillSwap chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a bearer token issued by the SkillSwap web app
    Login {
        /// Bearer token
        #[arg(short, long)]
        token: String,

        /// API base URL (e.g. https://skillswap.example/api)
        #[arg(long)]
        api_url: Option<String>,

        /// Token lifetime in seconds, if known
        #[arg(long)]
        expires_in: Option<u64>,
    },

    /// Clear the stored session
    Logout,

    /// Show current session status
    Status,

    /// Show current user info (verify the token works)
    Whoami,

    /// List conversations
    Conversations {
        /// Maximum number of conversations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Open (or create) a conversation with a user
    Open {
        /// User ID of the other participant
        user_id: UserId,
    },

    /// Read the latest messages of a conversation
    Read {
        /// Conversation ID (from `conversations` output)
        conversation_id: ConversationId,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Send a message
    Send {
        /// Conversation ID (from `conversations` output)
        #[arg(short, long)]
        to: ConversationId,

        /// Message content
        message: String,
    },

    /// Delete one of your messages
    Delete {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// Follow a conversation and print messages as they arrive
    Watch {
        conversation_id: ConversationId,
    },

    /// Launch the terminal user interface
    Tui {
        /// Conversation to open on start
        conversation_id: Option<ConversationId>,
    },
}

fn init_logging(verbose: bool, capture: Option<tui::LogBuffer>) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    match capture {
        Some(buffer) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(buffer),
            )
            .init(),
        None => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn dispatch(command: Commands, logs: Option<tui::LogBuffer>) -> Result<()> {
    match command {
        Commands::Login {
            token,
            api_url,
            expires_in,
        } => auth::login(&token, api_url, expires_in).await,
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await
        }
        Commands::Status => auth::status().await,
        Commands::Whoami => api::whoami().await,
        Commands::Conversations { limit } => {
            tracing::debug!("Fetching conversations...");
            commands::list_conversations(limit).await
        }
        Commands::Open { user_id } => commands::open_conversation(user_id).await,
        Commands::Read {
            conversation_id,
            limit,
        } => commands::read_messages(conversation_id, limit).await,
        Commands::Send { to, message } => {
            tracing::debug!("Sending message...");
            commands::send_message(to, &message).await
        }
        Commands::Delete {
            conversation_id,
            message_id,
        } => commands::delete_message(conversation_id, message_id).await,
        Commands::Watch { conversation_id } => commands::watch(conversation_id).await,
        Commands::Tui { conversation_id } => {
            tui::run(conversation_id, logs.unwrap_or_default()).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logs = matches!(cli.command, Commands::Tui { .. }).then(tui::LogBuffer::new);
    // A rejected token during login was never stored.
    let is_login = matches!(cli.command, Commands::Login { .. });
    init_logging(cli.verbose, logs.clone());

    let result = dispatch(cli.command, logs).await;

    if let Err(e) = &result {
        if !is_login && auth::is_session_invalid(e) {
            auth::invalidate_session()?;
            anyhow::bail!("Session expired. Run 'skillswap-chat login'.");
        }
    }
    result
}
