//! Typed API errors
//!
//! The sync engine needs to tell "not found" (treated as empty), "401"
//! (session-level) and transport failures apart, so API calls return
//! `ApiError` rather than `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No bearer token is stored; requests are not attempted.
    #[error("No session token. Run 'skillswap-chat login' first.")]
    MissingCredential,

    #[error("401 Unauthorized for {url}. Session may be invalid -- run 'skillswap-chat login'.")]
    Unauthorized { url: String },

    #[error("404 Not Found for {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Network unreachable, timeout, or a stream that broke mid-read.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to parse {what}: {message}")]
    Decode { what: String, message: String },
}

impl ApiError {
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ApiError::Transport {
            url: url.into(),
            message: format!("{:#}", err),
        }
    }

    pub fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ApiError::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}
