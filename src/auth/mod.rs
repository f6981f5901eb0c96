//! Session handling for the SkillSwap API
//!
//! The platform issues a bearer token at sign-in (outside this client). The
//! token is stored in the config file and attached to every request; a 401
//! anywhere invalidates it.

pub mod tokens;

use anyhow::{Context, Result};

pub use tokens::{StoredToken, TokenStore};

use crate::api::client::ApiClient;
use crate::api::ApiError;
use crate::config::Config;

/// Store a bearer token (and optionally the API base URL), then verify it.
pub async fn login(token: &str, api_url: Option<String>, expires_in: Option<u64>) -> Result<()> {
    let token = token.trim();
    anyhow::ensure!(!token.is_empty(), "Token must not be empty");

    let mut config = Config::load()?;
    if let Some(url) = api_url {
        config.api_url = url;
    }
    config.set_access_token(token.to_string(), expires_in);

    let client = ApiClient::from_config(&config)?;
    let user = crate::api::fetch_current_user(&client)
        .await
        .context("Token verification failed")?;

    config.save()?;
    println!("Logged in as {} (id {}).", user.name, user.id);
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    config.clear_tokens();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Display current session status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("API URL:     {}", config.api_url);
    match config.get_access_token() {
        Some(token) if !token.is_expired() => {
            println!("Session:     valid");
            if let Some(exp) = token.expires_at {
                println!("  expires_at: {}", exp);
            }
        }
        Some(_) => println!("Session:     expired"),
        None => {
            println!("Session:     none");
            println!("\nRun 'skillswap-chat login --token <TOKEN>' to authenticate.");
        }
    }

    Ok(())
}

/// Whether an error chain contains a 401 from the API.
pub fn is_session_invalid(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthorized)
    })
}

/// Drop the stored session after the API rejected it.
pub fn invalidate_session() -> Result<()> {
    let mut config = Config::load()?;
    if config.get_access_token().is_some() {
        tracing::warn!("Session rejected by server, clearing stored token");
        config.clear_tokens();
        config.save()?;
    }
    Ok(())
}
