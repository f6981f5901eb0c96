//! Current user endpoint (/auth/user/)

use anyhow::Result;

use super::client::ApiClient;
use super::ApiError;
use crate::config::Config;
use crate::models::{RawUser, UserSummary};

/// Fetch the authenticated user.
pub async fn fetch_current_user(client: &ApiClient) -> Result<UserSummary, ApiError> {
    let raw: RawUser = client.get_json("/auth/user/", &[]).await?;
    Ok(raw.into())
}

/// Fetch and display current user info.
pub async fn whoami() -> Result<()> {
    let config = Config::load_effective()?;
    let client = ApiClient::from_config(&config)?;
    let me = fetch_current_user(&client).await?;

    println!();
    println!("Name:   {}", me.name);
    println!("Email:  {}", me.email.as_deref().unwrap_or("(none)"));
    println!("Avatar: {}", me.avatar.as_deref().unwrap_or("(none)"));
    println!("ID:     {}", me.id);

    Ok(())
}
