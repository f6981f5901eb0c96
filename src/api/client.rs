//! Authenticated HTTP client for the SkillSwap API
//!
//! Wraps reqwest::Client with bearer token injection, the blanket request
//! timeout, and status-code classification into `ApiError`.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::ApiError;
use crate::auth::TokenStore;
use crate::config::Config;

/// Authenticated client for the REST and event-stream endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    /// Same pool settings but without a total timeout, for long-lived streams.
    stream_http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client from config. Does not require a token; calls made
    /// without one fail with `ApiError::MissingCredential`.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.bearer(), config.request_timeout())
    }

    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| ApiError::decode("API base URL", e))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(&base_url, e))?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(&base_url, e))?;

        Ok(Self {
            http,
            stream_http,
            base_url,
            token,
        })
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self) -> Result<&str, ApiError> {
        self.token.as_deref().ok_or(ApiError::MissingCredential)
    }

    /// Absolute URL for an API path, with optional query pairs.
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<url::Url, ApiError> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = url::Url::parse(&raw).map_err(|e| ApiError::decode("request URL", e))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path, query)?;
        let token = self.token()?;
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;

        let resp = check_response(resp, url.as_str()).await?;
        decode_json(resp, url.as_str()).await
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let url = self.url(path, &[])?;
        let token = self.token()?;
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;

        let resp = check_response(resp, url.as_str()).await?;
        decode_json(resp, url.as_str()).await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path, &[])?;
        let token = self.token()?;
        tracing::debug!("DELETE {}", url);

        let resp = self
            .http
            .delete(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;

        check_response(resp, url.as_str()).await?;
        Ok(())
    }

    /// Open a `text/event-stream` response. The caller reads the body incrementally.
    pub async fn get_stream(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path, query)?;
        let token = self.token()?;
        tracing::debug!("STREAM {}", url);

        let resp = self
            .stream_http
            .get(url.clone())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ApiError::transport(url.as_str(), e))?;

        check_response(resp, url.as_str()).await
    }
}

/// Check HTTP response status code and classify failures.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized {
            url: url.to_string(),
        });
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

async fn decode_json<T: DeserializeOwned>(resp: reqwest::Response, url: &str) -> Result<T, ApiError> {
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::transport(url, e))?;
    serde_json::from_str(&text).map_err(|e| ApiError::decode(format!("response from {}", url), e))
}
