//! Explicitly constructed caches for data shared across the session.
//!
//! A cache entry holds `{value, expires_at}`; the async lock around the slot
//! doubles as the in-flight guard, so concurrent `get` calls issue one fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ApiError, ChatApi};
use crate::models::{UserId, UserSummary};

struct CacheEntry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// A single lazily fetched value.
pub struct Cached<T> {
    ttl: Option<Duration>,
    slot: tokio::sync::Mutex<Option<CacheEntry<T>>>,
}

impl<T: Clone> Cached<T> {
    /// `ttl = None` keeps the value for the cache's lifetime.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            slot: tokio::sync::Mutex::new(None),
        }
    }

    /// Return the cached value, or run `fetch` once and cache its success.
    /// Failures are not cached.
    pub async fn get<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(entry) = slot.as_ref().filter(|e| e.is_fresh()) {
            return Ok(entry.value.clone());
        }

        let value = fetch().await?;
        *slot = Some(CacheEntry {
            value: value.clone(),
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        });
        Ok(value)
    }

    /// The cached value if present, fresh, and not currently being fetched.
    pub fn peek(&self) -> Option<T> {
        let slot = self.slot.try_lock().ok()?;
        slot.as_ref()
            .filter(|e| e.is_fresh())
            .map(|e| e.value.clone())
    }

    /// Replace the cached value, fresh or not.
    pub async fn set(&self, value: T) {
        *self.slot.lock().await = Some(CacheEntry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        });
    }
}

/// The authenticated user, fetched once per session and then read-only.
pub struct CurrentUser {
    api: Arc<dyn ChatApi>,
    cache: Cached<UserSummary>,
}

impl CurrentUser {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            cache: Cached::new(None),
        }
    }

    pub async fn get(&self) -> Result<UserSummary, ApiError> {
        self.cache.get(|| self.api.current_user()).await
    }

    /// Id of the current user if it has been resolved already.
    pub fn id(&self) -> Option<UserId> {
        self.cache.peek().map(|u| u.id)
    }
}

/// Participant profiles keyed by user id, each with its own in-flight guard.
pub struct ProfileCache {
    api: Arc<dyn ChatApi>,
    ttl: Duration,
    entries: Mutex<HashMap<UserId, Arc<Cached<UserSummary>>>>,
}

impl ProfileCache {
    pub fn new(api: Arc<dyn ChatApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, id: UserId) -> Arc<Cached<UserSummary>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            entries
                .entry(id)
                .or_insert_with(|| Arc::new(Cached::new(Some(self.ttl)))),
        )
    }

    /// Seed a profile the API already embedded in another response. The
    /// embedded copy is at least as new as anything cached.
    pub async fn insert(&self, profile: UserSummary) {
        self.entry(profile.id).set(profile).await;
    }

    pub async fn get(&self, id: UserId) -> Result<UserSummary, ApiError> {
        let entry = self.entry(id);
        entry.get(|| self.api.user_profile(id)).await
    }

    /// Fetch several profiles concurrently, one request per distinct id.
    /// Ids whose fetch failed are absent from the result.
    pub async fn get_many(&self, ids: &[UserId]) -> HashMap<UserId, UserSummary> {
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let results = futures::future::join_all(unique.iter().map(|&id| async move {
            (id, self.get(id).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(profile) => Some((id, profile)),
                Err(e) => {
                    tracing::warn!("Failed to fetch profile for user {}: {}", id, e);
                    None
                }
            })
            .collect()
    }
}
