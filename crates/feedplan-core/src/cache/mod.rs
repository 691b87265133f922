//! Best-effort TTL cache in front of plan generation.
//!
//! [`Cache`] routes to a shared [`CacheBackend`] (normally [`PgCache`]) and
//! drops to an in-process [`LocalCache`] while the shared store is failing.
//! Callers never see a cache error: failures read as misses.

pub mod local;
pub mod postgres;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use local::LocalCache;
pub use postgres::PgCache;

/// How long the facade stays on the local map after a shared-store error.
pub const DEFAULT_RECONNECT_WINDOW: Duration = Duration::from_secs(30);

/// Errors raised by cache backends. Only the facade sees these.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Live value for `key`; expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Returns the number of keys removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn CacheBackend) {}
};

/// Cache key of a user's plan for one category and day.
pub fn plan_key(user_id: Option<Uuid>, category: &str, date: NaiveDate) -> String {
    match user_id {
        Some(id) => format!("plan:{id}:{category}:{date}"),
        None => format!("plan:anon:{category}:{date}"),
    }
}

/// Prefix covering every cached plan of a user.
pub fn user_plan_prefix(user_id: Uuid) -> String {
    format!("plan:{user_id}:")
}

/// Cache facade with degradation to a local map.
pub struct Cache {
    shared: Option<Box<dyn CacheBackend>>,
    local: LocalCache,
    reconnect_window: Duration,
    degraded_until: Mutex<Option<Instant>>,
}

impl Cache {
    /// Cache backed only by the in-process map.
    pub fn local() -> Self {
        Self {
            shared: None,
            local: LocalCache::new(),
            reconnect_window: DEFAULT_RECONNECT_WINDOW,
            degraded_until: Mutex::new(None),
        }
    }

    /// Cache backed by a shared store.
    pub fn with_shared(backend: impl CacheBackend + 'static) -> Self {
        Self {
            shared: Some(Box::new(backend)),
            ..Self::local()
        }
    }

    pub fn with_reconnect_window(mut self, window: Duration) -> Self {
        self.reconnect_window = window;
        self
    }

    /// The shared backend when it is configured and not in its cool-down.
    fn healthy_shared(&self) -> Option<&dyn CacheBackend> {
        let shared = self.shared.as_deref()?;
        let mut guard = self
            .degraded_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *guard {
            Some(until) if Instant::now() < until => None,
            Some(_) => {
                info!(backend = shared.name(), "retrying shared cache");
                *guard = None;
                Some(shared)
            }
            None => Some(shared),
        }
    }

    fn mark_degraded(&self, backend: &str, err: &CacheError) {
        let mut guard = self
            .degraded_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            warn!(
                backend,
                error = %err,
                window_secs = self.reconnect_window.as_secs(),
                "shared cache failed, using local cache"
            );
        }
        *guard = Some(Instant::now() + self.reconnect_window);
    }

    /// Whether calls are currently served by the local map.
    pub fn is_degraded(&self) -> bool {
        self.shared.is_none() || self.healthy_shared().is_none()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(shared) = self.healthy_shared() {
            match shared.get(key).await {
                Ok(value) => return value,
                Err(e) => self.mark_degraded(shared.name(), &e),
            }
        }
        self.local.get_value(key)
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Some(shared) = self.healthy_shared() {
            match shared.set(key, value.clone(), ttl).await {
                Ok(()) => return,
                Err(e) => self.mark_degraded(shared.name(), &e),
            }
        }
        self.local.set_value(key, value, ttl);
    }

    /// Removes the key from both stores.
    pub async fn delete(&self, key: &str) -> bool {
        let mut existed = self.local.remove(key);
        if let Some(shared) = self.healthy_shared() {
            match shared.delete(key).await {
                Ok(found) => existed |= found,
                Err(e) => self.mark_degraded(shared.name(), &e),
            }
        }
        existed
    }

    /// Removes every key with the prefix from both stores.
    pub async fn delete_prefix(&self, prefix: &str) -> u64 {
        let mut removed = self.local.remove_prefix(prefix);
        if let Some(shared) = self.healthy_shared() {
            match shared.delete_prefix(prefix).await {
                Ok(n) => removed += n,
                Err(e) => self.mark_degraded(shared.name(), &e),
            }
        }
        debug!(prefix, removed, "cache prefix invalidated");
        removed
    }

    /// Decode a JSON value. Undecodable entries are dropped and read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, ttl).await,
            Err(e) => warn!(key, error = %e, "failed to encode cache value"),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("shared", &self.shared.as_ref().map(|s| s.name()))
            .field("reconnect_window", &self.reconnect_window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Shared backend that fails while `down` is set and otherwise
    /// delegates to a local map.
    #[derive(Clone, Default)]
    struct FlakyBackend {
        down: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        inner: Arc<LocalCache>,
    }

    impl FlakyBackend {
        fn check(&self) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                Err(CacheError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CacheBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.check()?;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, CacheError> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
            self.check()?;
            self.inner.delete_prefix(prefix).await
        }
    }

    #[test]
    fn key_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let user = Uuid::nil();
        assert_eq!(
            plan_key(Some(user), "fitness", date),
            format!("plan:{user}:fitness:2025-03-01")
        );
        assert_eq!(plan_key(None, "fitness", date), "plan:anon:fitness:2025-03-01");
        assert!(plan_key(Some(user), "cooking", date).starts_with(&user_plan_prefix(user)));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = Cache::local();
        cache.set("k", "v".into(), Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn json_helpers_round_trip_and_drop_garbage() {
        let cache = Cache::local();
        cache.set_json("n", &vec![1, 2, 3], Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<i32>>("n").await, Some(vec![1, 2, 3]));

        cache.set("bad", "{not json".into(), Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<i32>>("bad").await, None);
        assert_eq!(cache.get("bad").await, None);
    }

    #[tokio::test]
    async fn prefix_delete_only_touches_prefix() {
        let cache = Cache::local();
        let ttl = Duration::from_secs(60);
        cache.set("plan:a:x", "1".into(), ttl).await;
        cache.set("plan:a:y", "2".into(), ttl).await;
        cache.set("plan:b:x", "3".into(), ttl).await;

        assert_eq!(cache.delete_prefix("plan:a:").await, 2);
        assert_eq!(cache.get("plan:a:x").await, None);
        assert_eq!(cache.get("plan:b:x").await.as_deref(), Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_failure_degrades_to_local_then_recovers() {
        let backend = FlakyBackend::default();
        let cache = Cache::with_shared(backend.clone())
            .with_reconnect_window(Duration::from_secs(30));
        let ttl = Duration::from_secs(600);

        cache.set("k", "shared".into(), ttl).await;
        assert!(!cache.is_degraded());

        backend.down.store(true, Ordering::SeqCst);
        assert_eq!(cache.get("k").await, None, "failed read is a miss");
        assert!(cache.is_degraded());

        // During the window the shared store is not contacted.
        let calls = backend.calls.load(Ordering::SeqCst);
        cache.set("k", "local".into(), ttl).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("local"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);

        backend.down.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("shared"));
        assert!(!cache.is_degraded());
    }
}
