//! Time-bounded result cache shared by every [`WithCache`] wrapper that is
//! handed the same [`QueryCache`].

use crate::{error::OperationError, operation::Operation};
use async_trait::async_trait;
use serde::Serialize;
use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, info};

/// Cache key for a call: md5 of `{"args": .., "function": ..}` rendered as
/// JSON. Object keys are sorted, so equal arguments always give equal keys.
pub fn cache_key<A: Serialize>(function: &str, args: &A) -> Result<String, serde_json::Error> {
    let mut payload = serde_json::Map::new();
    payload.insert("args".to_string(), serde_json::to_value(args)?);
    payload.insert(
        "function".to_string(),
        serde_json::Value::String(function.to_string()),
    );
    let rendered = serde_json::to_string(&serde_json::Value::Object(payload))?;
    Ok(format!("{:x}", md5::compute(rendered.as_bytes())))
}

pub struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    operation: String,
    created: Instant,
    hits: u64,
    /// Zero means the entry never expires.
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Arc<dyn Any + Send + Sync>, operation: &str, ttl: Duration) -> Self {
        Self {
            value,
            operation: operation.to_string(),
            created: Instant::now(),
            hits: 0,
            ttl,
        }
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.age() > self.ttl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u64,
    pub average_hits_per_entry: f64,
    pub average_age: Duration,
    pub oldest_age: Duration,
    pub newest_age: Duration,
}

/// Process-wide store of cached results. Build one at startup and share it
/// as an `Arc<QueryCache>`.
#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a copy of the live value under `key` and counts the hit.
    /// An expired entry is removed and reported as a miss, as is a value of
    /// a different type.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;

        if entry.is_expired() {
            info!(
                operation = %entry.operation,
                age_ms = entry.age().as_millis() as u64,
                "Cache entry expired"
            );
            entries.remove(key);
            return None;
        }

        let value = entry.value.downcast_ref::<T>()?.clone();
        entry.hits += 1;
        info!(
            operation = %entry.operation,
            age_ms = entry.age().as_millis() as u64,
            hits = entry.hits,
            "Cache hit"
        );
        Some(value)
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn insert<T>(&self, key: String, operation: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let entry = CacheEntry::new(Arc::new(value), operation, ttl);
        self.lock().insert(key, entry);
        debug!(operation, ttl_ms = ttl.as_millis() as u64, "Cached result");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let cleared = entries.len();
        entries.clear();
        info!(cleared, "Cache cleared");
        cleared
    }

    /// `None` when the cache is empty.
    pub fn stats(&self) -> Option<CacheStats> {
        let entries = self.lock();
        if entries.is_empty() {
            return None;
        }

        let total_entries = entries.len();
        let total_hits = entries.values().map(|e| e.hits).sum::<u64>();
        let ages = entries.values().map(|e| e.age()).collect::<Vec<_>>();
        let total_age = ages.iter().sum::<Duration>();

        Some(CacheStats {
            total_entries,
            total_hits,
            average_hits_per_entry: total_hits as f64 / total_entries as f64,
            average_age: total_age / total_entries as u32,
            oldest_age: ages.iter().max().copied().unwrap_or_default(),
            newest_age: ages.iter().min().copied().unwrap_or_default(),
        })
    }
}

/// Serves repeated calls with equal arguments from a [`QueryCache`].
pub struct WithCache<Op> {
    inner: Op,
    cache: Arc<QueryCache>,
    ttl: Duration,
}

impl<Op> WithCache<Op> {
    pub fn new(inner: Op, cache: Arc<QueryCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl<Op> Operation for WithCache<Op>
where
    Op: Operation,
    Op::Output: Clone + Sync + 'static,
{
    type Args = Op::Args;
    type Output = Op::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, OperationError> {
        let operation = self.inner.name();
        let key =
            cache_key(operation, args).map_err(|e| OperationError::Unexpected(Box::new(e)))?;

        if let Some(hit) = self.cache.get::<Op::Output>(&key) {
            return Ok(hit);
        }

        info!(operation, "Cache miss");
        let started = Instant::now();
        let output = self.inner.call(args).await?;
        debug!(
            operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Executed uncached call"
        );

        self.cache.insert(key, operation, output.clone(), self.ttl);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{FnOperation, OperationExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Lookup {
        table: String,
        min_age: i64,
    }

    fn lookup(table: &str, min_age: i64) -> Lookup {
        Lookup {
            table: table.to_string(),
            min_age,
        }
    }

    fn counting_op(
        calls: Arc<AtomicUsize>,
    ) -> impl Operation<Args = Lookup, Output = Vec<String>> {
        FnOperation::new("users_older_than", move |args: &Lookup| {
            let calls = calls.clone();
            let rendered = format!("{}>{}", args.table, args.min_age);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OperationError>(vec![rendered])
            })
        })
    }

    #[test]
    fn test_key_is_stable_and_argument_sensitive() {
        let a = cache_key("f", &lookup("users", 25)).unwrap();
        let b = cache_key("f", &lookup("users", 25)).unwrap();
        let c = cache_key("f", &lookup("users", 26)).unwrap();
        let d = cache_key("g", &lookup("users", 25)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_within_ttl_and_refreshes_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(QueryCache::new());
        let op = counting_op(calls.clone()).with_cache(cache.clone(), Duration::from_secs(300));

        let first = op.call(&lookup("users", 25)).await.unwrap();
        let second = op.call(&lookup("users", 25)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        op.call(&lookup("users", 30)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        op.call(&lookup("users", 25)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(QueryCache::new());
        let op = counting_op(calls.clone()).with_cache(cache, Duration::ZERO);

        op.call(&lookup("users", 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        op.call(&lookup("users", 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_clear() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(QueryCache::new());
        assert!(cache.stats().is_none());

        let op = counting_op(calls).with_cache(cache.clone(), Duration::from_secs(60));
        op.call(&lookup("users", 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        op.call(&lookup("users", 2)).await.unwrap();
        op.call(&lookup("users", 1)).await.unwrap();
        op.call(&lookup("users", 1)).await.unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_hits, 2);
        assert_eq!(stats.average_hits_per_entry, 1.0);
        assert_eq!(stats.oldest_age, Duration::from_secs(10));
        assert_eq!(stats.newest_age, Duration::ZERO);
        assert_eq!(stats.average_age, Duration::from_secs(5));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = QueryCache::new();
        cache.insert("k".to_string(), "op", 42u32, Duration::ZERO);
        assert_eq!(cache.get::<u32>("k"), Some(42));
        assert_eq!(cache.get::<String>("k"), None);
    }
}
