// src/schema/mod.rs
//! Lazy, single-flight schema cache with access statistics.
//!
//! Validators are expensive to construct and shared across every API
//! surface, so they are built at most once per name: concurrent `load()`
//! calls for a name that is still being constructed all attach to the
//! same in-flight resolution instead of invoking the factory again.
//!
//! Missing registrations degrade gracefully — `load()` hands out a
//! permissive fallback validator and records the error, so read paths
//! that only care about happy-path validation never have to handle a
//! missing-registration failure.

pub mod validator;

use crate::error::AppError;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use validator::{PermissiveValidator, Validator};

/// Constructs a validator, possibly asynchronously.
pub type SchemaFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Validator>, AppError>> + Send + Sync>;

/// One in-flight construction, joinable by any number of waiters.
type SharedLoad = Shared<BoxFuture<'static, Result<Arc<dyn Validator>, Arc<AppError>>>>;

/// Monotone counters over the lifetime of one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub total_requests: u64,
    pub total_loaded: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Per-schema access record exposed by [`SchemaCache::stats`].
#[derive(Debug, Clone)]
pub struct SchemaEntryStats {
    pub name: String,
    pub loaded_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

/// Read-only snapshot of the cache's contents and counters.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_cached: usize,
    pub total_requests: u64,
    pub total_loaded: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub schemas: Vec<SchemaEntryStats>,
}

/// A completed cache entry.
struct StoredEntry {
    validator: Arc<dyn Validator>,
    loaded_at: DateTime<Utc>,
    access_count: u64,
    last_accessed: DateTime<Utc>,
}

/// All mutable state behind one lock.
///
/// Every mutation goes through this single guarded struct; the
/// single-flight invariant depends on the in-flight map and the cache
/// map being updated under the same critical section.
#[derive(Default)]
struct CacheInner {
    configs: HashMap<String, SchemaFactory>,
    cache: HashMap<String, StoredEntry>,
    in_flight: HashMap<String, SharedLoad>,
    errors: HashMap<String, String>,
    stats: LoadStats,
}

/// Single-flight lazy loader/cache for named validators.
///
/// Cheap to clone; clones share the same underlying state. Construct
/// one per owning process and pass it by reference — there is no
/// global default instance.
#[derive(Clone, Default)]
pub struct SchemaCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    ///
    /// A later registration with the same name replaces the prior one
    /// (last write wins) but does **not** invalidate a cache entry
    /// already created from the old factory — callers that need the new
    /// factory to take effect must `clear()` the name explicitly.
    ///
    /// With `preload`, resolution begins immediately as a fire-and-forget
    /// load; a failing factory lands in the error map instead of
    /// reaching the caller.
    pub fn register<F, Fut>(&self, name: &str, factory: F, preload: bool)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Validator>, AppError>> + Send + 'static,
    {
        let boxed: SchemaFactory = Arc::new(move || factory().boxed());
        {
            let mut inner = self.inner.lock();
            if inner.configs.insert(name.to_string(), boxed).is_some() {
                log::debug!("Schema registration replaced: {}", name);
            }
        }

        if preload {
            let cache = self.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                // Factory errors are recorded in the error map by the
                // load path itself; nothing to surface here.
                let _ = cache.load(&name).await;
            });
        }
    }

    /// Resolves `name` to a validator.
    ///
    /// Cache hit: returns the stored validator and bumps its access
    /// info. In-flight: attaches to the existing construction. Miss:
    /// invokes the registered factory exactly once regardless of how
    /// many callers are waiting. Unregistered: returns a permissive
    /// fallback and records the error — never fails for a missing name.
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Validator>, AppError> {
        let pending = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.stats.total_requests += 1;

            if let Some(entry) = inner.cache.get_mut(name) {
                inner.stats.cache_hits += 1;
                entry.access_count += 1;
                entry.last_accessed = Utc::now();
                log::debug!("Schema cache hit: {}", name);
                return Ok(Arc::clone(&entry.validator));
            }

            if let Some(load) = inner.in_flight.get(name) {
                // Attaching to an in-flight construction is a hit: no
                // new factory invocation happens on this caller's behalf.
                inner.stats.cache_hits += 1;
                log::debug!("Joining in-flight schema load: {}", name);
                load.clone()
            } else {
                inner.stats.cache_misses += 1;
                let Some(factory) = inner.configs.get(name).cloned() else {
                    let err = AppError::SchemaNotRegistered {
                        name: name.to_string(),
                    };
                    log::warn!("{}", err);
                    inner.errors.insert(name.to_string(), err.to_string());
                    return Ok(Arc::new(PermissiveValidator::new(name)));
                };
                log::debug!("Schema cache miss, constructing: {}", name);
                let load = self.begin_load(name.to_string(), factory);
                inner.in_flight.insert(name.to_string(), load.clone());
                load
            }
        };

        pending.await.map_err(|cause| AppError::SchemaLoadFailed {
            name: name.to_string(),
            cause: cause.to_string(),
        })
    }

    /// Builds the shared future that performs one construction and its
    /// completion bookkeeping. The future body runs exactly once; every
    /// attached waiter observes its output.
    fn begin_load(&self, name: String, factory: SchemaFactory) -> SharedLoad {
        let state = Arc::clone(&self.inner);
        async move {
            let result = factory().await;
            let mut inner = state.lock();
            inner.in_flight.remove(&name);
            match result {
                Ok(validator) => {
                    let now = Utc::now();
                    inner.cache.insert(
                        name.clone(),
                        StoredEntry {
                            validator: Arc::clone(&validator),
                            loaded_at: now,
                            access_count: 1,
                            last_accessed: now,
                        },
                    );
                    inner.errors.remove(&name);
                    inner.stats.total_loaded += 1;
                    log::debug!("Schema loaded: {}", name);
                    Ok(validator)
                }
                Err(e) => {
                    log::warn!("Schema factory failed for '{}': {}", name, e);
                    inner.errors.insert(name.clone(), e.to_string());
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Resolves the schema and applies it to `value`.
    ///
    /// On rejection, fails with a single error naming the schema and
    /// aggregating every field-level problem.
    pub async fn validate(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let validator = self.load(name).await?;
        validator
            .validate(value)
            .map_err(|problems| AppError::validation_failed(name, &problems))
    }

    /// Removes one cache entry, or all of them.
    ///
    /// A full clear also drops in-flight bookkeeping and recorded
    /// errors. Registrations always survive a clear.
    pub fn clear(&self, name: Option<&str>) {
        let mut inner = self.inner.lock();
        match name {
            Some(n) => {
                if inner.cache.remove(n).is_some() {
                    log::debug!("Schema cache entry cleared: {}", n);
                }
            }
            None => {
                log::debug!("Schema cache fully cleared ({} entries)", inner.cache.len());
                inner.cache.clear();
                inner.in_flight.clear();
                inner.errors.clear();
            }
        }
    }

    /// Read-only snapshot of cache contents and request counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut schemas: Vec<SchemaEntryStats> = inner
            .cache
            .iter()
            .map(|(name, entry)| SchemaEntryStats {
                name: name.clone(),
                loaded_at: entry.loaded_at,
                access_count: entry.access_count,
                last_accessed: entry.last_accessed,
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));

        CacheStats {
            total_cached: inner.cache.len(),
            total_requests: inner.stats.total_requests,
            total_loaded: inner.stats.total_loaded,
            cache_hits: inner.stats.cache_hits,
            cache_misses: inner.stats.cache_misses,
            schemas,
        }
    }

    /// Snapshot of recorded load errors, keyed by schema name.
    ///
    /// An entry appears when a name was requested without a
    /// registration or when a factory failed; it is removed by a later
    /// successful load or a full clear.
    pub fn errors(&self) -> HashMap<String, String> {
        self.inner.lock().errors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::validator::{FieldKind, ObjectSchema, Validator};
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task_schema() -> Arc<dyn Validator> {
        Arc::new(ObjectSchema::new("task").required("title", FieldKind::String))
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let cache = SchemaCache::new();
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls_in_factory = Arc::clone(&calls);
        cache.register(
            "task",
            move || {
                calls_in_factory.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                futures::future::ready(Ok(task_schema()))
            },
            false,
        );

        cache.load("task").await.unwrap();
        cache.load("task").await.unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.total_loaded, 1);
        assert_eq!(stats.schemas[0].access_count, 2);
    }

    #[tokio::test]
    async fn factory_failure_reaches_caller_and_error_map() {
        let cache = SchemaCache::new();
        cache.register(
            "broken",
            || futures::future::ready(Err(anyhow::anyhow!("boom").into())),
            false,
        );

        let err = cache.load("broken").await.unwrap_err();
        assert!(matches!(err, AppError::SchemaLoadFailed { .. }));
        assert!(cache.errors().contains_key("broken"));

        // A later successful registration + load clears the error.
        cache.register("broken", || futures::future::ready(Ok(task_schema())), false);
        cache.load("broken").await.unwrap();
        assert!(!cache.errors().contains_key("broken"));
    }

    #[tokio::test]
    async fn re_registration_does_not_invalidate_cached_entry() {
        let cache = SchemaCache::new();
        cache.register("task", || futures::future::ready(Ok(task_schema())), false);
        let first = cache.load("task").await.unwrap();

        // Replace the factory; the cached validator stays in force
        // until an explicit clear.
        cache.register(
            "task",
            || {
                futures::future::ready(Ok(Arc::new(ObjectSchema::new("task-v2"))
                    as Arc<dyn Validator>))
            },
            false,
        );
        let second = cache.load("task").await.unwrap();
        assert_eq!(first.name(), second.name());

        cache.clear(Some("task"));
        let third = cache.load("task").await.unwrap();
        assert_eq!(third.name(), "task-v2");
    }

    #[tokio::test]
    async fn validate_aggregates_field_problems() {
        let cache = SchemaCache::new();
        cache.register(
            "task",
            || {
                futures::future::ready(Ok(Arc::new(
                    ObjectSchema::new("task")
                        .required("title", FieldKind::String)
                        .required("done", FieldKind::Boolean),
                ) as Arc<dyn Validator>))
            },
            false,
        );

        let err = cache.validate("task", &json!({})).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("task"));
        assert!(message.contains("title"));
        assert!(message.contains("done"));
    }

    #[tokio::test]
    async fn full_clear_preserves_registrations() {
        let cache = SchemaCache::new();
        cache.register("task", || futures::future::ready(Ok(task_schema())), false);
        cache.load("task").await.unwrap();
        assert_eq!(cache.stats().total_cached, 1);

        cache.clear(None);
        assert_eq!(cache.stats().total_cached, 0);

        // Registration survived; the next load reconstructs.
        cache.load("task").await.unwrap();
        assert_eq!(cache.stats().total_cached, 1);
        assert_eq!(cache.stats().total_loaded, 2);
    }

    #[tokio::test]
    async fn preload_records_factory_error_without_surfacing() {
        let cache = SchemaCache::new();
        cache.register(
            "eager",
            || futures::future::ready(Err(anyhow::anyhow!("no dice").into())),
            true,
        );

        // Give the fire-and-forget task a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(cache.errors().contains_key("eager"));
    }
}
