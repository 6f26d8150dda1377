// tests/schema_cache.rs
//! Integration tests for the single-flight schema cache.

use futures::future::join_all;
use notionflow::{AppError, FieldKind, ObjectSchema, SchemaCache, Validator};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn task_validator() -> Arc<dyn Validator> {
    Arc::new(ObjectSchema::new("task").required("title", FieldKind::String))
}

#[tokio::test]
async fn concurrent_loads_invoke_factory_exactly_once() {
    let cache = SchemaCache::new();
    let factory_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&factory_calls);

    cache.register(
        "task",
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                // Slow construction so all five callers overlap.
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(task_validator())
            }
        },
        false,
    );

    let loads = (0..5).map(|_| cache.load("task"));
    let resolved = join_all(loads).await;

    for validator in &resolved {
        assert_eq!(validator.as_ref().unwrap().name(), "task");
    }
    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.total_requests, 5);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.total_loaded, 1);
    assert_eq!(stats.total_cached, 1);
}

#[tokio::test]
async fn cache_persists_across_calls() {
    let cache = SchemaCache::new();
    let factory_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&factory_calls);

    cache.register(
        "task",
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(task_validator()))
        },
        false,
    );

    cache.load("task").await.unwrap();
    let hits_before = cache.stats().cache_hits;
    cache.load("task").await.unwrap();

    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.cache_hits, hits_before + 1);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn unregistered_name_resolves_to_usable_fallback() {
    let cache = SchemaCache::new();

    let validator = cache.load("missing").await.unwrap();
    // The fallback accepts anything; validate() succeeds trivially.
    assert!(validator.validate(&json!({"anything": [1, 2, 3]})).is_ok());
    assert!(cache.validate("missing", &json!(null)).await.is_ok());

    let errors = cache.errors();
    assert!(errors.contains_key("missing"));
    assert!(errors["missing"].contains("missing"));
    assert!(cache.stats().total_requests >= 1);
}

#[tokio::test]
async fn factory_failure_propagates_to_every_attached_caller() {
    let cache = SchemaCache::new();
    cache.register(
        "flaky",
        || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(AppError::MalformedResponse("bad schema source".to_string()))
        },
        false,
    );

    let outcomes = join_all((0..3).map(|_| cache.load("flaky"))).await;
    for outcome in outcomes {
        let err = outcome.unwrap_err();
        assert!(matches!(err, AppError::SchemaLoadFailed { .. }));
        assert!(err.to_string().contains("bad schema source"));
    }
    assert!(cache.errors().contains_key("flaky"));
    // Nothing was cached; a later load retries the factory.
    assert_eq!(cache.stats().total_cached, 0);
}

#[tokio::test]
async fn clear_single_name_forces_reconstruction() {
    let cache = SchemaCache::new();
    let factory_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&factory_calls);

    cache.register(
        "task",
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(task_validator()))
        },
        false,
    );

    cache.load("task").await.unwrap();
    cache.clear(Some("task"));
    cache.load("task").await.unwrap();

    assert_eq!(factory_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().cache_misses, 2);
}

#[tokio::test]
async fn stats_snapshot_exposes_access_records() {
    let cache = SchemaCache::new();
    cache.register("task", || futures::future::ready(Ok(task_validator())), false);

    cache.load("task").await.unwrap();
    cache.load("task").await.unwrap();
    cache.load("task").await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.schemas.len(), 1);
    let entry = &stats.schemas[0];
    assert_eq!(entry.name, "task");
    assert_eq!(entry.access_count, 3);
    assert!(entry.last_accessed >= entry.loaded_at);
}
