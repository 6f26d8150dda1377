// src/lib.rs
//! notionflow — typed client core for cursor-paginated Notion-style APIs.
//!
//! Two subsystems carry the weight:
//! - **Schema cache** — a single-flight lazy loader for named validators
//!   with hit/miss/load statistics ([`SchemaCache`]).
//! - **Pagination engine** — a sequential cursor-walking fetch loop with
//!   bounded fixed-delay retry, cooperative cancellation, and hot
//!   multicast progress/metrics streams ([`PaginationEngine`]).
//!
//! HTTP transport, authentication, and the property-type taxonomy of
//! the wrapped API are external collaborators: the engine consumes a
//! caller-supplied fetch function and treats result items as opaque
//! JSON values.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling** — `AppError`, `FieldError`
//! - **Wire shapes** — `PaginatedResponse`
//! - **Schema layer** — `SchemaCache`, `Validator`, `ObjectSchema`,
//!   `PermissiveValidator`, `CacheStats`
//! - **Engine** — `PaginationEngine`, `RunHandle`, `RunOptions`,
//!   `PageSource`, `RetryPolicy`, `MetricsAggregator`, `ProgressTracker`

mod constants;
mod engine;
mod error;
mod schema;
mod types;

// --- Error Handling ---
pub use crate::error::{AppError, FieldError, Result};

// --- Wire Shapes ---
pub use crate::types::PaginatedResponse;

// --- Schema Layer ---
pub use crate::schema::validator::{
    FieldKind, ObjectSchema, PermissiveValidator, Validator,
};
pub use crate::schema::{CacheStats, SchemaCache, SchemaEntryStats, SchemaFactory};

// --- Pagination Engine ---
pub use crate::engine::metrics::{MetricsAggregator, MetricsSnapshot, RequestOutcome};
pub use crate::engine::progress::{ProgressSnapshot, ProgressTracker, Stage};
pub use crate::engine::retry::RetryPolicy;
pub use crate::engine::{PageSource, PaginationEngine, RunHandle, RunOptions};

// --- Operational Boundaries ---
pub use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY, NOTION_API_PAGE_SIZE,
};
