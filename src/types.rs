// src/types.rs
//! Wire-shape types shared between the schema and engine layers.
//!
//! These are the only shapes the engine understands about the API it
//! walks: one page of opaque results plus the cursor bookkeeping the
//! server attaches to it.

use serde::Deserialize;

/// Generic paginated response from a Notion-style API.
///
/// `next_cursor` is an opaque, server-issued continuation token. The
/// engine passes it through unchanged from one response to the next
/// request and never fabricates or mutates it.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedResponse<T> {
    pub results: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl<T> PaginatedResponse<T> {
    /// A terminal page: no further data available.
    pub fn terminal(results: Vec<T>) -> Self {
        Self {
            results,
            has_more: false,
            next_cursor: None,
        }
    }

    /// A continuation page pointing at the next cursor.
    pub fn continuation(results: Vec<T>, next_cursor: impl Into<String>) -> Self {
        Self {
            results,
            has_more: true,
            next_cursor: Some(next_cursor.into()),
        }
    }

    /// Whether the server reported more data *and* supplied a cursor to
    /// reach it. Some backends set `has_more` with a null cursor; that
    /// is treated as terminal.
    pub fn continues(&self) -> bool {
        self.has_more && self.next_cursor.is_some()
    }
}
