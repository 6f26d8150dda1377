// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains, not its
//! technical role. Reading these constants should tell you the story
//! of how the system operates: how often it retries, how it paces its
//! liveness heartbeats, how much it buffers between fetch and consumer.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Notion API boundaries
// ---------------------------------------------------------------------------

/// How many objects the Notion API returns per page of results.
///
/// The Notion API maximum is 100. Callers building fetch closures use
/// the maximum to minimize round-trips across a pagination run.
pub const NOTION_API_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Retry boundaries
// ---------------------------------------------------------------------------

/// Default number of retries for a transient fetch failure.
///
/// The budget is per run, not per page: a run that burns all of its
/// retries on page 3 has none left for page 7.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default fixed delay between retry attempts.
///
/// The delay is deliberately fixed rather than exponential — consumers
/// assert on its timing, so it is part of the observable contract.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Stream boundaries
// ---------------------------------------------------------------------------

/// Default interval at which the latest progress/metrics snapshots are
/// re-emitted even when no new page has arrived.
///
/// This keeps slow consumers seeing periodic liveness updates between
/// page fetches. Configurable per run; disable with `heartbeat: None`.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(250);

/// Default buffered capacity of the results channel.
///
/// Bounds memory when the consumer is slower than the fetch loop; the
/// loop suspends on a full channel rather than fetching ahead.
pub const RESULTS_CHANNEL_CAPACITY: usize = 16;

/// Buffered capacity of the broadcast progress/metrics channels.
///
/// Snapshot streams are lossy for lagging subscribers; a generous
/// buffer means only pathologically slow consumers skip emissions.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;
