// src/engine/mod.rs
//! Cursor-driven pagination engine with retry, cancellation, and
//! observable progress/metrics.
//!
//! One run walks a cursor-paginated endpoint strictly sequentially:
//! page N+1 is never requested before page N's response is known. That
//! bounds memory and guarantees in-order page emission. Each run owns
//! three output channels — results (buffered, one consumer), progress
//! and metrics (hot broadcast, any number of subscribers) — plus a
//! cooperative cancellation signal.

pub mod metrics;
pub mod progress;
pub mod retry;

use crate::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY,
    RESULTS_CHANNEL_CAPACITY, SNAPSHOT_CHANNEL_CAPACITY,
};
use crate::error::AppError;
use crate::types::PaginatedResponse;
use metrics::{MetricsAggregator, MetricsSnapshot, RequestOutcome};
use progress::{ProgressSnapshot, ProgressTracker, Stage};
use retry::RetryPolicy;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

/// The ability to fetch one page of results for an opaque cursor.
///
/// Repository-style seam for callers that prefer a trait object over a
/// closure; business logic depends on this, never on HTTP details.
#[async_trait::async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<PaginatedResponse<T>, AppError>;
}

/// Per-run tuning knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Transient-failure retry budget for the whole run (not per page).
    pub retry_count: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
    /// Interval at which the latest progress/metrics snapshots are
    /// re-emitted between page fetches. `None` disables the heartbeat.
    pub heartbeat: Option<Duration>,
    /// Buffered capacity of the results channel.
    pub channel_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            heartbeat: Some(DEFAULT_HEARTBEAT_INTERVAL),
            channel_capacity: RESULTS_CHANNEL_CAPACITY,
        }
    }
}

impl RunOptions {
    /// Options with the heartbeat re-emission disabled.
    pub fn without_heartbeat() -> Self {
        Self {
            heartbeat: None,
            ..Self::default()
        }
    }
}

/// Handle to one pagination run: the three output channels plus the
/// cancellation control.
///
/// `results` delivers every page in strict fetch order; a terminal
/// retry-exhaustion failure arrives as one `Err` item before the
/// channel closes. `progress` and `metrics` are hot broadcast streams —
/// the stored receivers observe the run from its start, and
/// [`RunHandle::subscribe_progress`]/[`RunHandle::subscribe_metrics`]
/// attach additional late subscribers that see subsequent emissions
/// only. All three channels close after the final snapshot emissions,
/// so a consumer that drains `results` to completion can trust that the
/// final statistics have already been published.
pub struct RunHandle<T> {
    pub results: mpsc::Receiver<Result<PaginatedResponse<T>, AppError>>,
    pub progress: broadcast::Receiver<ProgressSnapshot>,
    pub metrics: broadcast::Receiver<MetricsSnapshot>,
    cancel: watch::Sender<bool>,
}

impl<T> RunHandle<T> {
    /// Receives the next page, or `None` once the run is over.
    pub async fn next_page(&mut self) -> Option<Result<PaginatedResponse<T>, AppError>> {
        self.results.recv().await
    }

    /// Attaches an additional progress subscriber at the stream's tail.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressSnapshot> {
        self.progress.resubscribe()
    }

    /// Attaches an additional metrics subscriber at the stream's tail.
    pub fn subscribe_metrics(&self) -> broadcast::Receiver<MetricsSnapshot> {
        self.metrics.resubscribe()
    }

    /// Requests cooperative cancellation.
    ///
    /// No further fetches are issued; an attempt already in flight is
    /// dropped at the next suspension point and all three channels
    /// close without a completion snapshot.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Drives repeated fetches along a server-supplied continuation cursor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaginationEngine {
    policy: RetryPolicy,
}

impl PaginationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a run against a caller-supplied fetch closure.
    ///
    /// The closure receives the opaque cursor from the previous
    /// response (`None` for the first page); the engine passes cursors
    /// through unchanged and never advances them on failure.
    pub fn run<T, F, Fut>(&self, fetch: F, options: RunOptions) -> RunHandle<T>
    where
        T: Send + 'static,
        F: FnMut(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<PaginatedResponse<T>, AppError>> + Send + 'static,
    {
        let (results_tx, results_rx) = mpsc::channel(options.channel_capacity.max(1));
        let (progress_tx, progress_rx) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (metrics_tx, metrics_rx) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (latest_progress_tx, latest_progress_rx) = watch::channel(None::<ProgressSnapshot>);
        let (latest_metrics_tx, latest_metrics_rx) = watch::channel(None::<MetricsSnapshot>);

        if let Some(interval) = options.heartbeat {
            tokio::spawn(heartbeat_loop(
                interval,
                latest_progress_rx,
                latest_metrics_rx,
                progress_tx.clone(),
                metrics_tx.clone(),
                done_rx,
            ));
        }

        tokio::spawn(run_loop(RunState {
            fetch,
            options,
            policy: self.policy,
            results_tx,
            progress_tx,
            metrics_tx,
            latest_progress_tx,
            latest_metrics_tx,
            cancel_rx,
            done_tx,
        }));

        RunHandle {
            results: results_rx,
            progress: progress_rx,
            metrics: metrics_rx,
            cancel: cancel_tx,
        }
    }

    /// Starts a run against a [`PageSource`] trait object.
    pub fn run_source<T: Send + 'static>(
        &self,
        source: Arc<dyn PageSource<T>>,
        options: RunOptions,
    ) -> RunHandle<T> {
        self.run(
            move |cursor| {
                let source = Arc::clone(&source);
                async move { source.fetch_page(cursor).await }
            },
            options,
        )
    }
}

/// Everything one run loop owns.
struct RunState<T, F> {
    fetch: F,
    options: RunOptions,
    policy: RetryPolicy,
    results_tx: mpsc::Sender<Result<PaginatedResponse<T>, AppError>>,
    progress_tx: broadcast::Sender<ProgressSnapshot>,
    metrics_tx: broadcast::Sender<MetricsSnapshot>,
    latest_progress_tx: watch::Sender<Option<ProgressSnapshot>>,
    latest_metrics_tx: watch::Sender<Option<MetricsSnapshot>>,
    cancel_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

/// How one attempt loop ended.
enum AttemptOutcome<T> {
    Page(PaginatedResponse<T>),
    Cancelled,
    Exhausted { attempts: u32, cause: AppError },
}

/// The fetch loop for one run. Runs as a spawned task; every exit path
/// signals `done` (stopping the heartbeat), then drops the channel
/// senders so all three streams close — always after the final snapshot
/// emissions for that exit path.
async fn run_loop<T, F, Fut>(mut run: RunState<T, F>)
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<PaginatedResponse<T>, AppError>> + Send + 'static,
{
    let mut cursor: Option<String> = None;
    let mut metrics = MetricsAggregator::new();
    let mut progress = ProgressTracker::new();
    let mut retries_used: u32 = 0;

    log::info!(
        "Pagination run started (retry budget: {}, delay: {:?})",
        run.options.retry_count,
        run.options.retry_delay
    );

    loop {
        let outcome = fetch_with_retry(&mut run, &mut metrics, &mut retries_used, &cursor).await;

        let page = match outcome {
            AttemptOutcome::Page(page) => page,
            AttemptOutcome::Cancelled => {
                log::info!(
                    "Pagination run cancelled after {} page(s)",
                    progress.pages_fetched()
                );
                let _ = run.done_tx.send(true);
                return;
            }
            AttemptOutcome::Exhausted { attempts, cause } => {
                log::warn!(
                    "Pagination run failed on page {} after {} attempt(s): {}",
                    progress.pages_fetched() + 1,
                    attempts,
                    cause
                );
                // Final statistics first, then the terminal failure on
                // results, then closure of all three channels.
                publish_metrics(&mut run, &metrics);
                let _ = run
                    .results_tx
                    .send(Err(AppError::FetchFailed {
                        attempts,
                        cause: cause.to_string(),
                    }))
                    .await;
                let _ = run.done_tx.send(true);
                return;
            }
        };

        let terminal = !page.continues();
        let next_cursor = page.next_cursor.clone();
        progress.page_fetched(page.results.len(), terminal);

        log::debug!(
            "Fetched page {} ({} items, terminal: {})",
            progress.pages_fetched(),
            page.results.len(),
            terminal
        );

        // Pages are emitted exactly once, in strict fetch order. A full
        // channel suspends the loop here rather than fetching ahead.
        if run.results_tx.send(Ok(page)).await.is_err() {
            log::debug!("Results receiver dropped; stopping run");
            let _ = run.done_tx.send(true);
            return;
        }

        publish_progress(&mut run, &progress);
        publish_metrics(&mut run, &metrics);

        if terminal {
            break;
        }
        cursor = next_cursor;
    }

    // Completion: a final snapshot pair with stage=complete, total and
    // percentage pinned, emitted strictly before the channels close.
    publish_progress(&mut run, &progress);
    publish_metrics(&mut run, &metrics);
    log::info!(
        "Pagination run complete: {} page(s), {} request(s)",
        progress.pages_fetched(),
        metrics.snapshot().request_count
    );
    let _ = run.done_tx.send(true);
}

/// Fetches the page at `cursor`, retrying transient failures with a
/// fixed delay until the per-run retry budget is exhausted. The cursor
/// is never advanced on failure — every attempt re-requests the same
/// position.
async fn fetch_with_retry<T, F, Fut>(
    run: &mut RunState<T, F>,
    metrics: &mut MetricsAggregator,
    retries_used: &mut u32,
    cursor: &Option<String>,
) -> AttemptOutcome<T>
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<PaginatedResponse<T>, AppError>> + Send + 'static,
{
    let mut attempts_this_page: u32 = 0;

    loop {
        if *run.cancel_rx.borrow() {
            return AttemptOutcome::Cancelled;
        }

        attempts_this_page += 1;
        let started = Instant::now();
        let attempt = (run.fetch)(cursor.clone());

        let fetched = tokio::select! {
            // The cancel watch only ever transitions to true; a closed
            // sender means the handle is gone, which also ends the run.
            _ = run.cancel_rx.changed() => return AttemptOutcome::Cancelled,
            fetched = attempt => fetched,
        };

        match fetched {
            Ok(page) => {
                metrics.add(RequestOutcome::success(
                    page.results.len(),
                    started.elapsed(),
                ));
                return AttemptOutcome::Page(page);
            }
            Err(cause) => {
                metrics.add(RequestOutcome::failure(started.elapsed()));

                if !run.policy.should_retry(*retries_used, run.options.retry_count) {
                    return AttemptOutcome::Exhausted {
                        attempts: attempts_this_page,
                        cause,
                    };
                }

                let delay = run.policy.delay_for(*retries_used, run.options.retry_delay);
                *retries_used += 1;
                log::warn!(
                    "Fetch attempt failed ({}); retrying in {:?} ({}/{} retries used)",
                    cause,
                    delay,
                    retries_used,
                    run.options.retry_count
                );

                tokio::select! {
                    _ = run.cancel_rx.changed() => return AttemptOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

fn publish_progress<T, F>(run: &mut RunState<T, F>, progress: &ProgressTracker) {
    let snapshot = progress.snapshot();
    let _ = run.latest_progress_tx.send(Some(snapshot.clone()));
    let _ = run.progress_tx.send(snapshot);
}

fn publish_metrics<T, F>(run: &mut RunState<T, F>, metrics: &MetricsAggregator) {
    let snapshot = metrics.snapshot();
    let _ = run.latest_metrics_tx.send(Some(snapshot.clone()));
    let _ = run.metrics_tx.send(snapshot);
}

/// Re-emits the last known snapshots on a fixed interval so slow
/// consumers see periodic liveness updates between page fetches.
///
/// Progress re-emission stops once the run reaches `Complete`; metrics
/// re-emission continues for as long as the run is active. The task
/// exits — dropping its broadcast senders — when the run signals done.
async fn heartbeat_loop(
    interval: Duration,
    latest_progress: watch::Receiver<Option<ProgressSnapshot>>,
    latest_metrics: watch::Receiver<Option<MetricsSnapshot>>,
    progress_tx: broadcast::Sender<ProgressSnapshot>,
    metrics_tx: broadcast::Sender<MetricsSnapshot>,
    mut done: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the heartbeat only
    // ever re-emits snapshots that already exist.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = done.changed() => return,
            _ = ticker.tick() => {
                let progress_snapshot = latest_progress.borrow().clone();
                if let Some(snapshot) = progress_snapshot {
                    if snapshot.stage != Stage::Complete {
                        let _ = progress_tx.send(snapshot);
                    }
                }
                let metrics_snapshot = latest_metrics.borrow().clone();
                if let Some(snapshot) = metrics_snapshot {
                    let _ = metrics_tx.send(snapshot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn numbered_page(start: u32, count: u32, next: Option<&str>) -> PaginatedResponse<u32> {
        let results = (start..start + count).collect();
        match next {
            Some(cursor) => PaginatedResponse::continuation(results, cursor),
            None => PaginatedResponse::terminal(results),
        }
    }

    #[tokio::test]
    async fn single_page_run_completes() {
        let engine = PaginationEngine::new();
        let mut handle = engine.run(
            |_cursor| async { Ok(numbered_page(0, 3, None)) },
            RunOptions::without_heartbeat(),
        );

        let page = handle.next_page().await.unwrap().unwrap();
        assert_eq!(page.results, vec![0, 1, 2]);
        assert!(handle.next_page().await.is_none());
    }

    #[tokio::test]
    async fn cursor_is_passed_through_unchanged() {
        let engine = PaginationEngine::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_in_fetch = Arc::clone(&seen);

        let mut handle = engine.run(
            move |cursor| {
                let seen = Arc::clone(&seen_in_fetch);
                async move {
                    seen.lock().push(cursor.clone());
                    Ok(match cursor.as_deref() {
                        None => numbered_page(0, 2, Some("opaque-c1")),
                        Some("opaque-c1") => numbered_page(2, 2, None),
                        Some(other) => panic!("fabricated cursor: {}", other),
                    })
                }
            },
            RunOptions::without_heartbeat(),
        );

        while handle.next_page().await.is_some() {}
        assert_eq!(
            *seen.lock(),
            vec![None, Some("opaque-c1".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_uses_fixed_delay() {
        let engine = PaginationEngine::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in_fetch = Arc::clone(&attempts);

        let options = RunOptions {
            retry_count: 2,
            retry_delay: Duration::from_millis(500),
            heartbeat: None,
            ..RunOptions::default()
        };

        let started = tokio::time::Instant::now();
        let mut handle = engine.run(
            move |_cursor| {
                let attempts = Arc::clone(&attempts_in_fetch);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::MalformedResponse("flaky".to_string()))
                    } else {
                        Ok(numbered_page(0, 1, None))
                    }
                }
            },
            options,
        );

        let page = handle.next_page().await.unwrap().unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two retries, each after the same fixed 500ms delay.
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }
}
