// src/engine/progress.rs
//! Progress derivation for cursor-driven pagination.
//!
//! Cursor pagination never reports a total count up front, so `total`
//! and `percentage` stay unknown until the terminal page is observed.
//! The snapshot models that uncertainty explicitly instead of guessing.

/// Pagination run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetching => write!(f, "fetching"),
            Stage::Complete => write!(f, "complete"),
        }
    }
}

/// Immutable point-in-time view of pagination advancement.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Pages fetched so far.
    pub current: u64,
    /// Total pages — known only once the terminal page is observed.
    pub total: Option<u64>,
    /// Completion percentage — same availability as `total`.
    pub percentage: Option<f64>,
    pub message: String,
    pub stage: Stage,
}

/// Tracks pagination advancement and derives snapshots from it.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    pages_fetched: u64,
    items_fetched: u64,
    terminal_seen: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successfully fetched page.
    pub fn page_fetched(&mut self, items: usize, is_terminal: bool) {
        self.pages_fetched += 1;
        self.items_fetched += items as u64;
        if is_terminal {
            self.terminal_seen = true;
        }
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Snapshot for the current state of the run.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let stage = if self.terminal_seen {
            Stage::Complete
        } else {
            Stage::Fetching
        };
        let (total, percentage) = if self.terminal_seen {
            (Some(self.pages_fetched), Some(100.0))
        } else {
            (None, None)
        };

        ProgressSnapshot {
            current: self.pages_fetched,
            total,
            percentage,
            message: match stage {
                Stage::Fetching => format!(
                    "Fetched {} page(s), {} item(s); more to come",
                    self.pages_fetched, self.items_fetched
                ),
                Stage::Complete => format!(
                    "Fetched {} page(s), {} item(s)",
                    self.pages_fetched, self.items_fetched
                ),
            },
            stage,
        }
    }
}
