//! Bounded log of everything the store reported.
//!
//! The store never throws for routing or configuration mistakes; it reports
//! them and keeps going. `Diagnostics` is where those reports land. Each
//! report is logged through `tracing` and kept in memory so tests and tooling
//! can see what the store complained about.
//!
//! # Usage
//!
//! ```ignore
//! store.dispatch("missing", json!(null)).await?;
//!
//! for entry in store.diagnostics().recent(5) {
//!     eprintln!("[{}] {}", entry.severity, entry.error);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::error::{Severity, StoreError};

/// Default number of reports to retain.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// A single reported problem.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// What went wrong.
    pub error: StoreError,
    /// How loudly it was logged.
    pub severity: Severity,
    /// When it was reported.
    pub reported_at: DateTime<Utc>,
}

/// Thread-safe collection of recent reports.
///
/// Only the most recent `capacity` entries are retained; the total count
/// keeps growing regardless.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Mutex<VecDeque<Diagnostic>>,
    capacity: usize,
    total: AtomicUsize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DIAGNOSTICS_CAPACITY)
    }

    /// Create a log retaining at most `capacity` entries. Zero disables
    /// retention; reports are still logged.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            total: AtomicUsize::new(0),
        }
    }

    /// Acquire the entries lock, recovering from poison if necessary.
    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<Diagnostic>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log and record a problem.
    pub fn report(&self, problem: StoreError) {
        let severity = problem.severity();
        match severity {
            Severity::Warning => warn!(kind = problem.label(), "{}", problem),
            Severity::Error => error!(kind = problem.label(), "{}", problem),
        }

        self.total.fetch_add(1, Ordering::Relaxed);
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.lock_entries();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Diagnostic {
            error: problem,
            severity,
            reported_at: Utc::now(),
        });
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.lock_entries().iter().cloned().collect()
    }

    /// The most recent `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<Diagnostic> {
        self.lock_entries().iter().rev().take(n).cloned().collect()
    }

    /// Retained errors matching a predicate, oldest first.
    pub fn matching<F>(&self, predicate: F) -> Vec<StoreError>
    where
        F: Fn(&StoreError) -> bool,
    {
        self.lock_entries()
            .iter()
            .filter(|d| predicate(&d.error))
            .map(|d| d.error.clone())
            .collect()
    }

    /// Whether any retained error matches a predicate.
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&StoreError) -> bool,
    {
        self.lock_entries().iter().any(|d| predicate(&d.error))
    }

    /// Number of retained entries at `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.lock_entries()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Number of reports ever made, including evicted ones.
    pub fn total_reported(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }
}
