//! Admission Control
//!
//! Keeps the screen readable by spacing barrages out in time.
//!
//! # Design
//!
//! The limiter remembers a single "last admission" instant shared by every
//! admission path (immediate, direct and drained). A request is admitted
//! directly only when:
//! - nothing is waiting in the pending queue, and
//! - at least `1 / density` has elapsed since the last admission.
//!
//! Everything else waits in a FIFO [`PendingQueue`] that the engine drains on
//! a fixed cadence, one entry per drain, under the same spacing rule. Entries
//! of a burst are never reordered. Immediate requests bypass both checks.
//!
//! ```text
//!   add_barrage ──► immediate? ──yes──────────────────────────► admit
//!                      │no
//!                      ▼
//!           queue empty && interval elapsed? ──yes────────────► admit
//!                      │no
//!                      ▼
//!               queue full? ──yes──► Dropped
//!                      │no
//!                      ▼
//!                   Queued ──► drain (every 100 ms) ──────────► admit
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::item::{BarrageId, BarrageKind};

/// Default bound on the pending queue
pub const DEFAULT_MAX_PENDING: usize = 1000;

/// Outcome of an admission request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Admission {
    /// Placed on screen right away
    Admitted {
        /// ID of the new barrage
        id: BarrageId,
    },
    /// Waiting in the pending queue
    Queued {
        /// Number of entries ahead of this one
        position: usize,
    },
    /// Pending queue was full
    Dropped,
    /// Blank text, nothing to show
    Ignored,
}

impl Admission {
    /// Check if the request produced a live barrage
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Check if the request is waiting in the queue
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// ID of the admitted barrage, if any
    #[must_use]
    pub fn id(&self) -> Option<BarrageId> {
        match self {
            Self::Admitted { id } => Some(*id),
            _ => None,
        }
    }
}

/// A request waiting for admission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedBarrage {
    /// Display text
    pub text: String,
    /// Kind
    pub kind: BarrageKind,
    /// Forward to narration once admitted
    pub should_speak: bool,
    /// When the request was queued
    pub queued_at: Instant,
}

impl QueuedBarrage {
    /// Create a queued entry
    pub fn new(text: impl Into<String>, kind: BarrageKind, should_speak: bool, now: Instant) -> Self {
        Self {
            text: text.into(),
            kind,
            should_speak,
            queued_at: now,
        }
    }
}

// =============================================================================
// Limiter
// =============================================================================

/// Minimum-spacing limiter over a single shared admission instant
#[derive(Clone, Debug, Default)]
pub struct AdmissionLimiter {
    last_admission: Option<Instant>,
    total_admitted: u64,
}

impl AdmissionLimiter {
    /// Limiter that has never admitted anything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `min_interval` has passed since the last admission
    #[must_use]
    pub fn interval_elapsed(&self, now: Instant, min_interval: Duration) -> bool {
        match self.last_admission {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= min_interval,
        }
    }

    /// Whether a non-immediate request must wait in the queue
    #[must_use]
    pub fn must_queue(&self, queue_empty: bool, now: Instant, min_interval: Duration) -> bool {
        !queue_empty || !self.interval_elapsed(now, min_interval)
    }

    /// Record an admission from any path
    pub fn record(&mut self, now: Instant) {
        self.last_admission = Some(now);
        self.total_admitted += 1;
    }

    /// Instant of the most recent admission
    #[must_use]
    pub fn last_admission(&self) -> Option<Instant> {
        self.last_admission
    }

    /// Admissions recorded so far
    #[must_use]
    pub fn total_admitted(&self) -> u64 {
        self.total_admitted
    }
}

// =============================================================================
// Pending Queue
// =============================================================================

/// Bounded FIFO of requests waiting for admission
#[derive(Clone, Debug)]
pub struct PendingQueue {
    entries: VecDeque<QueuedBarrage>,
    max_pending: usize,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl PendingQueue {
    /// Empty queue holding at most `max_pending` entries
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_pending,
        }
    }

    /// Append an entry, returning the number of entries ahead of it
    ///
    /// # Errors
    ///
    /// Hands the entry back when the queue is full.
    pub fn push(&mut self, entry: QueuedBarrage) -> Result<usize, QueuedBarrage> {
        if self.entries.len() >= self.max_pending {
            return Err(entry);
        }
        let position = self.entries.len();
        self.entries.push_back(entry);
        Ok(position)
    }

    /// Remove the head entry
    pub fn pop(&mut self) -> Option<QueuedBarrage> {
        self.entries.pop_front()
    }

    /// Head entry, if any
    #[must_use]
    pub fn front(&self) -> Option<&QueuedBarrage> {
        self.entries.front()
    }

    /// Drop every entry, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Number of waiting entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity bound
    #[must_use]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Iterate waiting entries head first
    pub fn iter(&self) -> impl Iterator<Item = &QueuedBarrage> {
        self.entries.iter()
    }
}
