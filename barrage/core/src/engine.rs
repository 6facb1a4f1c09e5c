//! Barrage Engine
//!
//! Owns the live barrage set and everything that mutates it: admission, the
//! pending queue drain, the animation tick, and configuration changes.
//!
//! # Threading
//!
//! The engine is a plain `&mut self` state machine with no interior locking.
//! Exactly one owner drives it, normally the [`BarrageService`] task, which
//! also guarantees that tick and drain never overlap. Readers observe it
//! through the [`FrameSnapshot`] watch channel and the [`EngineEvent`]
//! broadcast.
//!
//! # Time
//!
//! Every time-dependent operation has an `*_at(now)` form taking an explicit
//! [`Instant`]; the plain forms use `Instant::now()`.
//!
//! # Tick
//!
//! For each live item, when not paused:
//! 1. move `2.0 * speed` points in its direction
//! 2. fade by 0.05 if past the travel boundary
//! 3. fade by 0.05 if older than its lifetime
//! 4. advance the style's animation phase when animations are enabled
//!
//! then evict every item whose opacity reached zero.
//!
//! [`BarrageService`]: crate::service::BarrageService

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::admission::{Admission, AdmissionLimiter, PendingQueue, QueuedBarrage, DEFAULT_MAX_PENDING};
use crate::config::{BarrageConfig, ConfigError, ConfigStore};
use crate::frame::{DrawableBarrage, FrameSnapshot};
use crate::item::{BarrageFactory, BarrageId, BarrageItem, BarrageKind, Direction, ScreenSize};
use crate::narration::NarrationHandle;
use crate::segmenter::segment;

/// Points moved per tick at speed 1.0
pub const BASE_STEP: f32 = 2.0;

/// Opacity lost per tick for each active decay trigger
pub const FADE_STEP: f32 = 0.05;

/// Opacity below this is treated as zero
pub const OPACITY_EPSILON: f32 = 1e-4;

const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Requests and Events
// =============================================================================

/// One admission request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarrageRequest {
    /// Text to display
    pub text: String,
    /// Kind
    pub kind: BarrageKind,
    /// Skip the rate limiter
    pub immediate: bool,
    /// Forward to narration once admitted
    pub should_speak: bool,
}

impl BarrageRequest {
    /// Normal, rate-limited, silent request
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: BarrageKind::Normal,
            immediate: false,
            should_speak: false,
        }
    }

    /// Set the kind
    #[must_use]
    pub fn with_kind(mut self, kind: BarrageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Bypass the rate limiter
    #[must_use]
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Ask for narration once admitted
    #[must_use]
    pub fn with_speech(mut self, should_speak: bool) -> Self {
        self.should_speak = should_speak;
        self
    }

    fn with_text(&self, text: String) -> Self {
        Self {
            text,
            ..self.clone()
        }
    }
}

/// Notifications about the live set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum EngineEvent {
    /// A barrage went on screen
    Admitted {
        /// New barrage
        id: BarrageId,
        /// Its text
        text: String,
        /// Its kind
        kind: BarrageKind,
        /// Whether it waited in the pending queue first
        from_queue: bool,
    },
    /// A request was queued
    Queued {
        /// Entries ahead of it
        position: usize,
    },
    /// A request was dropped because the queue was full
    Dropped {
        /// The dropped text
        text: String,
    },
    /// A barrage faded out and left the live set
    Evicted {
        /// Evicted barrage
        id: BarrageId,
    },
    /// Everything was cleared
    Cleared {
        /// Live barrages removed
        live: usize,
        /// Pending requests discarded
        pending: usize,
    },
}

// =============================================================================
// Engine
// =============================================================================

/// The barrage animation and delivery engine
pub struct BarrageEngine {
    config: BarrageConfig,
    store: Arc<dyn ConfigStore>,
    screen: ScreenSize,
    items: Vec<BarrageItem>,
    limiter: AdmissionLimiter,
    pending: PendingQueue,
    factory: BarrageFactory,
    narration: Option<NarrationHandle>,
    paused: bool,
    frame: u64,
    snapshot_tx: watch::Sender<FrameSnapshot>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for BarrageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrageEngine")
            .field("config", &self.config)
            .field("screen", &self.screen)
            .field("live", &self.items.len())
            .field("pending", &self.pending.len())
            .field("paused", &self.paused)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl BarrageEngine {
    /// Create an engine, loading its config from `store`
    ///
    /// A missing or corrupt blob falls back to [`BarrageConfig::default`].
    pub fn new(store: Arc<dyn ConfigStore>, screen: ScreenSize) -> Self {
        let config = store.load().unwrap_or_default();
        tracing::info!(
            speed = config.speed,
            density = config.density,
            direction = ?config.direction,
            %screen,
            "Barrage engine created"
        );

        let (snapshot_tx, _) = watch::channel(FrameSnapshot {
            screen,
            ..FrameSnapshot::default()
        });
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            config,
            store,
            screen,
            items: Vec::new(),
            limiter: AdmissionLimiter::new(),
            pending: PendingQueue::new(DEFAULT_MAX_PENDING),
            factory: BarrageFactory::new(),
            narration: None,
            paused: false,
            frame: 0,
            snapshot_tx,
            events_tx,
        }
    }

    /// Use a specific factory (e.g. a seeded one)
    #[must_use]
    pub fn with_factory(mut self, factory: BarrageFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Bound the pending queue
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.pending = PendingQueue::new(max_pending);
        self
    }

    /// Forward spoken admissions to a narration queue
    #[must_use]
    pub fn with_narration(mut self, narration: NarrationHandle) -> Self {
        self.narration = Some(narration);
        self
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Admit or queue one request
    pub fn add_barrage(&mut self, request: BarrageRequest) -> Admission {
        self.add_barrage_at(request, Instant::now())
    }

    /// [`add_barrage`](Self::add_barrage) at an explicit instant
    pub fn add_barrage_at(&mut self, request: BarrageRequest, now: Instant) -> Admission {
        let text = request.text.trim();
        if text.is_empty() {
            return Admission::Ignored;
        }

        if request.immediate {
            let id = self.admit(text.to_string(), request.kind, request.should_speak, now, false);
            return Admission::Admitted { id };
        }

        let min_interval = self.config.min_admission_interval();
        if !self.limiter.must_queue(self.pending.is_empty(), now, min_interval) {
            let id = self.admit(text.to_string(), request.kind, request.should_speak, now, false);
            return Admission::Admitted { id };
        }

        let entry = QueuedBarrage::new(text, request.kind, request.should_speak, now);
        match self.pending.push(entry) {
            Ok(position) => {
                tracing::debug!(position, "Barrage queued");
                self.emit(EngineEvent::Queued { position });
                self.publish();
                Admission::Queued { position }
            }
            Err(entry) => {
                tracing::warn!(
                    max_pending = self.pending.max_pending(),
                    text = %entry.text,
                    "Pending queue full, dropping barrage"
                );
                self.emit(EngineEvent::Dropped { text: entry.text });
                Admission::Dropped
            }
        }
    }

    /// Segment `text` and add each unit as a separate request
    pub fn add_multiple_barrages(&mut self, text: &str, kind: BarrageKind) -> Vec<Admission> {
        self.add_segmented_at(&BarrageRequest::new(text).with_kind(kind), Instant::now())
    }

    /// Segment `request.text`, sharing the other request fields across units
    pub fn add_segmented_at(&mut self, request: &BarrageRequest, now: Instant) -> Vec<Admission> {
        segment(&request.text)
            .into_iter()
            .map(|unit| self.add_barrage_at(request.with_text(unit), now))
            .collect()
    }

    /// Show a streamed partial right away
    ///
    /// Each partial is segmented on its own, so a sentence split across two
    /// partials shows as two barrages. Use
    /// [`StreamSegmenter`](crate::segmenter::StreamSegmenter) upstream to
    /// avoid that.
    pub fn process_streaming_response(&mut self, partial: &str) -> Vec<Admission> {
        self.process_streaming_response_at(partial, Instant::now())
    }

    /// [`process_streaming_response`](Self::process_streaming_response) at an explicit instant
    pub fn process_streaming_response_at(&mut self, partial: &str, now: Instant) -> Vec<Admission> {
        self.add_segmented_at(&BarrageRequest::new(partial).immediate(), now)
    }

    /// Admit the head of the pending queue if the spacing allows it
    pub fn drain_queue(&mut self) -> Option<BarrageId> {
        self.drain_queue_at(Instant::now())
    }

    /// [`drain_queue`](Self::drain_queue) at an explicit instant
    pub fn drain_queue_at(&mut self, now: Instant) -> Option<BarrageId> {
        if self.paused || self.pending.is_empty() {
            return None;
        }
        if !self
            .limiter
            .interval_elapsed(now, self.config.min_admission_interval())
        {
            return None;
        }

        let entry = self.pending.pop()?;
        Some(self.admit(entry.text, entry.kind, entry.should_speak, now, true))
    }

    fn admit(
        &mut self,
        text: String,
        kind: BarrageKind,
        should_speak: bool,
        now: Instant,
        from_queue: bool,
    ) -> BarrageId {
        let item = self.factory.create(text, self.screen, &self.config, kind, now);
        let id = item.id();
        self.limiter.record(now);

        tracing::debug!(
            %id,
            %kind,
            from_queue,
            direction = ?item.direction(),
            "Barrage admitted"
        );

        if should_speak && kind.is_narratable() {
            if let Some(narration) = &self.narration {
                // Completion is not tracked for barrage narration
                let _ticket = narration.enqueue(item.text(), true);
            }
        }

        self.emit(EngineEvent::Admitted {
            id,
            text: item.text().to_string(),
            kind,
            from_queue,
        });
        self.items.push(item);
        self.publish();
        id
    }

    // -------------------------------------------------------------------------
    // Animation
    // -------------------------------------------------------------------------

    /// Advance every live barrage by one frame
    ///
    /// Returns the number of barrages evicted.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) at an explicit instant
    pub fn tick_at(&mut self, now: Instant) -> usize {
        if self.paused {
            return 0;
        }

        #[allow(clippy::cast_possible_truncation)]
        let step = BASE_STEP * self.config.effective_speed() as f32;
        #[allow(clippy::cast_possible_truncation)]
        let travel = self.config.effective_travel_range() as f32;
        let width = self.screen.width;
        let animate = self.config.enable_animations;
        let rng = self.factory.rng();

        for item in &mut self.items {
            item.position.x += step * item.direction.sign();

            let past_boundary = match item.direction {
                Direction::LeftToRight => item.position.x > width * travel,
                Direction::RightToLeft => item.position.x < width * (1.0 - travel),
            };

            let mut decay = 0.0;
            if past_boundary {
                decay += FADE_STEP;
            }
            if item.is_expired_at(now) {
                decay += FADE_STEP;
            }
            if decay > 0.0 {
                item.fading = true;
                item.opacity -= decay;
                if item.opacity < OPACITY_EPSILON {
                    item.opacity = 0.0;
                }
            }

            if animate {
                item.phase.advance(item.style.effect, rng);
            }
        }

        let mut evicted = Vec::new();
        self.items.retain(|item| {
            let keep = item.opacity > 0.0;
            if !keep {
                evicted.push(item.id);
            }
            keep
        });
        for id in &evicted {
            tracing::trace!(%id, "Barrage evicted");
            self.emit(EngineEvent::Evicted { id: *id });
        }

        self.frame += 1;
        self.publish();
        evicted.len()
    }

    /// Remove every live barrage and pending request, paused or not
    pub fn clear_all_barrages(&mut self) {
        let live = self.items.len();
        self.items.clear();
        let pending = self.pending.clear();

        tracing::info!(live, pending, "Cleared all barrages");
        self.emit(EngineEvent::Cleared { live, pending });
        self.publish();
    }

    /// Pause or resume ticking and draining
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::debug!(paused, "Barrage engine pause toggled");
        }
        self.paused = paused;
        self.publish();
    }

    /// Resize the drawable area; live positions are kept
    pub fn update_screen_size(&mut self, screen: ScreenSize) {
        tracing::debug!(%screen, "Screen size updated");
        self.screen = screen;
        self.publish();
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &BarrageConfig {
        &self.config
    }

    /// Replace the configuration and persist it
    ///
    /// The new config takes effect even when persisting fails. Live barrages
    /// keep the style they were created with.
    ///
    /// # Errors
    ///
    /// Returns the store error if the config could not be saved.
    pub fn set_config(&mut self, config: BarrageConfig) -> Result<(), ConfigError> {
        self.config = config;
        let result = self.store.save(&self.config);
        match &result {
            Ok(()) => tracing::info!(
                speed = self.config.speed,
                density = self.config.density,
                "Barrage config updated"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to persist barrage config"),
        }
        result
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Live barrages in admission order
    #[must_use]
    pub fn live_items(&self) -> &[BarrageItem] {
        &self.items
    }

    /// Requests waiting for admission
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether ticking is paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current screen size
    #[must_use]
    pub fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    /// Ticks processed so far
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> FrameSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FrameSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Listen for engine events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events_tx.clone()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(FrameSnapshot {
            frame: self.frame,
            screen: self.screen,
            paused: self.paused,
            pending: self.pending.len(),
            items: self.items.iter().map(DrawableBarrage::from_item).collect(),
        });
    }
}
