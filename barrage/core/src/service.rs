//! Engine Scheduler
//!
//! Runs a [`BarrageEngine`] on its own tokio task and drives it with two
//! fixed-rate timers: the animation tick (30 Hz by default) and the pending
//! queue drain (every 100 ms by default).
//!
//! # Design
//!
//! ```text
//!   BarrageHandle (any thread) ──mpsc──┐
//!                                      ▼
//!              ┌──────────── engine task ────────────┐
//!              │ select! {                           │
//!              │   tick     => engine.tick()         │
//!              │   drain    => engine.drain_queue()  │──► watch<FrameSnapshot>
//!              │   command  => apply(command)        │──► broadcast<EngineEvent>
//!              │ }                                   │
//!              └─────────────────────────────────────┘
//! ```
//!
//! The single `select!` loop is the only place the engine is touched, so tick,
//! drain and inbound requests never run concurrently. Handle methods only
//! enqueue a command and never block.
//!
//! Engine time comes from the tokio clock, which keeps paused-clock tests
//! deterministic.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::admission::Admission;
use crate::config::{BarrageConfig, ConfigError};
use crate::engine::{BarrageEngine, BarrageRequest, EngineEvent};
use crate::frame::FrameSnapshot;
use crate::item::{BarrageKind, ScreenSize};

/// Shortest timer period the scheduler accepts
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Timer periods for the engine task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Animation tick period
    pub tick_interval: Duration,
    /// Pending queue drain period
    pub drain_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1) / 30,
            drain_interval: Duration::from_millis(100),
        }
    }
}

/// Errors from the engine service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The engine task is not running
    #[error("Barrage engine task is not running")]
    Closed,

    /// The engine task panicked or was aborted
    #[error("Barrage engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The new config could not be persisted
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Requests marshalled onto the engine task
enum EngineCommand {
    Add {
        request: BarrageRequest,
        reply: Option<oneshot::Sender<Admission>>,
    },
    AddSegmented {
        request: BarrageRequest,
    },
    Stream {
        partial: String,
    },
    Clear,
    SetPaused(bool),
    Resize(ScreenSize),
    SetConfig {
        config: BarrageConfig,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    GetConfig {
        reply: oneshot::Sender<BarrageConfig>,
    },
    Shutdown,
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable, thread-safe entry point to a running engine
#[derive(Clone)]
pub struct BarrageHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
    snapshots: watch::Receiver<FrameSnapshot>,
    events: broadcast::Sender<EngineEvent>,
}

impl std::fmt::Debug for BarrageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrageHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl BarrageHandle {
    fn send(&self, command: EngineCommand) -> Result<(), ServiceError> {
        self.tx.send(command).map_err(|_| ServiceError::Closed)
    }

    /// Queue an admission request
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn add_barrage(&self, request: BarrageRequest) -> Result<(), ServiceError> {
        self.send(EngineCommand::Add {
            request,
            reply: None,
        })
    }

    /// Queue an admission request and wait for its outcome
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub async fn admit(&self, request: BarrageRequest) -> Result<Admission, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Add {
            request,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Segment `text` and add each unit
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn add_multiple_barrages(
        &self,
        text: impl Into<String>,
        kind: BarrageKind,
    ) -> Result<(), ServiceError> {
        self.add_segmented(BarrageRequest::new(text).with_kind(kind))
    }

    /// Segment `request.text`, sharing the other request fields across units
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn add_segmented(&self, request: BarrageRequest) -> Result<(), ServiceError> {
        self.send(EngineCommand::AddSegmented { request })
    }

    /// Show a streamed partial right away
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn process_streaming_response(&self, partial: impl Into<String>) -> Result<(), ServiceError> {
        self.send(EngineCommand::Stream {
            partial: partial.into(),
        })
    }

    /// Remove every live barrage and pending request
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn clear_all_barrages(&self) -> Result<(), ServiceError> {
        self.send(EngineCommand::Clear)
    }

    /// Pause or resume the tick and drain
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn set_paused(&self, paused: bool) -> Result<(), ServiceError> {
        self.send(EngineCommand::SetPaused(paused))
    }

    /// Resize the drawable area
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub fn update_screen_size(&self, screen: ScreenSize) -> Result<(), ServiceError> {
        self.send(EngineCommand::Resize(screen))
    }

    /// Replace and persist the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if persisting failed (the config is
    /// applied anyway) or [`ServiceError::Closed`] if the engine task is gone.
    pub async fn set_config(&self, config: BarrageConfig) -> Result<(), ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetConfig { config, reply })?;
        rx.await.map_err(|_| ServiceError::Closed)??;
        Ok(())
    }

    /// Current configuration
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the engine task is gone.
    pub async fn config(&self) -> Result<BarrageConfig, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::GetConfig { reply })?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> FrameSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FrameSnapshot> {
        self.snapshots.clone()
    }

    /// Listen for engine events
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Check if the engine task is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the engine task is gone
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

// =============================================================================
// Service
// =============================================================================

/// Owner of the engine task
///
/// Dropping the service aborts the task and stops both timers.
pub struct BarrageService {
    handle: BarrageHandle,
    task: Option<JoinHandle<BarrageEngine>>,
}

impl BarrageService {
    /// Move `engine` onto a new task on the current tokio runtime
    pub fn spawn(engine: BarrageEngine, settings: SchedulerSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = BarrageHandle {
            tx,
            snapshots: engine.subscribe(),
            events: engine.event_sender(),
        };

        tracing::info!(
            tick_ms = settings.tick_interval.as_secs_f64() * 1000.0,
            drain_ms = settings.drain_interval.as_secs_f64() * 1000.0,
            "Barrage engine task starting"
        );
        let task = tokio::spawn(run(engine, settings, rx));

        Self {
            handle,
            task: Some(task),
        }
    }

    /// A handle for producers and surfaces
    #[must_use]
    pub fn handle(&self) -> BarrageHandle {
        self.handle.clone()
    }

    /// Stop the task and get the engine back
    ///
    /// # Errors
    ///
    /// Returns an error if the task already ended abnormally.
    pub async fn shutdown(mut self) -> Result<BarrageEngine, ServiceError> {
        // A closed channel means the task is already on its way out
        let _ = self.handle.tx.send(EngineCommand::Shutdown);
        let task = self.task.take().ok_or(ServiceError::Closed)?;
        Ok(task.await?)
    }
}

impl Drop for BarrageService {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    mut engine: BarrageEngine,
    settings: SchedulerSettings,
    mut rx: mpsc::UnboundedReceiver<EngineCommand>,
) -> BarrageEngine {
    let mut tick = tokio::time::interval(settings.tick_interval.max(MIN_PERIOD));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut drain = tokio::time::interval(settings.drain_interval.max(MIN_PERIOD));
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                engine.tick_at(now());
            }
            _ = drain.tick() => {
                engine.drain_queue_at(now());
            }
            command = rx.recv() => match command {
                Some(EngineCommand::Shutdown) | None => break,
                Some(command) => apply(&mut engine, command),
            }
        }
    }

    tracing::info!(frame = engine.frame(), "Barrage engine task stopped");
    engine
}

fn apply(engine: &mut BarrageEngine, command: EngineCommand) {
    match command {
        EngineCommand::Add { request, reply } => {
            let admission = engine.add_barrage_at(request, now());
            if let Some(reply) = reply {
                let _ = reply.send(admission);
            }
        }
        EngineCommand::AddSegmented { request } => {
            engine.add_segmented_at(&request, now());
        }
        EngineCommand::Stream { partial } => {
            engine.process_streaming_response_at(&partial, now());
        }
        EngineCommand::Clear => engine.clear_all_barrages(),
        EngineCommand::SetPaused(paused) => engine.set_paused(paused),
        EngineCommand::Resize(screen) => engine.update_screen_size(screen),
        EngineCommand::SetConfig { config, reply } => {
            let _ = reply.send(engine.set_config(config));
        }
        EngineCommand::GetConfig { reply } => {
            let _ = reply.send(engine.config().clone());
        }
        EngineCommand::Shutdown => {}
    }
}
