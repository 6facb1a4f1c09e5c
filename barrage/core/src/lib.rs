//! Barrage Core - Headless Barrage Animation and Delivery Engine
//!
//! This crate turns AI-generated text into animated on-screen "barrages":
//! short messages that drift across the screen, fade out, and optionally get
//! read aloud. It is independent of any UI framework; a surface only needs to
//! draw the [`FrameSnapshot`]s the engine publishes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  AI backend (Ollama...)        host input (chat, system text)    │
//! └──────────────┬──────────────────────────────┬────────────────────┘
//!                │ tokens (pump_stream)         │ BarrageHandle
//! ┌──────────────┴──────────────────────────────┴────────────────────┐
//! │                        BARRAGE CORE                              │
//! │  Segmenter ─► Admission ─► Factory ─► Engine (tick 30 Hz)        │
//! │               (density)    (style)      │                        │
//! │                  │                      ├─► watch<FrameSnapshot> │
//! │            PendingQueue ◄── drain 100ms └─► broadcast<Event>     │
//! │                                                                  │
//! │  NarrationQueue ◄── spoken admissions        ConfigStore (JSON)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`BarrageEngine`]: live set, admission, tick and drain
//! - [`BarrageService`] / [`BarrageHandle`]: the engine on its own task
//! - [`NarrationQueue`] / [`NarrationHandle`]: paced text-to-speech
//! - [`BarrageConfig`] / [`ConfigStore`]: persisted tuning
//! - [`EngineSettings`]: host-level settings from TOML and environment
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use barrage_core::{
//!     BarrageEngine, BarrageRequest, BarrageService, JsonFileStore, ScreenSize,
//!     SchedulerSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(JsonFileStore::at_default_path());
//!     let engine = BarrageEngine::new(store, ScreenSize::new(1920.0, 1080.0));
//!     let service = BarrageService::spawn(engine, SchedulerSettings::default());
//!
//!     let handle = service.handle();
//!     handle.add_multiple_barrages("Nice! Keep going.", Default::default()).unwrap();
//!
//!     let mut frames = handle.subscribe();
//!     while frames.changed().await.is_ok() {
//!         let frame = frames.borrow().clone();
//!         // draw frame.items
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod backend;
pub mod config;
pub mod engine;
pub mod frame;
pub mod item;
pub mod narration;
pub mod segmenter;
pub mod service;
pub mod style;

pub use admission::{Admission, AdmissionLimiter, PendingQueue, QueuedBarrage};
pub use backend::{pump_stream, AiBackend, AiRequest, AiResponse, OllamaBackend, StreamMode, StreamingToken};
pub use config::{
    load_settings, load_settings_from_path, BarrageConfig, ConfigError, ConfigStore,
    DirectionPolicy, EngineSettings, JsonFileStore, MemoryStore, SettingsOverrides, SettingsSource,
};
pub use engine::{BarrageEngine, BarrageRequest, EngineEvent};
pub use frame::{DrawableBarrage, FrameSnapshot};
pub use item::{
    BarrageFactory, BarrageId, BarrageItem, BarrageKind, BarrageState, Direction, Point, ScreenSize,
};
pub use narration::{
    CommandSynthesizer, NarrationError, NarrationHandle, NarrationOutcome, NarrationQueue,
    NarrationSettings, NarrationTicket, SilentSynthesizer, SpeechSynthesizer,
};
pub use segmenter::{segment, StreamSegmenter};
pub use service::{BarrageHandle, BarrageService, SchedulerSettings, ServiceError};
pub use style::{AnimationEffect, BarrageStyle, Rgba, StylePreset};
