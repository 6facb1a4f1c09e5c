//! Configuration
//!
//! Two layers live here:
//!
//! - [`BarrageConfig`]: the user-tunable barrage behaviour (speed, density,
//!   style...). Persisted through a [`ConfigStore`] and edited at runtime.
//! - [`EngineSettings`]: host-level knobs (tick rate, drain cadence, narration
//!   pacing, store location) loaded once at startup from
//!   `~/.config/barrage/engine.toml`.
//!
//! # Settings Priority
//!
//! Engine settings are loaded with the following priority (highest first):
//! 1. CLI arguments ([`SettingsOverrides`])
//! 2. Environment variables
//! 3. TOML settings file
//! 4. Default values
//!
//! # Example Settings File
//!
//! ```toml
//! [scheduler]
//! tick_rate_hz = 30
//! drain_interval_ms = 100
//! max_pending = 1000
//!
//! [narration]
//! enabled = true
//! fallback_ms = 2000
//! cooldown_ms = 500
//!
//! [store]
//! path = "/home/me/.config/barrage/barrage_config.json"
//!
//! [screen]
//! width = 2560
//! height = 1440
//! ```

mod barrage;
mod store;

pub use barrage::{BarrageConfig, DirectionPolicy, MAX_LIFETIME_SECS, MAX_SPEED, MIN_DENSITY};
pub use store::{default_store_path, ConfigStore, JsonFileStore, MemoryStore, CONFIG_FILE_NAME};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::ScreenSize;
use crate::narration::NarrationSettings;
use crate::service::SchedulerSettings;

/// Highest tick rate accepted from settings
pub const MAX_TICK_RATE_HZ: u32 = 240;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading settings or persisting configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("Failed to write config file at {path}: {source}")]
    WriteError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML settings: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to encode or decode JSON
    #[error("Failed to encode barrage config: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Settings Source Tracking
// =============================================================================

/// Tracks where the settings came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML settings file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "settings file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Structures
// =============================================================================

/// `[scheduler]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    /// Animation ticks per second
    pub tick_rate_hz: Option<u32>,

    /// Pending-queue drain cadence in milliseconds
    pub drain_interval_ms: Option<u64>,

    /// Maximum number of queued barrages
    pub max_pending: Option<usize>,
}

/// `[narration]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationToml {
    /// Whether spoken narration is enabled
    pub enabled: Option<bool>,

    /// Pacing delay for entries that are not spoken, in milliseconds
    pub fallback_ms: Option<u64>,

    /// Pause between two entries, in milliseconds
    pub cooldown_ms: Option<u64>,
}

/// `[store]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// Location of the persisted barrage config
    pub path: Option<PathBuf>,
}

/// `[screen]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenToml {
    /// Initial screen width in points
    pub width: Option<f32>,

    /// Initial screen height in points
    pub height: Option<f32>,
}

/// Top-level TOML settings structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineToml {
    /// Scheduler section
    pub scheduler: SchedulerToml,

    /// Narration section
    pub narration: NarrationToml,

    /// Store section
    pub store: StoreToml,

    /// Screen section
    pub screen: ScreenToml,
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Host-level engine settings
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Animation ticks per second
    pub tick_rate_hz: u32,

    /// Pending-queue drain cadence
    pub drain_interval: Duration,

    /// Maximum number of queued barrages
    pub max_pending: usize,

    /// Whether spoken narration is enabled
    pub narration_enabled: bool,

    /// Pacing delay for entries that are not spoken
    pub narration_fallback: Duration,

    /// Pause between two narration entries
    pub narration_cooldown: Duration,

    /// Location of the persisted barrage config (`None` = default path)
    pub store_path: Option<PathBuf>,

    /// Initial screen geometry
    pub screen: ScreenSize,

    /// Path to the settings file that was loaded (if any)
    pub settings_file_path: Option<PathBuf>,

    source: SettingsSource,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            drain_interval: Duration::from_millis(100),
            max_pending: 1000,
            narration_enabled: true,
            narration_fallback: Duration::from_secs(2),
            narration_cooldown: Duration::from_millis(500),
            store_path: None,
            screen: ScreenSize::new(1920.0, 1080.0),
            settings_file_path: None,
            source: SettingsSource::Default,
        }
    }
}

impl EngineSettings {
    /// Create settings with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary source of these settings
    #[must_use]
    pub fn source(&self) -> SettingsSource {
        self.source
    }

    /// Period of one animation tick
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        let hz = self.tick_rate_hz.clamp(1, MAX_TICK_RATE_HZ);
        Duration::from_secs_f64(1.0 / f64::from(hz))
    }

    /// Resolved barrage config store path
    #[must_use]
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .or_else(default_store_path)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Scheduler timing derived from these settings
    #[must_use]
    pub fn scheduler(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick_interval: self.tick_interval(),
            drain_interval: self.drain_interval,
        }
    }

    /// Narration pacing derived from these settings
    #[must_use]
    pub fn narration(&self) -> NarrationSettings {
        NarrationSettings {
            enabled: self.narration_enabled,
            fallback: self.narration_fallback,
            cooldown: self.narration_cooldown,
        }
    }

    /// Check the settings for values the scheduler cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero tick rate, a zero
    /// drain interval or a non-positive screen size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(ConfigError::ValidationError(format!(
                "tick_rate_hz must be between 1 and {MAX_TICK_RATE_HZ}, got {}",
                self.tick_rate_hz
            )));
        }
        if self.drain_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "drain_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.screen.width > 0.0 && self.screen.height > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "screen size must be positive, got {}x{}",
                self.screen.width, self.screen.height
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Settings Loading
// =============================================================================

/// Get the default settings file path
///
/// Returns `$XDG_CONFIG_HOME/barrage/engine.toml` or
/// `~/.config/barrage/engine.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("barrage").join("engine.toml"))
}

/// Load settings from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the settings file exists but cannot be parsed, or if
/// the merged settings fail validation. A missing file is not an error.
pub fn load_settings() -> Result<EngineSettings, ConfigError> {
    load_settings_from_path(default_settings_path())
}

/// Load settings from a specific path
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the merged
/// settings fail validation.
pub fn load_settings_from_path(path: Option<PathBuf>) -> Result<EngineSettings, ConfigError> {
    let mut settings = EngineSettings::default();

    if let Some(ref settings_path) = path {
        if settings_path.exists() {
            let toml_content =
                std::fs::read_to_string(settings_path).map_err(|e| ConfigError::ReadError {
                    path: settings_path.clone(),
                    source: e,
                })?;

            let toml_settings: EngineToml = toml::from_str(&toml_content)?;
            apply_toml_settings(&mut settings, &toml_settings);
            settings.settings_file_path = Some(settings_path.clone());
            settings.source = SettingsSource::File;

            tracing::info!(
                path = %settings_path.display(),
                "Loaded engine settings from file"
            );
        } else {
            tracing::debug!(
                path = %settings_path.display(),
                "Settings file not found, using defaults"
            );
        }
    }

    apply_env_settings(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;

    Ok(settings)
}

/// Apply TOML values to the settings struct
fn apply_toml_settings(settings: &mut EngineSettings, toml: &EngineToml) {
    if let Some(hz) = toml.scheduler.tick_rate_hz {
        settings.tick_rate_hz = hz;
    }
    if let Some(ms) = toml.scheduler.drain_interval_ms {
        settings.drain_interval = Duration::from_millis(ms);
    }
    if let Some(max) = toml.scheduler.max_pending {
        settings.max_pending = max;
    }

    if let Some(enabled) = toml.narration.enabled {
        settings.narration_enabled = enabled;
    }
    if let Some(ms) = toml.narration.fallback_ms {
        settings.narration_fallback = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.narration.cooldown_ms {
        settings.narration_cooldown = Duration::from_millis(ms);
    }

    if toml.store.path.is_some() {
        settings.store_path = toml.store.path.clone();
    }

    if let Some(width) = toml.screen.width {
        settings.screen.width = width;
    }
    if let Some(height) = toml.screen.height {
        settings.screen.height = height;
    }
}

/// Apply environment overrides, reading variables through `lookup`
fn apply_env_settings<F>(settings: &mut EngineSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(hz) = lookup("BARRAGE_TICK_HZ").and_then(|v| v.parse::<u32>().ok()) {
        settings.tick_rate_hz = hz;
        settings.source = SettingsSource::Env;
    }
    if let Some(ms) = lookup("BARRAGE_DRAIN_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.drain_interval = Duration::from_millis(ms);
        settings.source = SettingsSource::Env;
    }
    if let Some(max) = lookup("BARRAGE_MAX_PENDING").and_then(|v| v.parse::<usize>().ok()) {
        settings.max_pending = max;
        settings.source = SettingsSource::Env;
    }
    if let Some(enabled) = lookup("BARRAGE_NARRATION") {
        settings.narration_enabled = enabled != "0" && enabled.to_lowercase() != "false";
        settings.source = SettingsSource::Env;
    }
    if let Some(ms) = lookup("BARRAGE_NARRATION_FALLBACK_MS").and_then(|v| v.parse::<u64>().ok())
    {
        settings.narration_fallback = Duration::from_millis(ms);
        settings.source = SettingsSource::Env;
    }
    if let Some(ms) = lookup("BARRAGE_NARRATION_COOLDOWN_MS").and_then(|v| v.parse::<u64>().ok())
    {
        settings.narration_cooldown = Duration::from_millis(ms);
        settings.source = SettingsSource::Env;
    }
    if let Some(path) = lookup("BARRAGE_STORE_PATH") {
        settings.store_path = Some(PathBuf::from(path));
        settings.source = SettingsSource::Env;
    }
    if let Some(screen) = lookup("BARRAGE_SCREEN").and_then(|v| ScreenSize::parse(&v)) {
        settings.screen = screen;
        settings.source = SettingsSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to settings
///
/// Use this after [`load_settings`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct SettingsOverrides {
    /// Tick rate override
    pub tick_rate_hz: Option<u32>,

    /// Narration enabled override
    pub narration_enabled: Option<bool>,

    /// Store path override
    pub store_path: Option<PathBuf>,

    /// Screen size override
    pub screen: Option<ScreenSize>,
}

impl SettingsOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tick rate override
    #[must_use]
    pub fn with_tick_rate_hz(mut self, hz: u32) -> Self {
        self.tick_rate_hz = Some(hz);
        self
    }

    /// Set narration override
    #[must_use]
    pub fn with_narration_enabled(mut self, enabled: bool) -> Self {
        self.narration_enabled = Some(enabled);
        self
    }

    /// Set store path override
    #[must_use]
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.store_path = Some(path);
        self
    }

    /// Set screen size override
    #[must_use]
    pub fn with_screen(mut self, screen: ScreenSize) -> Self {
        self.screen = Some(screen);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tick_rate_hz.is_none()
            && self.narration_enabled.is_none()
            && self.store_path.is_none()
            && self.screen.is_none()
    }

    /// Apply overrides to settings
    pub fn apply(&self, settings: &mut EngineSettings) {
        if !self.is_empty() {
            settings.source = SettingsSource::Cli;
        }
        if let Some(hz) = self.tick_rate_hz {
            settings.tick_rate_hz = hz;
        }
        if let Some(enabled) = self.narration_enabled {
            settings.narration_enabled = enabled;
        }
        if let Some(ref path) = self.store_path {
            settings.store_path = Some(path.clone());
        }
        if let Some(screen) = self.screen {
            settings.screen = screen;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
