//! Persisted barrage tuning
//!
//! [`BarrageConfig`] is the blob the settings UI edits and the
//! [`ConfigStore`](super::ConfigStore) persists. Every field has a default and
//! fields are decoded one at a time, so a blob written by an older build
//! (missing fields) or a newer one (extra fields) still loads. A field that is
//! `null` or of the wrong type falls back to its own default without taking
//! the rest of the blob down with it. JSON has no encoding for non-finite
//! numbers, so those are written as `null` and come back as the default.
//!
//! Values are not validated on load. Out-of-range numbers are clamped where
//! they are used, through the `effective_*` accessors.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::style::StylePreset;

/// Lowest admission rate the limiter will honour (items per second)
pub const MIN_DENSITY: f64 = 0.1;

/// Upper bound on a barrage lifetime
pub const MAX_LIFETIME_SECS: f64 = 3600.0;

/// Upper bound on the speed multiplier
pub const MAX_SPEED: f64 = 20.0;

/// Travel direction policy for new barrages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionPolicy {
    /// Enter from the left edge, move right
    LeftToRight,
    /// Enter from the right edge, move left
    #[default]
    RightToLeft,
    /// Fair coin per barrage
    Bidirectional,
}

/// Tunable barrage behaviour
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct BarrageConfig {
    /// Speed multiplier (1.0 = two points per tick)
    pub speed: f64,

    /// Direction policy
    pub direction: DirectionPolicy,

    /// Fraction of the screen width a barrage crosses before it starts fading
    pub travel_range: f64,

    /// Maximum sustained admission rate (items per second)
    pub density: f64,

    /// Seconds a barrage lives before it starts fading
    pub lifetime_secs: f64,

    /// Preset used for normal barrages when random styling is off
    pub default_style: StylePreset,

    /// Random hue and size for normal barrages
    pub use_random_style: bool,

    /// Advance pulse/wave/shake effects each tick
    pub enable_animations: bool,
}

impl Default for BarrageConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            direction: DirectionPolicy::RightToLeft,
            travel_range: 1.0,
            density: 2.0,
            lifetime_secs: 10.0,
            default_style: StylePreset::Simple,
            use_random_style: false,
            enable_animations: true,
        }
    }
}

/// Wire shape of [`BarrageConfig`] before per-field decoding
#[derive(Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    speed: Option<Value>,
    direction: Option<Value>,
    travel_range: Option<Value>,
    density: Option<Value>,
    lifetime_secs: Option<Value>,
    default_style: Option<Value>,
    use_random_style: Option<Value>,
    enable_animations: Option<Value>,
}

/// Decode one field, keeping `fallback` when it is absent, `null` or malformed
fn field<T: DeserializeOwned>(name: &str, raw: Option<Value>, fallback: T) -> T {
    let Some(value) = raw else {
        return fallback;
    };
    match serde_json::from_value(value) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(field = name, error = %e, "Barrage config field reset to default");
            fallback
        }
    }
}

impl From<RawConfig> for BarrageConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            speed: field("speed", raw.speed, defaults.speed),
            direction: field("direction", raw.direction, defaults.direction),
            travel_range: field("travel_range", raw.travel_range, defaults.travel_range),
            density: field("density", raw.density, defaults.density),
            lifetime_secs: field("lifetime_secs", raw.lifetime_secs, defaults.lifetime_secs),
            default_style: field("default_style", raw.default_style, defaults.default_style),
            use_random_style: field(
                "use_random_style",
                raw.use_random_style,
                defaults.use_random_style,
            ),
            enable_animations: field(
                "enable_animations",
                raw.enable_animations,
                defaults.enable_animations,
            ),
        }
    }
}

impl BarrageConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the speed multiplier
    #[must_use]
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the direction policy
    #[must_use]
    pub fn with_direction(mut self, direction: DirectionPolicy) -> Self {
        self.direction = direction;
        self
    }

    /// Set the travel range fraction
    #[must_use]
    pub fn with_travel_range(mut self, travel_range: f64) -> Self {
        self.travel_range = travel_range;
        self
    }

    /// Set the admission density
    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Set the lifetime in seconds
    #[must_use]
    pub fn with_lifetime_secs(mut self, lifetime_secs: f64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    /// Set the default style preset
    #[must_use]
    pub fn with_default_style(mut self, preset: StylePreset) -> Self {
        self.default_style = preset;
        self
    }

    /// Toggle random styling
    #[must_use]
    pub fn with_random_style(mut self, enabled: bool) -> Self {
        self.use_random_style = enabled;
        self
    }

    /// Toggle per-tick effects
    #[must_use]
    pub fn with_animations(mut self, enabled: bool) -> Self {
        self.enable_animations = enabled;
        self
    }

    /// Speed clamped to `[0, MAX_SPEED]`; non-finite falls back to 1.0
    #[must_use]
    pub fn effective_speed(&self) -> f64 {
        if self.speed.is_finite() {
            self.speed.clamp(0.0, MAX_SPEED)
        } else {
            1.0
        }
    }

    /// Density with the `MIN_DENSITY` floor applied
    #[must_use]
    pub fn effective_density(&self) -> f64 {
        if self.density.is_nan() {
            MIN_DENSITY
        } else {
            self.density.max(MIN_DENSITY)
        }
    }

    /// Minimum spacing between two rate-limited admissions
    #[must_use]
    pub fn min_admission_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.effective_density())
    }

    /// Travel range clamped to `[0, 1]`; non-finite falls back to 1.0
    #[must_use]
    pub fn effective_travel_range(&self) -> f64 {
        if self.travel_range.is_finite() {
            self.travel_range.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Lifetime clamped to `[0, MAX_LIFETIME_SECS]`
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        let secs = if self.lifetime_secs.is_finite() {
            self.lifetime_secs.clamp(0.0, MAX_LIFETIME_SECS)
        } else {
            Self::default().lifetime_secs
        };
        Duration::from_secs_f64(secs)
    }
}
