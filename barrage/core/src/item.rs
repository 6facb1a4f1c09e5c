//! Barrage Items
//!
//! A [`BarrageItem`] is one display unit on its way across the screen. The
//! [`BarrageFactory`] builds items from segmented text: it resolves the
//! direction, the spawn position and the frozen style, and stamps the
//! creation time.
//!
//! ```text
//!   x = -200                                     x = width + 200
//!      |   LeftToRight  ---->                          |
//!      |                          <----  RightToLeft   |
//!      +------------------[ visible screen ]-----------+
//! ```
//!
//! Items are only mutated by the engine tick; the accessors here are read-only.

use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{BarrageConfig, DirectionPolicy};
use crate::style::{resolve_style, AnimationEffect, BarrageStyle, Offset};

/// Horizontal distance off-screen where new barrages spawn
pub const SPAWN_MARGIN: f32 = 200.0;

/// Smallest spawn y coordinate
pub const TOP_MARGIN: f32 = 50.0;

/// Space kept free below the lowest spawn y coordinate
pub const BOTTOM_MARGIN: f32 = 100.0;

/// Pulse phase step per tick (radians)
pub const PULSE_STEP: f32 = 0.05;

/// Wave phase step per tick (radians)
pub const WAVE_STEP: f32 = 0.1;

/// Shake jitter bound per axis (points)
pub const SHAKE_AMPLITUDE: f32 = 2.0;

// =============================================================================
// Identifiers and Kinds
// =============================================================================

/// Unique barrage identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BarrageId(pub Uuid);

impl BarrageId {
    /// Generate a new random ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BarrageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BarrageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a barrage represents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrageKind {
    /// Regular AI encouragement
    #[default]
    Normal,
    /// Something went wrong
    Error,
    /// Status notice from the host
    System,
    /// Emphasised message
    Highlight,
}

impl BarrageKind {
    /// Whether barrages of this kind go to the narration queue when spoken
    #[must_use]
    pub fn is_narratable(self) -> bool {
        matches!(self, Self::Normal | Self::Highlight)
    }
}

impl fmt::Display for BarrageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Error => write!(f, "error"),
            Self::System => write!(f, "system"),
            Self::Highlight => write!(f, "highlight"),
        }
    }
}

impl FromStr for BarrageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "error" => Ok(Self::Error),
            "system" => Ok(Self::System),
            "highlight" => Ok(Self::Highlight),
            other => Err(format!("unknown barrage kind: {other}")),
        }
    }
}

/// Resolved travel direction of one barrage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Moving right
    LeftToRight,
    /// Moving left
    RightToLeft,
}

impl Direction {
    /// Sign of the x velocity
    #[must_use]
    pub fn sign(self) -> f32 {
        match self {
            Self::LeftToRight => 1.0,
            Self::RightToLeft => -1.0,
        }
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Screen position in points
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal
    pub x: f32,
    /// Vertical
    pub y: f32,
}

impl Point {
    /// Create a point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Size of the drawable area in points
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl ScreenSize {
    /// Create a screen size
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Parse `WIDTHxHEIGHT`, e.g. `1920x1080`
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse::<f32>().ok()?;
        let height = h.trim().parse::<f32>().ok()?;
        (width.is_finite() && height.is_finite()).then_some(Self::new(width, height))
    }
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// =============================================================================
// Animation State
// =============================================================================

/// Per-effect phase accumulator, advanced every tick
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnimationPhase {
    /// Pulse angle in `[0, 2π)`
    pub pulse: f32,
    /// Wave angle in `[0, 2π)`
    pub wave: f32,
    /// Current shake jitter
    pub shake: Offset,
}

impl AnimationPhase {
    /// Advance the phase for `effect`
    pub(crate) fn advance<R: Rng + ?Sized>(&mut self, effect: AnimationEffect, rng: &mut R) {
        match effect {
            AnimationEffect::None => {}
            AnimationEffect::Pulse => self.pulse = (self.pulse + PULSE_STEP) % TAU,
            AnimationEffect::Wave => self.wave = (self.wave + WAVE_STEP) % TAU,
            AnimationEffect::Shake => {
                self.shake = Offset::new(
                    rng.gen_range(-SHAKE_AMPLITUDE..=SHAKE_AMPLITUDE),
                    rng.gen_range(-SHAKE_AMPLITUDE..=SHAKE_AMPLITUDE),
                );
            }
        }
    }
}

/// Lifecycle state of a barrage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrageState {
    /// Moving at full opacity
    Active,
    /// A decay trigger fired; opacity is dropping
    Fading,
    /// Opacity reached zero; about to leave the live set
    Removed,
}

// =============================================================================
// Barrage Item
// =============================================================================

/// One live barrage
#[derive(Clone, Debug)]
pub struct BarrageItem {
    pub(crate) id: BarrageId,
    pub(crate) text: String,
    pub(crate) kind: BarrageKind,
    pub(crate) position: Point,
    pub(crate) opacity: f32,
    pub(crate) direction: Direction,
    pub(crate) style: BarrageStyle,
    pub(crate) created_at: Instant,
    pub(crate) lifetime: Duration,
    pub(crate) phase: AnimationPhase,
    pub(crate) fading: bool,
}

impl BarrageItem {
    /// Unique ID
    #[must_use]
    pub fn id(&self) -> BarrageId {
        self.id
    }

    /// Display text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Kind
    #[must_use]
    pub fn kind(&self) -> BarrageKind {
        self.kind
    }

    /// Current position
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Current fade opacity in `[0, 1]`
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Travel direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Style frozen at creation
    #[must_use]
    pub fn style(&self) -> &BarrageStyle {
        &self.style
    }

    /// Creation instant
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time before the lifetime decay trigger fires
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Animation phase
    #[must_use]
    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> BarrageState {
        if self.opacity <= 0.0 {
            BarrageState::Removed
        } else if self.fading {
            BarrageState::Fading
        } else {
            BarrageState::Active
        }
    }

    /// Whether the item has outlived its lifetime at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.lifetime
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds barrage items with a seedable RNG
#[derive(Debug)]
pub struct BarrageFactory {
    rng: StdRng,
}

impl Default for BarrageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrageFactory {
    /// Factory seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic factory for tests and replays
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Shared RNG, also used for per-tick shake jitter
    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Build a new item positioned off-screen
    pub fn create(
        &mut self,
        text: impl Into<String>,
        screen: ScreenSize,
        config: &BarrageConfig,
        kind: BarrageKind,
        now: Instant,
    ) -> BarrageItem {
        let direction = match config.direction {
            DirectionPolicy::LeftToRight => Direction::LeftToRight,
            DirectionPolicy::RightToLeft => Direction::RightToLeft,
            DirectionPolicy::Bidirectional => {
                if self.rng.gen_bool(0.5) {
                    Direction::LeftToRight
                } else {
                    Direction::RightToLeft
                }
            }
        };

        let x = match direction {
            Direction::LeftToRight => -SPAWN_MARGIN,
            Direction::RightToLeft => screen.width + SPAWN_MARGIN,
        };

        let lowest = screen.height - BOTTOM_MARGIN;
        let y = if lowest > TOP_MARGIN {
            self.rng.gen_range(TOP_MARGIN..=lowest)
        } else {
            TOP_MARGIN
        };

        let style = resolve_style(kind, config, &mut self.rng);

        BarrageItem {
            id: BarrageId::new(),
            text: text.into(),
            kind,
            position: Point::new(x, y),
            opacity: 1.0,
            direction,
            style,
            created_at: now,
            lifetime: config.lifetime(),
            phase: AnimationPhase::default(),
            fading: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StylePreset;
    use pretty_assertions::assert_eq;

    const SCREEN: ScreenSize = ScreenSize::new(1920.0, 1080.0);

    #[test]
    fn test_spawn_position_right_to_left() {
        let mut factory = BarrageFactory::seeded(1);
        let item = factory.create(
            "hi",
            SCREEN,
            &BarrageConfig::default(),
            BarrageKind::Normal,
            Instant::now(),
        );

        assert_eq!(item.direction(), Direction::RightToLeft);
        assert!((item.position().x - 2120.0).abs() < f32::EPSILON);
        assert!((50.0..=980.0).contains(&item.position().y));
        assert!((item.opacity() - 1.0).abs() < f32::EPSILON);
        assert_eq!(item.state(), BarrageState::Active);
        assert_eq!(item.lifetime(), Duration::from_secs(10));
    }

    #[test]
    fn test_spawn_position_left_to_right() {
        let mut factory = BarrageFactory::seeded(2);
        let config = BarrageConfig::default().with_direction(DirectionPolicy::LeftToRight);
        let item = factory.create("hi", SCREEN, &config, BarrageKind::Normal, Instant::now());

        assert_eq!(item.direction(), Direction::LeftToRight);
        assert!((item.position().x + 200.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_short_screen_collapses_y() {
        let mut factory = BarrageFactory::seeded(3);
        for height in [0.0, 100.0, 150.0] {
            let item = factory.create(
                "hi",
                ScreenSize::new(800.0, height),
                &BarrageConfig::default(),
                BarrageKind::Normal,
                Instant::now(),
            );
            assert!((item.position().y - 50.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_bidirectional_yields_both_directions() {
        let mut factory = BarrageFactory::seeded(42);
        let config = BarrageConfig::default().with_direction(DirectionPolicy::Bidirectional);
        let now = Instant::now();

        let (mut ltr, mut rtl) = (0, 0);
        for _ in 0..1000 {
            match factory
                .create("x", SCREEN, &config, BarrageKind::Normal, now)
                .direction()
            {
                Direction::LeftToRight => ltr += 1,
                Direction::RightToLeft => rtl += 1,
            }
        }
        assert!(ltr > 0 && rtl > 0, "ltr={ltr} rtl={rtl}");
    }

    #[test]
    fn test_style_resolved_at_creation() {
        let mut factory = BarrageFactory::seeded(4);
        let config = BarrageConfig::default().with_default_style(StylePreset::Neon);
        let now = Instant::now();

        let normal = factory.create("a", SCREEN, &config, BarrageKind::Normal, now);
        assert_eq!(*normal.style(), StylePreset::Neon.style());

        let error = factory.create("b", SCREEN, &config, BarrageKind::Error, now);
        assert_eq!(*error.style(), BarrageStyle::error());
    }

    #[test]
    fn test_expiry_is_strictly_after_lifetime() {
        let mut factory = BarrageFactory::seeded(5);
        let now = Instant::now();
        let config = BarrageConfig::default().with_lifetime_secs(1.0);
        let item = factory.create("a", SCREEN, &config, BarrageKind::Normal, now);

        assert!(!item.is_expired_at(now + Duration::from_secs(1)));
        assert!(item.is_expired_at(now + Duration::from_millis(1001)));
    }

    #[test]
    fn test_phase_wraps_at_tau() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut phase = AnimationPhase::default();
        for _ in 0..200 {
            phase.advance(AnimationEffect::Pulse, &mut rng);
            phase.advance(AnimationEffect::Wave, &mut rng);
            assert!((0.0..TAU).contains(&phase.pulse));
            assert!((0.0..TAU).contains(&phase.wave));
        }
    }

    #[test]
    fn test_shake_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut phase = AnimationPhase::default();
        for _ in 0..200 {
            phase.advance(AnimationEffect::Shake, &mut rng);
            assert!(phase.shake.x.abs() <= SHAKE_AMPLITUDE);
            assert!(phase.shake.y.abs() <= SHAKE_AMPLITUDE);
        }
        assert!(phase.pulse.abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_screen_and_kind() {
        assert_eq!(ScreenSize::parse("1280x720"), Some(ScreenSize::new(1280.0, 720.0)));
        assert_eq!(ScreenSize::parse(" 800 X 600 "), Some(ScreenSize::new(800.0, 600.0)));
        assert_eq!(ScreenSize::parse("wide"), None);
        assert_eq!("Highlight".parse::<BarrageKind>(), Ok(BarrageKind::Highlight));
        assert!("loud".parse::<BarrageKind>().is_err());
    }

    #[test]
    fn test_narratable_kinds() {
        assert!(BarrageKind::Normal.is_narratable());
        assert!(BarrageKind::Highlight.is_narratable());
        assert!(!BarrageKind::Error.is_narratable());
        assert!(!BarrageKind::System.is_narratable());
    }
}
