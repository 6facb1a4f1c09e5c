//! Barrage Styles
//!
//! A style is resolved once, when a barrage is created, and then frozen into
//! the item. Later configuration changes never restyle live barrages.
//!
//! Resolution depends only on the barrage [`BarrageKind`] and the current
//! [`BarrageConfig`]:
//!
//! | Kind | Style |
//! |------|-------|
//! | Normal | random hue/size when `use_random_style`, else the configured preset |
//! | Error | fixed red, shaking |
//! | System | fixed gray, low emphasis |
//! | Highlight | fixed yellow, pulsing |

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BarrageConfig;
use crate::item::BarrageKind;

/// Font size range for randomly styled barrages (points, inclusive)
pub const RANDOM_FONT_SIZE_RANGE: (f32, f32) = (18.0, 28.0);

/// Saturation used for random hues
const RANDOM_SATURATION: f32 = 0.8;

/// Brightness used for random hues
const RANDOM_BRIGHTNESS: f32 = 0.9;

/// RGBA color with components in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

impl Rgba {
    /// Opaque color
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Color with explicit alpha
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Convert hue/saturation/brightness (all in [0, 1]) to RGB
    #[must_use]
    pub fn from_hsb(hue: f32, saturation: f32, brightness: f32) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let s = saturation.clamp(0.0, 1.0);
        let v = brightness.clamp(0.0, 1.0);

        let sector = h.floor();
        let f = h - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match sector as u8 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self::rgb(r, g, b)
    }

    /// `#RRGGBB` hex form (alpha dropped)
    #[must_use]
    pub fn to_hex(self) -> String {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02X}{:02X}{:02X}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }

    /// Opaque white
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
}

/// 2D offset in points
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal
    pub x: f32,
    /// Vertical
    pub y: f32,
}

impl Offset {
    /// Create an offset
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Per-frame animation applied on top of movement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationEffect {
    /// Static text
    #[default]
    None,
    /// Breathing scale
    Pulse,
    /// Vertical sine wave
    Wave,
    /// Random jitter, resampled every tick
    Shake,
}

/// Named style presets for normal barrages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreset {
    /// White text with a soft drop shadow
    #[default]
    Simple,
    /// Pink text on a wave
    Colorful,
    /// Glowing cyan, pulsing
    Neon,
    /// Muted gold, slightly translucent
    Elegant,
    /// Large orange text that shakes
    Bold,
}

impl StylePreset {
    /// Every preset, in display order
    pub const ALL: [StylePreset; 5] = [
        Self::Simple,
        Self::Colorful,
        Self::Neon,
        Self::Elegant,
        Self::Bold,
    ];

    /// The constant style for this preset
    #[must_use]
    pub fn style(self) -> BarrageStyle {
        match self {
            Self::Simple => BarrageStyle {
                font_size: 20.0,
                color: Rgba::WHITE,
                shadow_radius: 2.0,
                shadow_color: Rgba::rgba(0.0, 0.0, 0.0, 0.6),
                shadow_offset: Offset::new(1.0, 1.0),
                base_opacity: 1.0,
                effect: AnimationEffect::None,
            },
            Self::Colorful => BarrageStyle {
                font_size: 22.0,
                color: Rgba::rgb(1.0, 0.4, 0.7),
                shadow_radius: 3.0,
                shadow_color: Rgba::rgba(0.3, 0.0, 0.3, 0.5),
                shadow_offset: Offset::new(1.0, 1.0),
                base_opacity: 1.0,
                effect: AnimationEffect::Wave,
            },
            Self::Neon => BarrageStyle {
                font_size: 24.0,
                color: Rgba::rgb(0.0, 1.0, 1.0),
                shadow_radius: 8.0,
                shadow_color: Rgba::rgba(0.0, 1.0, 1.0, 0.8),
                shadow_offset: Offset::new(0.0, 0.0),
                base_opacity: 1.0,
                effect: AnimationEffect::Pulse,
            },
            Self::Elegant => BarrageStyle {
                font_size: 20.0,
                color: Rgba::rgb(0.95, 0.9, 0.75),
                shadow_radius: 1.0,
                shadow_color: Rgba::rgba(0.0, 0.0, 0.0, 0.4),
                shadow_offset: Offset::new(0.5, 0.5),
                base_opacity: 0.9,
                effect: AnimationEffect::None,
            },
            Self::Bold => BarrageStyle {
                font_size: 28.0,
                color: Rgba::rgb(1.0, 0.6, 0.0),
                shadow_radius: 4.0,
                shadow_color: Rgba::BLACK,
                shadow_offset: Offset::new(2.0, 2.0),
                base_opacity: 1.0,
                effect: AnimationEffect::Shake,
            },
        }
    }
}

impl std::fmt::Display for StylePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Colorful => write!(f, "colorful"),
            Self::Neon => write!(f, "neon"),
            Self::Elegant => write!(f, "elegant"),
            Self::Bold => write!(f, "bold"),
        }
    }
}

/// Frozen rendering style of one barrage
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarrageStyle {
    /// Font size in points
    pub font_size: f32,
    /// Text color
    pub color: Rgba,
    /// Shadow blur radius
    pub shadow_radius: f32,
    /// Shadow color
    pub shadow_color: Rgba,
    /// Shadow offset
    pub shadow_offset: Offset,
    /// Opacity multiplier applied on top of the item's fade
    pub base_opacity: f32,
    /// Per-frame animation effect
    pub effect: AnimationEffect,
}

impl Default for BarrageStyle {
    fn default() -> Self {
        StylePreset::Simple.style()
    }
}

impl BarrageStyle {
    /// Style for error barrages
    #[must_use]
    pub fn error() -> Self {
        Self {
            font_size: 22.0,
            color: Rgba::rgb(1.0, 0.25, 0.25),
            shadow_radius: 3.0,
            shadow_color: Rgba::rgba(0.3, 0.0, 0.0, 0.7),
            shadow_offset: Offset::new(1.0, 1.0),
            base_opacity: 1.0,
            effect: AnimationEffect::Shake,
        }
    }

    /// Style for system notices
    #[must_use]
    pub fn system() -> Self {
        Self {
            font_size: 16.0,
            color: Rgba::rgb(0.7, 0.7, 0.7),
            shadow_radius: 1.0,
            shadow_color: Rgba::rgba(0.0, 0.0, 0.0, 0.3),
            shadow_offset: Offset::new(0.5, 0.5),
            base_opacity: 0.7,
            effect: AnimationEffect::None,
        }
    }

    /// Style for highlighted barrages
    #[must_use]
    pub fn highlight() -> Self {
        Self {
            font_size: 26.0,
            color: Rgba::rgb(1.0, 0.9, 0.0),
            shadow_radius: 6.0,
            shadow_color: Rgba::rgba(1.0, 0.6, 0.0, 0.7),
            shadow_offset: Offset::new(0.0, 0.0),
            base_opacity: 1.0,
            effect: AnimationEffect::Pulse,
        }
    }

    /// Random hue and size, everything else fixed
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let hue: f32 = rng.gen_range(0.0..1.0);
        let (min_size, max_size) = RANDOM_FONT_SIZE_RANGE;
        Self {
            font_size: rng.gen_range(min_size..=max_size),
            color: Rgba::from_hsb(hue, RANDOM_SATURATION, RANDOM_BRIGHTNESS),
            shadow_radius: 2.0,
            shadow_color: Rgba::rgba(0.0, 0.0, 0.0, 0.6),
            shadow_offset: Offset::new(1.0, 1.0),
            base_opacity: 1.0,
            effect: AnimationEffect::None,
        }
    }
}

/// Resolve the style for a new barrage
pub fn resolve_style<R: Rng + ?Sized>(
    kind: BarrageKind,
    config: &BarrageConfig,
    rng: &mut R,
) -> BarrageStyle {
    match kind {
        BarrageKind::Normal if config.use_random_style => BarrageStyle::random(rng),
        BarrageKind::Normal => config.default_style.style(),
        BarrageKind::Error => BarrageStyle::error(),
        BarrageKind::System => BarrageStyle::system(),
        BarrageKind::Highlight => BarrageStyle::highlight(),
    }
}
