//! Render snapshots
//!
//! The engine publishes a [`FrameSnapshot`] after every mutation. Surfaces
//! never touch live items; they draw whatever the latest snapshot says.

use serde::{Deserialize, Serialize};

use crate::item::{BarrageId, BarrageItem, BarrageKind, BarrageState, ScreenSize};
use crate::style::{AnimationEffect, Offset, Rgba};

/// Peak scale deviation of the pulse effect
pub const PULSE_SCALE: f32 = 0.1;

/// Vertical amplitude of the wave effect (points)
pub const WAVE_AMPLITUDE: f32 = 5.0;

/// Everything a surface needs to draw one barrage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawableBarrage {
    /// Barrage ID
    pub id: BarrageId,
    /// Display text
    pub text: String,
    /// Kind
    pub kind: BarrageKind,
    /// Draw x, effect offsets applied
    pub x: f32,
    /// Draw y, effect offsets applied
    pub y: f32,
    /// Final alpha: fade opacity times the style's base opacity
    pub alpha: f32,
    /// Scale factor (pulse)
    pub scale: f32,
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
    /// Active effect
    pub effect: AnimationEffect,
    /// Lifecycle state
    pub state: BarrageState,
}

impl DrawableBarrage {
    /// Project a live item into draw coordinates
    #[must_use]
    pub fn from_item(item: &BarrageItem) -> Self {
        let style = item.style();
        let phase = item.phase();
        let position = item.position();

        let (mut x, mut y, mut scale) = (position.x, position.y, 1.0);
        match style.effect {
            AnimationEffect::None => {}
            AnimationEffect::Pulse => scale += PULSE_SCALE * phase.pulse.sin(),
            AnimationEffect::Wave => y += WAVE_AMPLITUDE * phase.wave.sin(),
            AnimationEffect::Shake => {
                x += phase.shake.x;
                y += phase.shake.y;
            }
        }

        Self {
            id: item.id(),
            text: item.text().to_string(),
            kind: item.kind(),
            x,
            y,
            alpha: (item.opacity() * style.base_opacity).clamp(0.0, 1.0),
            scale,
            font_size: style.font_size,
            color: style.color,
            shadow_radius: style.shadow_radius,
            shadow_color: style.shadow_color,
            shadow_offset: style.shadow_offset,
            effect: style.effect,
            state: item.state(),
        }
    }
}

/// Read-only view of the engine after a mutation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Ticks processed so far
    pub frame: u64,
    /// Screen the positions refer to
    pub screen: ScreenSize,
    /// Whether ticking is paused
    pub paused: bool,
    /// Requests waiting for admission
    pub pending: usize,
    /// Live barrages in admission order
    pub items: Vec<DrawableBarrage>,
}

impl FrameSnapshot {
    /// Number of live barrages
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is on screen
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a drawable by ID
    #[must_use]
    pub fn get(&self, id: BarrageId) -> Option<&DrawableBarrage> {
        self.items.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BarrageConfig;
    use crate::item::BarrageFactory;
    use crate::style::StylePreset;
    use std::time::Instant;

    #[test]
    fn test_alpha_includes_base_opacity() {
        let mut factory = BarrageFactory::seeded(1);
        let item = factory.create(
            "status",
            ScreenSize::default(),
            &BarrageConfig::default(),
            BarrageKind::System,
            Instant::now(),
        );
        let drawable = DrawableBarrage::from_item(&item);
        assert!((drawable.alpha - 0.7).abs() < 1e-6);
        assert!((drawable.scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_effects_at_rest_do_not_offset() {
        let mut factory = BarrageFactory::seeded(2);
        let config = BarrageConfig::default().with_default_style(StylePreset::Colorful);
        let item = factory.create("wave", ScreenSize::default(), &config, BarrageKind::Normal, Instant::now());
        let drawable = DrawableBarrage::from_item(&item);
        assert!((drawable.y - item.position().y).abs() < f32::EPSILON);
        assert_eq!(drawable.effect, AnimationEffect::Wave);
        assert_eq!(drawable.state, BarrageState::Active);
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = FrameSnapshot::default();
        assert!(snapshot.is_empty());
        assert!(snapshot.get(BarrageId::new()).is_none());
    }
}
