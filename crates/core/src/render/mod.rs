use serde::{Deserialize, Serialize};

use crate::{
    analysis::{FrameFeatures, RhythmMode},
    effects::{Effect, EffectLayer, EffectMode},
    Result,
};

/// Overlay text in the middle of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentreText {
    pub opacity: f32,
    pub scale: f32,
}

/// Everything a renderer needs to paint one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCommand {
    pub frame: u64,
    /// Monotonic frame time in milliseconds.
    pub time_ms: f64,
    pub features: FrameFeatures,
    pub gain: f32,
    pub rhythm: RhythmMode,
    pub mode: EffectMode,
    pub effect: Effect,
    /// False while running on demo features.
    pub live: bool,
    /// Alpha of the black fill laid over the previous frame, so trails fade
    /// faster when it is dark.
    pub backdrop_alpha: f32,
    pub centre_text: CentreText,
    pub layer: EffectLayer,
}

/// Paints frames. Implementations own every pixel operation and can be
/// swapped without touching the core.
pub trait Renderer {
    fn present(&mut self, frame: &RenderCommand) -> Result<()>;

    /// Surface size in pixels, if the renderer knows it.
    fn surface_size(&self) -> Option<(f32, f32)> {
        None
    }
}

/// Fade alpha for the frame backdrop.
pub fn backdrop_alpha(brightness: f32) -> f32 {
    0.15 + (1.0 - brightness.clamp(0.0, 1.0)) * 0.2
}

/// Centre overlay: brighter with loudness, nudged by bass when live and
/// breathing slowly on demo input.
pub fn centre_text(features: &FrameFeatures, live: bool, synced_ms: f64) -> CentreText {
    let scale = if live {
        1.0 + features.bass * 0.001
    } else {
        1.0 + (synced_ms as f32 * 0.003).sin() * 0.1
    };
    CentreText {
        opacity: 0.5 + features.brightness.clamp(0.0, 1.0) * 0.5,
        scale,
    }
}
