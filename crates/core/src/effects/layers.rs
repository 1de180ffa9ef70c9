use serde::{Deserialize, Serialize};

use super::EffectInput;
use crate::{
    analysis::band_mean,
    config::ViewportConfig,
    particles::Particle,
};

const BAR_COUNT: usize = 12;
const BINS_PER_BAR: usize = 5;
/// Bars after this index get the treble lift.
const TREBLE_FROM: usize = 6;
const MIN_BAR_HEIGHT: f32 = 20.0;

/// What the active effect wants painted this frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectLayer {
    /// Particles as radial gradients, oldest first.
    Pulse { particles: Vec<Particle> },
    /// Bars mirrored above and below the horizontal centre line.
    Spectrum { bars: Vec<SpectrumBar> },
    Heart(HeartGlyph),
}

/// One bar of the spectrum effect. The bar is painted from `centre_y` up and
/// down by `height`, with a linear gradient from `base_alpha` at the centre
/// line to `tip_alpha` at the ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumBar {
    pub x: f32,
    pub centre_y: f32,
    pub width: f32,
    pub height: f32,
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub base_alpha: f32,
    pub tip_alpha: f32,
}

/// Heart glyph drawn at the centre of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartGlyph {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub saturation: f32,
    pub lightness: f32,
    /// Shadow blur radius, present on strong beats.
    pub glow: Option<f32>,
}

/// Twelve bars of five bins each, mirrored around the centre line.
pub fn spectrum_bars(input: &EffectInput<'_>, viewport: &ViewportConfig) -> Vec<SpectrumBar> {
    let gain = input.gain;
    let (centre_x, centre_y) = viewport.centre();
    let width = viewport.width * 0.06;
    let spacing = viewport.width * 0.01;
    let total = BAR_COUNT as f32 * (width + spacing);
    let demo_t = input.time.synced as f32;

    (0..BAR_COUNT)
        .map(|i| {
            let x = centre_x - total / 2.0 + i as f32 * (width + spacing);
            let hue = i as f32 / BAR_COUNT as f32 * 360.0;
            match input.bins {
                Some(bins) => {
                    let start = (i * BINS_PER_BAR).min(bins.len());
                    let end = ((i + 1) * BINS_PER_BAR).min(bins.len());
                    let mut value = band_mean(bins, start..end) * gain;
                    if i == 0 {
                        value *= 0.3;
                    } else if i > TREBLE_FROM {
                        value *= 1.0 + gain / 2.5;
                    }
                    SpectrumBar {
                        x,
                        centre_y,
                        width,
                        height: (value * viewport.height * 0.003).max(MIN_BAR_HEIGHT),
                        hue,
                        saturation: 100.0,
                        lightness: 70.0,
                        base_alpha: (0.7 + gain * 0.05).min(1.0),
                        tip_alpha: (0.2 + gain * 0.05).min(1.0),
                    }
                }
                None => {
                    let swing = if i == 0 { 40.0 } else { 80.0 };
                    let wave = (demo_t * 0.005 + i as f32 * 0.3).sin().abs();
                    SpectrumBar {
                        x,
                        centre_y,
                        width,
                        height: 30.0 + wave * swing,
                        hue,
                        saturation: 80.0,
                        lightness: 65.0,
                        base_alpha: 0.8,
                        tip_alpha: 0.3,
                    }
                }
            }
        })
        .collect()
}

/// Heart that swells with loudness and kicks on strong beats.
pub fn heart_glyph(input: &EffectInput<'_>, viewport: &ViewportConfig) -> HeartGlyph {
    let (x, y) = viewport.centre();
    let base = viewport.shortest_side() * 0.12;

    if !input.is_live() {
        let t = input.time.synced as f32;
        return HeartGlyph {
            x,
            y,
            size: base * ((t * 0.004).sin() * 0.15 + 1.0),
            saturation: 90.0,
            lightness: 60.0 + (t * 0.005).sin() * 10.0,
            glow: None,
        };
    }

    let gain = input.gain;
    let overall = input.features.overall;
    let beat = input.last_beat_intensity;
    let swell = 1.0 + overall * gain * 0.03;
    let kick = if beat > 0.3 {
        1.0 + beat * (0.2 + gain * 0.05)
    } else {
        1.0
    };
    let glow = (beat > 0.4).then(|| 15.0 + beat * 20.0 * (1.0 + gain * 0.1));

    HeartGlyph {
        x,
        y,
        size: base * swell * kick,
        saturation: 80.0 + (overall * 0.2).min(20.0),
        lightness: 60.0 + (overall * 0.1).min(15.0),
        glow,
    }
}
