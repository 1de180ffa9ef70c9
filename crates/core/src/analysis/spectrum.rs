use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::SpectrumConfig;

/// Relative band position below which the weight falls off cubically.
const LOW_KNEE: f32 = 0.2;
/// Relative band position above which the weight rises linearly.
const HIGH_KNEE: f32 = 0.65;
/// Weight of the very first bin of a band.
const FLOOR_WEIGHT: f32 = 0.1;
/// Gain-scaled loudness that maps to full brightness.
const BRIGHTNESS_REFERENCE: f32 = 128.0;
/// Brightness reported while running on demo features.
pub const DEMO_BRIGHTNESS: f32 = 0.5;

/// Perceptual features derived from one spectrum snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub overall: f32,
    /// Normalised [0, 1] brightness once the gain has been applied.
    pub brightness: f32,
}

impl FrameFeatures {
    /// Builds a feature record from the three bands; `overall` is their mean.
    pub fn from_bands(bass: f32, mid: f32, high: f32) -> Self {
        Self {
            bass,
            mid,
            high,
            overall: (bass + mid + high) / 3.0,
            brightness: 0.0,
        }
    }

    /// Fills in the brightness for the given gain.
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.brightness = (self.overall * gain / BRIGHTNESS_REFERENCE).clamp(0.0, 1.0);
        self
    }
}

/// Turns analyser byte snapshots into band energies.
#[derive(Debug, Clone)]
pub struct SpectrumSampler {
    config: SpectrumConfig,
}

impl SpectrumSampler {
    pub fn new(config: SpectrumConfig) -> Self {
        Self { config }
    }

    /// Computes bass, mid and high with the weighted band average. The
    /// brightness is left at zero until a gain is known.
    pub fn sample(&self, bins: &[u8]) -> FrameFeatures {
        let len = bins.len();
        let bass = weighted_band_average(bins, self.config.bass_bins.clipped(len))
            * self.config.bass_scale;
        let mid = weighted_band_average(bins, self.config.mid_bins.clipped(len));
        let high = weighted_band_average(bins, self.config.high_bins.clipped(len));
        FrameFeatures::from_bands(bass, mid, high)
    }
}

/// Weighted mean of `bins[range]`. The lowest part of the band is suppressed
/// and the upper part emphasised; see [`band_weight`].
pub fn weighted_band_average(bins: &[u8], range: Range<usize>) -> f32 {
    let width = range.len();
    if width == 0 {
        return 0.0;
    }

    let mut weighted = 0.0;
    let mut total = 0.0;
    for (offset, value) in bins[range].iter().enumerate() {
        let weight = band_weight(offset as f32 / width as f32);
        weighted += f32::from(*value) * weight;
        total += weight;
    }

    if total <= f32::EPSILON {
        0.0
    } else {
        weighted / total
    }
}

/// Flat mean of `bins[range]`, used by the bar display.
pub fn band_mean(bins: &[u8], range: Range<usize>) -> f32 {
    let width = range.len();
    if width == 0 {
        return 0.0;
    }
    let sum: u32 = bins[range].iter().map(|v| u32::from(*v)).sum();
    sum as f32 / width as f32
}

/// Weight for a bin at relative position `t` in [0, 1) within its band.
pub fn band_weight(t: f32) -> f32 {
    if t < LOW_KNEE {
        let x = t / LOW_KNEE;
        FLOOR_WEIGHT + (1.0 - FLOOR_WEIGHT) * x * x * x
    } else if t > HIGH_KNEE {
        1.0 + (t - HIGH_KNEE) / (1.0 - HIGH_KNEE)
    } else {
        1.0
    }
}

/// Deterministic stand-in for live input, a sum of slow sinusoids of the
/// elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoFeatures;

impl DemoFeatures {
    pub fn at(&self, elapsed_ms: f64) -> FrameFeatures {
        let t = elapsed_ms as f32;
        let bass = 8.0 + 10.0 * (t * 0.004).sin().abs();
        let mid = 18.0 + 22.0 * (t * 0.005 + 0.6).sin().abs();
        let high = 10.0 + 12.0 * (t * 0.007 + 1.2).sin().abs();
        let mut features = FrameFeatures::from_bands(bass, mid, high);
        features.brightness = DEMO_BRIGHTNESS;
        features
    }
}
