//! Per-frame feature extraction: band energies, adaptive gain, beats and
//! rhythm classification.

mod beat;
mod rhythm;
mod sensitivity;
mod spectrum;

pub use beat::{BeatDetector, BeatEvent};
pub use rhythm::{IntervalStats, RhythmClassifier, RhythmMode};
pub use sensitivity::SensitivityController;
pub use spectrum::{
    band_mean, band_weight, weighted_band_average, DemoFeatures, FrameFeatures, SpectrumSampler,
    DEMO_BRIGHTNESS,
};
