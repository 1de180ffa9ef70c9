use std::{fs, ops::Range, path::Path};

use serde::{Deserialize, Serialize};

use crate::{effects::CycleStrategy, Result};

/// Top-level configuration structure for the show.
///
/// Every section falls back to its defaults when missing from the file, and
/// [`ShowConfig::sanitised`] clamps values that would break an invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    pub analyser: AnalyserConfig,
    pub spectrum: SpectrumConfig,
    pub sensitivity: SensitivityConfig,
    pub beat: BeatConfig,
    pub rhythm: RhythmConfig,
    pub particles: ParticleConfig,
    pub cycle: CycleConfig,
    pub viewport: ViewportConfig,
}

impl ShowConfig {
    /// Reads a JSON configuration file and clamps it into range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: ShowConfig = serde_json::from_str(&raw)?;
        Ok(config.sanitised())
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Returns a copy with out-of-range values clamped silently.
    pub fn sanitised(mut self) -> Self {
        self.analyser.sanitise();
        self.spectrum.sanitise();
        self.sensitivity.sanitise();
        self.beat.sanitise();
        self.rhythm.sanitise();
        self.particles.sanitise();
        self.cycle.sanitise();
        self.viewport.sanitise();
        self
    }
}

/// Byte spectrum analyser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub sample_rate: u32,
    /// FFT length; the snapshot has half as many bins.
    pub fft_size: usize,
    /// Weight of the previous frame in the temporal smoothing.
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

impl AnalyserConfig {
    fn sanitise(&mut self) {
        self.sample_rate = self.sample_rate.max(1);
        self.fft_size = self.fft_size.clamp(32, 32_768).next_power_of_two();
        self.smoothing = self.smoothing.clamp(0.0, 0.99);
        if self.max_db <= self.min_db {
            self.max_db = self.min_db + 1.0;
        }
    }
}

/// Half-open range of analyser bin indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: usize,
    pub end: usize,
}

impl BinRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Clips the range to a spectrum of `len` bins.
    pub fn clipped(&self, len: usize) -> Range<usize> {
        let end = self.end.min(len);
        self.start.min(end)..end
    }
}

/// Band layout used by the spectrum sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub bass_bins: BinRange,
    pub mid_bins: BinRange,
    pub high_bins: BinRange,
    /// Attenuation applied to the bass band to tame rumble.
    pub bass_scale: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bass_bins: BinRange::new(1, 10),
            mid_bins: BinRange::new(10, 50),
            high_bins: BinRange::new(50, 100),
            bass_scale: 0.3,
        }
    }
}

impl SpectrumConfig {
    fn sanitise(&mut self) {
        for range in [&mut self.bass_bins, &mut self.mid_bins, &mut self.high_bins] {
            if range.end < range.start {
                std::mem::swap(&mut range.start, &mut range.end);
            }
        }
        self.bass_scale = self.bass_scale.max(0.0);
    }
}

/// Adaptive gain tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Value the user control starts at. Any other manual value pins the gain.
    pub default_gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    /// Manual override applied at startup, if any.
    pub manual_gain: Option<f32>,
    pub history_capacity: usize,
    /// Samples needed before the controller starts adapting.
    pub min_history: usize,
    /// Number of updates between two recomputations.
    pub recompute_every: usize,
    pub low_volume: f32,
    pub high_volume: f32,
    pub step: f32,
    pub dynamic_low: f32,
    pub dynamic_high: f32,
    pub dynamic_step: f32,
    pub neutral_gain: f32,
    /// Fraction of the gap to `neutral_gain` closed on each recomputation.
    pub relax_rate: f32,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            default_gain: 1.5,
            min_gain: 0.1,
            max_gain: 5.0,
            manual_gain: None,
            history_capacity: 50,
            min_history: 10,
            recompute_every: 10,
            low_volume: 30.0,
            high_volume: 200.0,
            step: 0.1,
            dynamic_low: 8.0,
            dynamic_high: 120.0,
            dynamic_step: 0.05,
            neutral_gain: 1.5,
            relax_rate: 0.02,
        }
    }
}

impl SensitivityConfig {
    fn sanitise(&mut self) {
        self.min_gain = self.min_gain.max(0.01);
        if self.max_gain < self.min_gain {
            self.max_gain = self.min_gain;
        }
        self.default_gain = self.clamp(self.default_gain);
        self.neutral_gain = self.clamp(self.neutral_gain);
        self.manual_gain = self.manual_gain.map(|gain| self.clamp(gain));
        self.history_capacity = self.history_capacity.max(1);
        self.min_history = self.min_history.clamp(1, self.history_capacity);
        self.recompute_every = self.recompute_every.max(1);
        self.step = self.step.max(0.0);
        self.dynamic_step = self.dynamic_step.max(0.0);
        self.relax_rate = self.relax_rate.clamp(0.0, 1.0);
    }

    /// Clamps a gain value into the configured bounds.
    pub fn clamp(&self, gain: f32) -> f32 {
        if gain.is_nan() {
            return self.default_gain;
        }
        gain.clamp(self.min_gain, self.max_gain)
    }
}

/// Beat detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Threshold at the reference gain.
    pub base_threshold: f32,
    pub reference_gain: f32,
    /// Fraction of the threshold the mid band has to exceed.
    pub mid_ratio: f32,
    pub refractory_ms: f64,
    pub history_capacity: usize,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            base_threshold: 25.0,
            reference_gain: 1.5,
            mid_ratio: 0.5,
            refractory_ms: 100.0,
            history_capacity: 10,
        }
    }
}

impl BeatConfig {
    fn sanitise(&mut self) {
        self.base_threshold = self.base_threshold.max(0.0);
        self.reference_gain = self.reference_gain.max(0.01);
        self.mid_ratio = self.mid_ratio.max(0.0);
        self.refractory_ms = self.refractory_ms.max(0.0);
        self.history_capacity = self.history_capacity.max(2);
    }

    /// Beat threshold scaled by the current gain.
    pub fn threshold(&self, gain: f32) -> f32 {
        self.base_threshold * (gain / self.reference_gain)
    }

    /// Whether the band energies cross the gain-scaled threshold.
    pub fn is_strong(&self, bass: f32, mid: f32, gain: f32) -> bool {
        let threshold = self.threshold(gain);
        bass > threshold || mid > threshold * self.mid_ratio
    }
}

/// Rhythm classification window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    pub window_frames: u32,
    pub min_beats: usize,
    pub max_variation: f64,
    pub max_mean_interval_ms: f64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            window_frames: 120,
            min_beats: 8,
            max_variation: 0.3,
            max_mean_interval_ms: 600.0,
        }
    }
}

impl RhythmConfig {
    fn sanitise(&mut self) {
        self.window_frames = self.window_frames.max(1);
        self.min_beats = self.min_beats.max(2);
        self.max_variation = self.max_variation.max(0.0);
        self.max_mean_interval_ms = self.max_mean_interval_ms.max(0.0);
    }
}

/// Pulse effect emission and population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Soft population cap.
    pub cap: usize,
    /// Population kept after pruning.
    pub prune_to: usize,
    pub hot_refractory_ms: f64,
    pub soft_refractory_ms: f64,
    pub soft_min_overall: f32,
    /// A soft pulse is emitted when a uniform draw exceeds this value.
    pub soft_draw: f32,
    /// Silence threshold at the reference gain.
    pub silence_base: f32,
    pub calm_interval_min_ms: f64,
    pub calm_interval_max_ms: f64,
    pub demo_interval_ms: f64,
    pub echo_count: usize,
    pub friction_smooth: f32,
    pub friction_rhythmic: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            cap: 30,
            prune_to: 25,
            hot_refractory_ms: 60.0,
            soft_refractory_ms: 200.0,
            soft_min_overall: 20.0,
            soft_draw: 0.3,
            silence_base: 15.0,
            calm_interval_min_ms: 1500.0,
            calm_interval_max_ms: 3500.0,
            demo_interval_ms: 1500.0,
            echo_count: 5,
            friction_smooth: 0.98,
            friction_rhythmic: 0.95,
        }
    }
}

impl ParticleConfig {
    fn sanitise(&mut self) {
        self.cap = self.cap.max(1);
        self.prune_to = self.prune_to.clamp(1, self.cap);
        self.soft_draw = self.soft_draw.clamp(0.0, 1.0);
        if self.calm_interval_max_ms < self.calm_interval_min_ms {
            self.calm_interval_max_ms = self.calm_interval_min_ms;
        }
        self.friction_smooth = self.friction_smooth.clamp(0.0, 1.0);
        self.friction_rhythmic = self.friction_rhythmic.clamp(0.0, 1.0);
    }
}

/// Automatic effect cycling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub strategy: CycleStrategy,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            strategy: CycleStrategy::WallClock,
        }
    }
}

impl CycleConfig {
    fn sanitise(&mut self) {
        match &mut self.strategy {
            CycleStrategy::Timed { period_ms } => *period_ms = period_ms.max(1.0),
            CycleStrategy::Brightness { budget } => *budget = budget.max(f32::EPSILON),
            CycleStrategy::WallClock => {}
        }
    }
}

/// Size of the surface the renderer paints on, in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

impl ViewportConfig {
    fn sanitise(&mut self) {
        self.width = self.width.max(1.0);
        self.height = self.height.max(1.0);
    }

    pub fn centre(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    pub fn longest_side(&self) -> f32 {
        self.width.max(self.height)
    }

    pub fn shortest_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: ShowConfig =
            serde_json::from_str(r#"{ "beat": { "refractory_ms": 150.0 } }"#).unwrap();

        assert_eq!(config.beat.refractory_ms, 150.0);
        assert_eq!(config.beat.base_threshold, 25.0);
        assert_eq!(config.particles.cap, 30);
        assert_eq!(config.spectrum.mid_bins, BinRange::new(10, 50));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut config = ShowConfig::default();
        config.sensitivity.manual_gain = Some(42.0);
        config.particles.prune_to = 100;
        config.spectrum.high_bins = BinRange::new(90, 40);
        config.analyser.fft_size = 300;

        let config = config.sanitised();
        assert_eq!(config.sensitivity.manual_gain, Some(5.0));
        assert_eq!(config.particles.prune_to, config.particles.cap);
        assert_eq!(config.spectrum.high_bins, BinRange::new(40, 90));
        assert_eq!(config.analyser.fft_size, 512);
    }

    #[test]
    fn parses_cycle_strategies() {
        let config: CycleConfig =
            serde_json::from_str(r#"{ "strategy": { "kind": "timed", "period_ms": 4000.0 } }"#)
                .unwrap();
        assert_eq!(config.strategy, CycleStrategy::Timed { period_ms: 4000.0 });

        let config: CycleConfig =
            serde_json::from_str(r#"{ "strategy": { "kind": "brightness" } }"#).unwrap();
        assert_eq!(config.strategy, CycleStrategy::Brightness { budget: 240.0 });
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.json");
        let mut config = ShowConfig::default();
        config.rhythm.window_frames = 60;

        config.save(&path).unwrap();
        let loaded = ShowConfig::load(&path).unwrap();
        assert_eq!(loaded.rhythm.window_frames, 60);
    }

    #[test]
    fn bin_ranges_clip_to_spectrum_length() {
        assert_eq!(BinRange::new(50, 100).clipped(64), 50..64);
        assert_eq!(BinRange::new(80, 100).clipped(64), 64..64);
    }
}
