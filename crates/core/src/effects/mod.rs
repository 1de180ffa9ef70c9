//! Effect selection and per-effect state.

mod layers;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use layers::{heart_glyph, spectrum_bars, EffectLayer, HeartGlyph, SpectrumBar};

use crate::{
    analysis::{BeatEvent, FrameFeatures, RhythmMode},
    config::{ShowConfig, ViewportConfig},
    particles::{ParticleSystem, PulseEmitter, PulseInput},
    timeline::FrameTime,
    ShowError,
};

/// Length of the wall-clock cycle in seconds.
const WALL_CLOCK_CYCLE_SECONDS: u64 = 24;

/// A concrete visual style. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Effect {
    Pulse,
    Spectrum,
    Heart,
}

impl Effect {
    /// Next effect in the timed and brightness cycles.
    pub fn next(self) -> Self {
        match self {
            Effect::Pulse => Effect::Spectrum,
            Effect::Spectrum => Effect::Heart,
            Effect::Heart => Effect::Pulse,
        }
    }

    /// Effect shown at a given second of the shared wall-clock cycle. Every
    /// instance reading the same clock lands on the same effect.
    pub fn at_synced_time(synced_ms: f64) -> Self {
        let seconds = (synced_ms.max(0.0) / 1000.0).floor() as u64;
        match seconds % WALL_CLOCK_CYCLE_SECONDS {
            0..=5 => Effect::Pulse,
            6..=11 => Effect::Spectrum,
            12..=17 => Effect::Pulse,
            _ => Effect::Heart,
        }
    }
}

/// What the user picked: one fixed effect, or automatic cycling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectMode {
    Pulse,
    Spectrum,
    Heart,
    #[default]
    Auto,
}

impl EffectMode {
    /// The fixed effect behind a manual mode.
    pub fn fixed(self) -> Option<Effect> {
        match self {
            EffectMode::Pulse => Some(Effect::Pulse),
            EffectMode::Spectrum => Some(Effect::Spectrum),
            EffectMode::Heart => Some(Effect::Heart),
            EffectMode::Auto => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffectMode::Pulse => "pulse",
            EffectMode::Spectrum => "spectrum",
            EffectMode::Heart => "heart",
            EffectMode::Auto => "auto",
        }
    }
}

impl fmt::Display for EffectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectMode {
    type Err = ShowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pulse" | "0" => Ok(EffectMode::Pulse),
            "spectrum" | "1" => Ok(EffectMode::Spectrum),
            "heart" | "2" => Ok(EffectMode::Heart),
            "auto" => Ok(EffectMode::Auto),
            other => Err(ShowError::msg(format!("unknown effect mode `{other}`"))),
        }
    }
}

/// How [`EffectMode::Auto`] moves between effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CycleStrategy {
    /// Advance every `period_ms` of local time.
    Timed {
        #[serde(default = "default_period_ms")]
        period_ms: f64,
    },
    /// Follow the shared 24 second wall-clock pattern.
    WallClock,
    /// Advance once the accumulated frame brightness passes `budget`.
    Brightness {
        #[serde(default = "default_brightness_budget")]
        budget: f32,
    },
}

fn default_period_ms() -> f64 {
    6_000.0
}

fn default_brightness_budget() -> f32 {
    240.0
}

/// Per-frame inputs for the active effect.
#[derive(Debug, Clone, Copy)]
pub struct EffectInput<'a> {
    pub features: FrameFeatures,
    pub gain: f32,
    /// Raw analyser snapshot, absent in demo mode.
    pub bins: Option<&'a [u8]>,
    pub beat: Option<BeatEvent>,
    /// Intensity of the most recent beat, which may be older than this frame.
    pub last_beat_intensity: f32,
    pub rhythm: RhythmMode,
    pub time: FrameTime,
}

impl EffectInput<'_> {
    pub fn is_live(&self) -> bool {
        self.bins.is_some()
    }
}

/// State machine over the visual effects, owning the pulse particles.
#[derive(Debug, Clone)]
pub struct EffectEngine {
    mode: EffectMode,
    strategy: CycleStrategy,
    active: Effect,
    cycle_started: Option<f64>,
    brightness: f32,
    particles: ParticleSystem,
    emitter: PulseEmitter,
    viewport: ViewportConfig,
}

impl EffectEngine {
    pub fn new(config: &ShowConfig, seed: u64) -> Self {
        Self {
            mode: EffectMode::Auto,
            strategy: config.cycle.strategy.clone(),
            active: Effect::Pulse,
            cycle_started: None,
            brightness: 0.0,
            particles: ParticleSystem::new(config.particles.cap, config.particles.prune_to),
            emitter: PulseEmitter::new(config.particles.clone(), config.beat.clone(), seed),
            viewport: config.viewport,
        }
    }

    pub fn mode(&self) -> EffectMode {
        self.mode
    }

    pub fn active(&self) -> Effect {
        self.active
    }

    pub fn strategy(&self) -> &CycleStrategy {
        &self.strategy
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn viewport(&self) -> ViewportConfig {
        self.viewport
    }

    /// Updates the surface size used for focal points and layer geometry.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.width = width.max(1.0);
        self.viewport.height = height.max(1.0);
    }

    /// Switches to a user-selected mode. Always resets the transient
    /// per-effect state, even when the mode does not change.
    pub fn select(&mut self, mode: EffectMode, time: FrameTime) -> Effect {
        self.mode = mode;
        self.cycle_started = Some(time.now);
        self.brightness = 0.0;
        self.active = match mode.fixed() {
            Some(effect) => effect,
            None => match self.strategy {
                CycleStrategy::WallClock => Effect::at_synced_time(time.synced),
                _ => Effect::Pulse,
            },
        };
        self.reset_transient();
        tracing::debug!(%mode, effect = ?self.active, "effect selected");
        self.active
    }

    /// Lets the automatic cycle move on. Returns the new effect when it
    /// changed; the particle set has already been cleared by then.
    pub fn advance_cycle(&mut self, time: FrameTime) -> Option<Effect> {
        if self.mode != EffectMode::Auto {
            return None;
        }

        let next = match self.strategy {
            CycleStrategy::WallClock => Effect::at_synced_time(time.synced),
            CycleStrategy::Timed { period_ms } => {
                let started = *self.cycle_started.get_or_insert(time.now);
                if time.now - started >= period_ms {
                    self.cycle_started = Some(time.now);
                    self.active.next()
                } else {
                    self.active
                }
            }
            CycleStrategy::Brightness { budget } => {
                if self.brightness > budget {
                    self.brightness = 0.0;
                    self.active.next()
                } else {
                    self.active
                }
            }
        };

        if next == self.active {
            return None;
        }
        tracing::debug!(from = ?self.active, to = ?next, "effect cycled");
        self.active = next;
        self.reset_transient();
        Some(next)
    }

    /// Adds one frame's brightness to the brightness-paced cycle.
    pub fn accumulate(&mut self, brightness: f32) {
        if matches!(self.strategy, CycleStrategy::Brightness { .. }) {
            self.brightness += brightness.max(0.0);
        }
    }

    /// Runs the active effect for one frame and returns what to paint.
    pub fn draw(&mut self, input: &EffectInput<'_>) -> EffectLayer {
        match self.active {
            Effect::Pulse => self.draw_pulse(input),
            Effect::Spectrum => EffectLayer::Spectrum {
                bars: spectrum_bars(input, &self.viewport),
            },
            Effect::Heart => EffectLayer::Heart(heart_glyph(input, &self.viewport)),
        }
    }

    fn draw_pulse(&mut self, input: &EffectInput<'_>) -> EffectLayer {
        let pulse = PulseInput {
            features: input.features,
            gain: input.gain,
            beat: input.beat,
            rhythm: input.rhythm,
            now: input.time.now,
            live: input.is_live(),
        };
        self.emitter.emit(&mut self.particles, &pulse, &self.viewport);
        // Painted at their current radius, then grown for the next frame.
        let particles = self.particles.particles().to_vec();
        self.particles.advance(self.emitter.friction(input.rhythm));
        EffectLayer::Pulse { particles }
    }

    fn reset_transient(&mut self) {
        self.particles.clear();
        self.emitter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(now: f64, synced: f64) -> FrameTime {
        FrameTime { now, synced }
    }

    fn engine(strategy: CycleStrategy) -> EffectEngine {
        let mut config = ShowConfig::default();
        config.cycle.strategy = strategy;
        EffectEngine::new(&config, 11)
    }

    fn loud_input(now: f64) -> EffectInput<'static> {
        static BINS: [u8; 128] = [180; 128];
        EffectInput {
            features: FrameFeatures::from_bands(60.0, 180.0, 180.0).with_gain(1.5),
            gain: 1.5,
            bins: Some(&BINS),
            beat: None,
            last_beat_intensity: 0.0,
            rhythm: RhythmMode::Smooth,
            time: time(now, now),
        }
    }

    #[test]
    fn wall_clock_pattern_repeats_every_24_seconds() {
        let expect = [
            (0.0, Effect::Pulse),
            (5_999.0, Effect::Pulse),
            (6_000.0, Effect::Spectrum),
            (11_999.0, Effect::Spectrum),
            (12_000.0, Effect::Pulse),
            (18_000.0, Effect::Heart),
            (23_999.0, Effect::Heart),
            (24_000.0, Effect::Pulse),
            (1_700_000_010_500.0, Effect::Heart),
        ];
        for (synced, effect) in expect {
            assert_eq!(Effect::at_synced_time(synced), effect, "at {synced}");
        }
    }

    #[test]
    fn independent_engines_agree_on_the_wall_clock() {
        let mut a = engine(CycleStrategy::WallClock);
        let mut b = engine(CycleStrategy::WallClock);
        a.select(EffectMode::Auto, time(0.0, 100_000.0));
        b.select(EffectMode::Auto, time(55_555.0, 100_000.0));
        for step in 0..100 {
            let synced = 100_000.0 + step as f64 * 500.0;
            a.advance_cycle(time(step as f64, synced));
            b.advance_cycle(time(9_999.0 + step as f64, synced));
            assert_eq!(a.active(), b.active());
        }
    }

    #[test]
    fn timed_cycle_advances_in_order() {
        let mut effects = engine(CycleStrategy::Timed { period_ms: 6_000.0 });
        effects.select(EffectMode::Auto, time(0.0, 0.0));
        assert_eq!(effects.active(), Effect::Pulse);

        assert_eq!(effects.advance_cycle(time(5_999.0, 0.0)), None);
        assert_eq!(effects.advance_cycle(time(6_000.0, 0.0)), Some(Effect::Spectrum));
        assert_eq!(effects.advance_cycle(time(12_000.0, 0.0)), Some(Effect::Heart));
        assert_eq!(effects.advance_cycle(time(18_000.0, 0.0)), Some(Effect::Pulse));
    }

    #[test]
    fn brightness_budget_paces_the_cycle() {
        let mut effects = engine(CycleStrategy::Brightness { budget: 10.0 });
        effects.select(EffectMode::Auto, time(0.0, 0.0));
        for _ in 0..20 {
            effects.accumulate(0.5);
            assert_eq!(effects.advance_cycle(time(0.0, 0.0)), None);
        }
        effects.accumulate(0.5);
        assert_eq!(effects.advance_cycle(time(0.0, 0.0)), Some(Effect::Spectrum));
        assert_eq!(effects.advance_cycle(time(0.0, 0.0)), None);
    }

    #[test]
    fn manual_modes_ignore_the_cycle() {
        let mut effects = engine(CycleStrategy::Timed { period_ms: 10.0 });
        effects.select(EffectMode::Heart, time(0.0, 0.0));
        assert_eq!(effects.advance_cycle(time(1_000.0, 0.0)), None);
        assert_eq!(effects.active(), Effect::Heart);
    }

    #[test]
    fn switching_clears_particles() {
        let mut effects = engine(CycleStrategy::Timed { period_ms: 1_000.0 });
        effects.select(EffectMode::Pulse, time(0.0, 0.0));
        for frame in 0..10 {
            effects.draw(&loud_input(frame as f64 * 100.0));
        }
        assert!(!effects.particles().is_empty());

        effects.select(EffectMode::Spectrum, time(1_000.0, 1_000.0));
        assert!(effects.particles().is_empty());
        assert!(matches!(
            effects.draw(&loud_input(1_016.0)),
            EffectLayer::Spectrum { .. }
        ));
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("Pulse".parse::<EffectMode>().unwrap(), EffectMode::Pulse);
        assert_eq!("2".parse::<EffectMode>().unwrap(), EffectMode::Heart);
        assert_eq!(EffectMode::Auto.to_string(), "auto");
        assert!("strobe".parse::<EffectMode>().is_err());
    }
}
