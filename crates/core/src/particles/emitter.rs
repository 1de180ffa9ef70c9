use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Particle, ParticleKind, ParticleSystem};
use crate::{
    analysis::{BeatEvent, FrameFeatures, RhythmMode},
    config::{BeatConfig, ParticleConfig, ViewportConfig},
};

/// Smallest decay a particle can get, so every particle eventually dies.
const MIN_DECAY: f32 = 1e-3;
/// Loudness used for the demo pulses.
const DEMO_INTENSITY: f32 = 150.0;

/// Everything the emission policy looks at for one frame.
#[derive(Debug, Clone, Copy)]
pub struct PulseInput {
    pub features: FrameFeatures,
    pub gain: f32,
    /// Beat detected during this frame, if any.
    pub beat: Option<BeatEvent>,
    pub rhythm: RhythmMode,
    pub now: f64,
    /// False while running on demo features.
    pub live: bool,
}

/// Decides when and what the pulse effect emits.
#[derive(Debug, Clone)]
pub struct PulseEmitter {
    config: ParticleConfig,
    beat: BeatConfig,
    rng: StdRng,
    last_emission: Option<f64>,
    calm_gap: f64,
}

impl PulseEmitter {
    pub fn new(config: ParticleConfig, beat: BeatConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let calm_gap = draw_calm_gap(&config, &mut rng);
        Self {
            config,
            beat,
            rng,
            last_emission: None,
            calm_gap,
        }
    }

    /// Forgets the emission clock, e.g. after an effect switch.
    pub fn reset(&mut self) {
        self.last_emission = None;
    }

    /// Friction for the current rhythm.
    pub fn friction(&self, rhythm: RhythmMode) -> f32 {
        match rhythm {
            RhythmMode::Smooth => self.config.friction_smooth,
            RhythmMode::Rhythmic => self.config.friction_rhythmic,
        }
    }

    /// Applies the emission policy for one frame and returns how many
    /// particles were spawned.
    pub fn emit(
        &mut self,
        system: &mut ParticleSystem,
        input: &PulseInput,
        viewport: &ViewportConfig,
    ) -> usize {
        let since = self
            .last_emission
            .map(|last| input.now - last)
            .unwrap_or(f64::INFINITY);
        let features = &input.features;
        let gain = input.gain;

        if !input.live {
            if since < self.config.demo_interval_ms {
                return 0;
            }
            system.spawn(calm(DEMO_INTENSITY, gain, viewport, &mut self.rng));
            return self.emitted(input.now, 1);
        }

        let silence = self.config.silence_base * (self.beat.reference_gain / gain.max(0.01));
        if features.overall < silence {
            if since < self.calm_gap {
                return 0;
            }
            system.spawn(calm(features.overall, gain, viewport, &mut self.rng));
            self.calm_gap = draw_calm_gap(&self.config, &mut self.rng);
            return self.emitted(input.now, 1);
        }

        if input.rhythm == RhythmMode::Rhythmic {
            let Some(beat) = input.beat else {
                return 0;
            };
            let primary = hot(
                beat.intensity * 255.0,
                gain,
                viewport,
                ParticleKind::Hot,
                &mut self.rng,
            );
            for _ in 0..self.config.echo_count {
                system.spawn(echo(&primary, &mut self.rng));
            }
            system.spawn(primary);
            return self.emitted(input.now, self.config.echo_count + 1);
        }

        let strong = self.beat.is_strong(features.bass, features.mid, gain);
        if strong && since >= self.config.hot_refractory_ms {
            let intensity = features.bass.max(features.mid);
            system.spawn(hot(intensity, gain, viewport, ParticleKind::Hot, &mut self.rng));
            return self.emitted(input.now, 1);
        }

        if features.overall > self.config.soft_min_overall
            && since >= self.config.soft_refractory_ms
            && self.rng.random::<f32>() > self.config.soft_draw
        {
            let intensity = features.overall * 0.8;
            system.spawn(hot(intensity, gain, viewport, ParticleKind::Soft, &mut self.rng));
            return self.emitted(input.now, 1);
        }

        0
    }

    fn emitted(&mut self, now: f64, count: usize) -> usize {
        self.last_emission = Some(now);
        count
    }
}

fn draw_calm_gap(config: &ParticleConfig, rng: &mut StdRng) -> f64 {
    let width = config.calm_interval_max_ms - config.calm_interval_min_ms;
    config.calm_interval_min_ms + rng.random::<f64>() * width
}

fn spread(rng: &mut StdRng, base: f32, width: f32) -> f32 {
    base + rng.random::<f32>() * width
}

/// Bright full-spectrum pulse; higher gain makes it faster and longer lived.
fn hot(
    intensity: f32,
    gain: f32,
    viewport: &ViewportConfig,
    kind: ParticleKind,
    rng: &mut StdRng,
) -> Particle {
    let (x, y) = viewport.centre();
    let visibility = 0.5 + gain / 10.0;
    let decay = (0.04 * (2.0 - gain / 2.5)).max(MIN_DECAY);
    Particle {
        x,
        y,
        radius: 0.0,
        max_radius: viewport.longest_side() * 2.0,
        hue: spread(rng, 0.0, 360.0),
        saturation: spread(rng, 90.0, 10.0),
        lightness: spread(rng, 80.0, 15.0),
        alpha: ((0.8 + intensity * 0.005) * visibility).clamp(0.0, 1.0),
        speed: spread(rng, 30.0, 40.0) * (0.5 + gain / 3.0),
        life: 1.0,
        decay,
        frames_left: Particle::frames_to_live(1.0, decay),
        kind,
    }
}

/// Muted, slow ambient pulse in cool hues.
fn calm(intensity: f32, gain: f32, viewport: &ViewportConfig, rng: &mut StdRng) -> Particle {
    let (x, y) = viewport.centre();
    let visibility = 0.3 + gain / 15.0;
    let decay = (0.006 * (1.5 - gain / 3.3)).max(MIN_DECAY);
    Particle {
        x,
        y,
        radius: 0.0,
        max_radius: viewport.longest_side() * 1.5,
        hue: spread(rng, 200.0, 160.0),
        saturation: spread(rng, 30.0, 20.0),
        lightness: spread(rng, 40.0, 15.0),
        alpha: ((0.3 + intensity * 0.002) * visibility).clamp(0.0, 1.0),
        speed: spread(rng, 4.0, 4.0) * (0.3 + gain / 5.0),
        life: 1.0,
        decay,
        frames_left: Particle::frames_to_live(1.0, decay),
        kind: ParticleKind::Calm,
    }
}

/// Companion of a rhythmic beat: nearby hue, shorter life, slower growth.
fn echo(primary: &Particle, rng: &mut StdRng) -> Particle {
    let decay = primary.decay * spread(rng, 1.5, 1.0);
    Particle {
        hue: (primary.hue + spread(rng, -30.0, 60.0)).rem_euclid(360.0),
        lightness: primary.lightness * spread(rng, 0.8, 0.15),
        alpha: primary.alpha * 0.6,
        speed: primary.speed * spread(rng, 0.6, 0.3),
        decay,
        frames_left: Particle::frames_to_live(primary.life, decay),
        kind: ParticleKind::Echo,
        ..primary.clone()
    }
}
