//! Expanding, fading radial pulses used by the pulse effect.

mod emitter;

use serde::{Deserialize, Serialize};

pub use emitter::{PulseEmitter, PulseInput};

/// Visual sub-style of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleKind {
    /// Bright pulse fired by a strong beat.
    Hot,
    /// Softer pulse for moderate loudness without a beat.
    Soft,
    /// Muted ambient pulse emitted during silence.
    Calm,
    /// Short-lived companion of a rhythmic beat.
    Echo,
}

/// Colour in hue/saturation/lightness with alpha. Hue in degrees,
/// saturation and lightness in percent, alpha in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsla {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub alpha: f32,
}

/// Colour stop of a radial gradient; `offset` runs from 0 (centre) to 1
/// (current radius).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub colour: Hsla,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub max_radius: f32,
    /// Radius growth per frame.
    pub speed: f32,
    pub life: f32,
    /// Life lost per frame, always positive.
    pub decay: f32,
    /// Frames until `life` runs out, counted so that rounding in the
    /// running `life` sum cannot add or drop a frame.
    #[serde(default)]
    pub frames_left: u32,
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub alpha: f32,
    pub kind: ParticleKind,
}

impl Particle {
    /// Number of frames `life` lasts when it loses `decay` per frame.
    pub fn frames_to_live(life: f32, decay: f32) -> u32 {
        if decay <= 0.0 || !decay.is_finite() {
            return u32::MAX;
        }
        (life.max(0.0) / decay).ceil() as u32
    }

    /// Advances one frame and reports whether the particle is still alive.
    pub fn advance(&mut self, friction: f32) -> bool {
        self.radius += self.speed;
        self.life -= self.decay;
        self.speed *= friction;
        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            self.life = self.life.min(0.0);
        }
        self.is_alive()
    }

    pub fn is_alive(&self) -> bool {
        self.frames_left > 0 && self.radius <= self.max_radius
    }

    /// Gradient the renderer fills the particle's disc with. Intensity fades
    /// with the remaining life.
    pub fn gradient(&self) -> [GradientStop; 3] {
        let intensity = self.life.clamp(0.0, 1.0);
        let stop = |offset: f32, lightness: f32, alpha: f32| GradientStop {
            offset,
            colour: Hsla {
                hue: self.hue,
                saturation: self.saturation,
                lightness,
                alpha,
            },
        };
        [
            stop(0.0, self.lightness, self.alpha * intensity),
            stop(0.5, self.lightness * 0.8, self.alpha * intensity * 0.5),
            stop(1.0, self.lightness * 0.6, 0.0),
        ]
    }
}

/// Bounded set of live particles, oldest first.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    cap: usize,
    prune_to: usize,
}

impl ParticleSystem {
    pub fn new(cap: usize, prune_to: usize) -> Self {
        let cap = cap.max(1);
        Self {
            particles: Vec::with_capacity(cap),
            cap,
            prune_to: prune_to.clamp(1, cap),
        }
    }

    /// Adds a particle. Once the population passes the cap the oldest ones
    /// are dropped down to the prune target.
    pub fn spawn(&mut self, particle: Particle) {
        self.particles.push(particle);
        if self.particles.len() > self.cap {
            let overflow = self.particles.len() - self.prune_to;
            self.particles.drain(0..overflow);
        }
    }

    /// Advances every particle and removes the dead ones.
    pub fn advance(&mut self, friction: f32) {
        self.particles.retain_mut(|particle| particle.advance(friction));
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn particle(decay: f32) -> Particle {
        Particle {
            x: 0.0,
            y: 0.0,
            radius: 0.0,
            max_radius: f32::MAX,
            speed: 10.0,
            life: 1.0,
            decay,
            frames_left: Particle::frames_to_live(1.0, decay),
            hue: 120.0,
            saturation: 90.0,
            lightness: 80.0,
            alpha: 0.9,
            kind: ParticleKind::Hot,
        }
    }

    #[test]
    fn life_runs_out_after_ceil_one_over_decay_steps() {
        for decay in [0.25_f32, 0.5, 0.125, 0.3, 0.07, 0.045, 0.2, 0.1, 0.02, 0.01] {
            let expected = (1.0 / decay).ceil() as usize;
            let mut p = particle(decay);
            let mut previous = p.life;
            for step in 1..=expected {
                p.advance(0.98);
                assert!(p.life < previous, "life must strictly decrease");
                previous = p.life;
                if step < expected {
                    assert!(p.life > 0.0, "decay {decay} died early at step {step}");
                    assert!(p.is_alive());
                }
            }
            assert!(p.life <= 0.0, "decay {decay} still alive after {expected} steps");
            assert!(!p.is_alive());
        }
    }

    #[test]
    fn lifetime_ignores_rounding_in_the_life_sum() {
        // Ten frames, whatever the f32 sum of ten 0.1 steps rounds to.
        let mut p = particle(0.1);
        for _ in 0..9 {
            assert!(p.advance(1.0));
        }
        assert!(!p.advance(1.0));
        assert!(p.life <= 0.0);
        assert_eq!(Particle::frames_to_live(1.0, 0.0), u32::MAX);
    }

    #[test]
    fn particles_outgrowing_their_radius_are_removed() {
        let mut system = ParticleSystem::new(30, 25);
        let mut p = particle(0.01);
        p.max_radius = 25.0;
        system.spawn(p);

        system.advance(1.0);
        system.advance(1.0);
        assert_eq!(system.len(), 1);
        system.advance(1.0);
        assert!(system.is_empty());
    }

    #[test]
    fn friction_slows_growth() {
        let mut p = particle(0.01);
        p.advance(0.5);
        assert_eq!(p.radius, 10.0);
        assert_eq!(p.speed, 5.0);
        p.advance(0.5);
        assert_eq!(p.radius, 15.0);
    }

    #[test]
    fn overflow_prunes_the_oldest() {
        let mut system = ParticleSystem::new(30, 25);
        for i in 0..31 {
            let mut p = particle(0.01);
            p.hue = i as f32;
            system.spawn(p);
        }
        assert_eq!(system.len(), 25);
        assert_eq!(system.particles()[0].hue, 6.0);
        assert_eq!(system.particles()[24].hue, 30.0);
    }

    #[test]
    fn gradient_fades_with_life() {
        let mut p = particle(0.5);
        let fresh = p.gradient();
        assert!((fresh[0].colour.alpha - 0.9).abs() < 1e-6);
        assert!((fresh[1].colour.lightness - 64.0).abs() < 1e-4);
        assert_eq!(fresh[2].colour.alpha, 0.0);

        p.advance(1.0);
        let faded = p.gradient();
        assert!((faded[0].colour.alpha - 0.45).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn population_never_exceeds_the_cap(
            spawns in proptest::collection::vec(0usize..8, 1..200),
            cap in 1usize..40,
        ) {
            let mut system = ParticleSystem::new(cap, cap * 5 / 6);
            for burst in spawns {
                for _ in 0..burst {
                    system.spawn(particle(0.02));
                    prop_assert!(system.len() <= cap);
                }
                system.advance(0.98);
                prop_assert!(system.len() <= cap);
            }
        }
    }
}
