use crate::{
    analysis::{
        BeatDetector, BeatEvent, DemoFeatures, FrameFeatures, RhythmClassifier, RhythmMode,
        SensitivityController, SpectrumSampler,
    },
    audio::SpectrumInput,
    config::ShowConfig,
    effects::{Effect, EffectEngine, EffectInput, EffectMode},
    particles::ParticleSystem,
    render::{backdrop_alpha, centre_text, RenderCommand},
    store::StateStore,
    timeline::FrameTime,
};

/// The whole per-frame pipeline: features, gain, beats, rhythm and the
/// active effect. Owned and driven by a single frame loop.
#[derive(Debug)]
pub struct Show {
    sampler: SpectrumSampler,
    demo: DemoFeatures,
    sensitivity: SensitivityController,
    beats: BeatDetector,
    rhythm: RhythmClassifier,
    effects: EffectEngine,
    store: StateStore,
    frame: u64,
    faulted: bool,
}

impl Show {
    /// Builds the pipeline and restores the effect mode from `store`.
    pub fn new(config: ShowConfig, store: StateStore, seed: u64) -> Self {
        let config = config.sanitised();
        let mut effects = EffectEngine::new(&config, seed);
        let mode = store.last_effect().unwrap_or_default();
        effects.select(mode, FrameTime::default());
        tracing::info!(%mode, seed, "show initialised");

        Self {
            sampler: SpectrumSampler::new(config.spectrum.clone()),
            demo: DemoFeatures,
            sensitivity: SensitivityController::new(config.sensitivity.clone()),
            beats: BeatDetector::new(config.beat.clone()),
            rhythm: RhythmClassifier::new(config.rhythm.clone()),
            effects,
            store,
            frame: 0,
            faulted: false,
        }
    }

    pub fn mode(&self) -> EffectMode {
        self.effects.mode()
    }

    pub fn effect(&self) -> Effect {
        self.effects.active()
    }

    pub fn gain(&self) -> f32 {
        self.sensitivity.gain()
    }

    pub fn rhythm(&self) -> RhythmMode {
        self.rhythm.mode()
    }

    pub fn particles(&self) -> &ParticleSystem {
        self.effects.particles()
    }

    pub fn beat_history(&self) -> impl ExactSizeIterator<Item = &BeatEvent> {
        self.beats.history().iter()
    }

    pub fn frames(&self) -> u64 {
        self.frame
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.effects.resize(width, height);
    }

    /// User picked an effect mode: reset the per-effect state and remember
    /// the choice for the next session.
    pub fn select_effect(&mut self, mode: EffectMode, time: FrameTime) -> Effect {
        let effect = self.effects.select(mode, time);
        self.clear_transient();
        if let Err(err) = self.store.set_last_effect(mode) {
            tracing::warn!(%err, "could not persist effect mode");
        }
        effect
    }

    /// User moved the sensitivity control. Out-of-range values are clamped.
    pub fn set_sensitivity(&mut self, gain: f32) -> f32 {
        let gain = self.sensitivity.set_manual(gain);
        tracing::info!(gain, manual = self.sensitivity.is_manual(), "sensitivity set");
        gain
    }

    /// Runs one frame.
    pub fn tick(&mut self, input: SpectrumInput<'_>, time: FrameTime) -> RenderCommand {
        if self.effects.advance_cycle(time).is_some() {
            self.clear_transient();
        }

        // Only measured frames feed the gain and the beat detector; demo
        // and faulted frames run on the current gain.
        let (features, bins, measured) = match input {
            SpectrumInput::Live(bins) => {
                if self.faulted {
                    tracing::info!("analyser recovered");
                    self.faulted = false;
                }
                (self.sampler.sample(bins), Some(bins), true)
            }
            SpectrumInput::Unavailable => (self.demo.at(time.now), None, false),
            SpectrumInput::Fault(err) => {
                if !self.faulted {
                    tracing::warn!(%err, "analyser read failed, zeroing features");
                    self.faulted = true;
                }
                (FrameFeatures::default(), Some(&[][..]), false)
            }
        };
        let live = bins.is_some();

        let gain = if measured {
            self.sensitivity.update(features.overall)
        } else {
            self.sensitivity.gain()
        };
        let features = if live {
            features.with_gain(gain)
        } else {
            features
        };

        let beat = if measured {
            self.beats
                .detect(features.bass, features.mid, features.overall, gain, time.now)
        } else {
            None
        };
        let rhythm = self.rhythm.observe(&self.beats.timestamps());

        let layer = self.effects.draw(&EffectInput {
            features,
            gain,
            bins,
            beat,
            last_beat_intensity: self.beats.last_intensity(),
            rhythm,
            time,
        });
        self.effects.accumulate(features.brightness);

        let command = RenderCommand {
            frame: self.frame,
            time_ms: time.now,
            features,
            gain,
            rhythm,
            mode: self.effects.mode(),
            effect: self.effects.active(),
            live,
            backdrop_alpha: backdrop_alpha(features.brightness),
            centre_text: centre_text(&features, live, time.synced),
            layer,
        };
        self.frame += 1;
        command
    }

    fn clear_transient(&mut self) {
        self.beats.clear_history();
        self.rhythm.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effects::{CycleStrategy, EffectLayer},
        ShowError,
    };

    fn time(now: f64) -> FrameTime {
        FrameTime { now, synced: now }
    }

    fn show_with(strategy: CycleStrategy) -> Show {
        let mut config = ShowConfig::default();
        config.cycle.strategy = strategy;
        Show::new(config, StateStore::in_memory(), 5)
    }

    /// A kick every 400 ms over silence.
    fn kick_spectrum(now: f64) -> Vec<u8> {
        let kick = (now as u64 % 400) < 20;
        let mut bins = vec![0u8; 128];
        if kick {
            bins[1..10].iter_mut().for_each(|b| *b = 250);
            bins[10..50].iter_mut().for_each(|b| *b = 200);
        }
        bins
    }

    #[test]
    fn switching_effects_clears_particles_and_beats() {
        let mut show = show_with(CycleStrategy::WallClock);
        show.select_effect(EffectMode::Pulse, time(0.0));
        // Frame 100 lands on the kick at 1600 ms.
        for frame in 0..=100 {
            let now = frame as f64 * 16.0;
            let bins = kick_spectrum(now);
            show.tick(SpectrumInput::Live(&bins), time(now));
        }
        assert!(!show.particles().is_empty());
        assert!(show.beat_history().len() > 0);

        show.select_effect(EffectMode::Heart, time(2_000.0));
        assert!(show.particles().is_empty());
        assert_eq!(show.beat_history().len(), 0);
        assert_eq!(show.effect(), Effect::Heart);
    }

    #[test]
    fn automatic_switch_clears_particles() {
        let mut show = show_with(CycleStrategy::Timed { period_ms: 1_000.0 });
        let loud = vec![180u8; 128];
        for frame in 0..62 {
            show.tick(SpectrumInput::Live(&loud), time(frame as f64 * 16.0));
        }
        assert_eq!(show.effect(), Effect::Pulse);
        assert!(!show.particles().is_empty());

        let quiet = vec![0u8; 128];
        let command = show.tick(SpectrumInput::Live(&quiet), time(1_000.0));
        assert_eq!(command.effect, Effect::Spectrum);
        assert!(show.particles().is_empty());
        assert_eq!(show.beat_history().len(), 0);
    }

    #[test]
    fn steady_kicks_become_rhythmic() {
        let mut show = show_with(CycleStrategy::WallClock);
        show.select_effect(EffectMode::Pulse, time(0.0));
        let mut modes = Vec::new();
        for frame in 0..600 {
            let now = frame as f64 * 10.0;
            let bins = kick_spectrum(now);
            modes.push(show.tick(SpectrumInput::Live(&bins), time(now)).rhythm);
        }
        assert_eq!(show.rhythm(), RhythmMode::Rhythmic);
        assert_eq!(modes[0], RhythmMode::Smooth);
    }

    #[test]
    fn missing_analyser_runs_on_demo_features() {
        let mut show = show_with(CycleStrategy::WallClock);
        show.select_effect(EffectMode::Pulse, time(0.0));
        let command = show.tick(SpectrumInput::Unavailable, time(0.0));
        assert!(!command.live);
        assert_eq!(command.features.brightness, 0.5);
        match command.layer {
            EffectLayer::Pulse { particles } => assert_eq!(particles.len(), 1),
            other => panic!("expected pulse layer, got {other:?}"),
        }
    }

    #[test]
    fn analyser_faults_zero_the_frame_and_keep_going() {
        let mut show = show_with(CycleStrategy::WallClock);
        let command = show.tick(SpectrumInput::Fault(ShowError::msg("boom")), time(0.0));
        assert_eq!(command.features, FrameFeatures::default());
        assert!(command.live);

        let bins = vec![120u8; 128];
        let command = show.tick(SpectrumInput::Live(&bins), time(16.0));
        assert!(command.features.overall > 0.0);
        assert_eq!(show.frames(), 2);
    }

    #[test]
    fn fault_bursts_leave_the_gain_alone() {
        let mut show = show_with(CycleStrategy::WallClock);
        let before = show.gain();
        for frame in 0..600 {
            let command = show.tick(
                SpectrumInput::Fault(ShowError::msg("boom")),
                time(frame as f64 * 16.0),
            );
            assert_eq!(command.gain, before);
        }
        assert_eq!(show.gain(), before);
        assert_eq!(show.beat_history().len(), 0);

        // Recovered input is judged against the untouched threshold.
        let bins = kick_spectrum(9_600.0);
        show.tick(SpectrumInput::Live(&bins), time(9_600.0));
        assert_eq!(show.beat_history().len(), 1);
    }

    #[test]
    fn demo_mode_keeps_the_default_gain() {
        let mut show = show_with(CycleStrategy::WallClock);
        show.select_effect(EffectMode::Pulse, time(0.0));
        let before = show.gain();
        for frame in 0..6_000 {
            let command = show.tick(SpectrumInput::Unavailable, time(frame as f64 * 16.0));
            assert_eq!(command.gain, before);
            assert_eq!(command.rhythm, RhythmMode::Smooth);
        }
        assert_eq!(show.gain(), before);
        assert_eq!(show.beat_history().len(), 0);
        assert!(show
            .particles()
            .particles()
            .iter()
            .all(|p| p.decay > 0.005));
    }

    #[test]
    fn manual_sensitivity_is_clamped_and_pinned() {
        let mut show = show_with(CycleStrategy::WallClock);
        assert_eq!(show.set_sensitivity(9.0), 5.0);
        let bins = vec![255u8; 128];
        for frame in 0..100 {
            show.tick(SpectrumInput::Live(&bins), time(frame as f64 * 16.0));
        }
        assert_eq!(show.gain(), 5.0);
    }

    #[test]
    fn restores_the_persisted_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let mut show = Show::new(ShowConfig::default(), StateStore::open(&path), 1);
            show.select_effect(EffectMode::Spectrum, time(0.0));
        }
        let show = Show::new(ShowConfig::default(), StateStore::open(&path), 1);
        assert_eq!(show.mode(), EffectMode::Spectrum);
        assert_eq!(show.effect(), Effect::Spectrum);
    }

    #[test]
    fn particle_population_stays_capped() {
        let mut show = show_with(CycleStrategy::WallClock);
        show.select_effect(EffectMode::Pulse, time(0.0));
        let cap = show.particles().cap();
        for frame in 0..2_000 {
            let now = frame as f64 * 7.0;
            let bins = kick_spectrum(now);
            show.tick(SpectrumInput::Live(&bins), time(now));
            assert!(show.particles().len() <= cap);
        }
    }
}
