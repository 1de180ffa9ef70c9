use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::BeatConfig;

/// A detected beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub timestamp: f64,
    /// Louder of bass and mid, normalised to [0, 1].
    pub intensity: f32,
}

/// Threshold-and-refractory beat detector with a bounded event history.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    config: BeatConfig,
    last_beat: Option<f64>,
    last_intensity: f32,
    history: VecDeque<BeatEvent>,
}

impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        Self {
            last_beat: None,
            last_intensity: 0.0,
            history: VecDeque::with_capacity(config.history_capacity),
            config,
        }
    }

    /// Checks one frame for a beat. `overall` is accepted for symmetry with
    /// the rest of the pipeline; only bass and mid take part in the decision.
    pub fn detect(
        &mut self,
        bass: f32,
        mid: f32,
        _overall: f32,
        gain: f32,
        now: f64,
    ) -> Option<BeatEvent> {
        if !self.config.is_strong(bass, mid, gain) {
            return None;
        }

        let rested = self
            .last_beat
            .map(|last| now - last >= self.config.refractory_ms)
            .unwrap_or(true);
        if !rested {
            return None;
        }

        let event = BeatEvent {
            timestamp: now,
            intensity: (bass.max(mid) / 255.0).clamp(0.0, 1.0),
        };
        self.last_beat = Some(now);
        self.last_intensity = event.intensity;

        while self.history.len() >= self.config.history_capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(event);
        Some(event)
    }

    /// Timestamp of the most recent beat.
    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    /// Intensity of the most recent beat, zero before the first one.
    pub fn last_intensity(&self) -> f32 {
        self.last_intensity
    }

    pub fn history(&self) -> &VecDeque<BeatEvent> {
        &self.history
    }

    /// Beat timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        self.history.iter().map(|event| event.timestamp).collect()
    }

    /// Forgets the beat history. The refractory clock is kept so a reset
    /// cannot be used to sneak in a double beat.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.last_intensity = 0.0;
    }
}
