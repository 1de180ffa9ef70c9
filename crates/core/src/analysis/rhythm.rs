use serde::{Deserialize, Serialize};

use crate::config::RhythmConfig;

/// Coarse classification of the recent beat pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RhythmMode {
    /// Ambient or irregular material.
    #[default]
    Smooth,
    /// Frequent, evenly spaced beats.
    Rhythmic,
}

/// Inter-beat interval statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    pub mean: f64,
    pub std_dev: f64,
    /// `std_dev / mean`, infinite when the mean is zero.
    pub variation: f64,
}

impl IntervalStats {
    /// Population statistics of the gaps between consecutive timestamps.
    /// Needs at least two timestamps.
    pub fn from_timestamps(timestamps: &[f64]) -> Option<Self> {
        if timestamps.len() < 2 {
            return None;
        }

        let intervals: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
        let count = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / count;
        let variance = intervals
            .iter()
            .map(|interval| (interval - mean).powi(2))
            .sum::<f64>()
            / count;
        let std_dev = variance.sqrt();
        let variation = if mean > f64::EPSILON {
            std_dev / mean
        } else {
            f64::INFINITY
        };

        Some(Self {
            mean,
            std_dev,
            variation,
        })
    }
}

/// Periodically reclassifies the beat history as smooth or rhythmic.
#[derive(Debug, Clone)]
pub struct RhythmClassifier {
    config: RhythmConfig,
    mode: RhythmMode,
    frames_since_analysis: u32,
}

impl RhythmClassifier {
    pub fn new(config: RhythmConfig) -> Self {
        Self {
            config,
            mode: RhythmMode::Smooth,
            frames_since_analysis: 0,
        }
    }

    pub fn mode(&self) -> RhythmMode {
        self.mode
    }

    /// Counts a frame and, once per analysis window, recomputes the mode from
    /// scratch using `timestamps`.
    pub fn observe(&mut self, timestamps: &[f64]) -> RhythmMode {
        self.frames_since_analysis += 1;
        if self.frames_since_analysis >= self.config.window_frames {
            self.frames_since_analysis = 0;
            let mode = self.classify(timestamps);
            if mode != self.mode {
                tracing::debug!(?mode, beats = timestamps.len(), "rhythm mode changed");
            }
            self.mode = mode;
        }
        self.mode
    }

    /// Stateless classification of a beat history.
    pub fn classify(&self, timestamps: &[f64]) -> RhythmMode {
        if timestamps.len() < self.config.min_beats {
            return RhythmMode::Smooth;
        }
        match IntervalStats::from_timestamps(timestamps) {
            Some(stats)
                if stats.variation < self.config.max_variation
                    && stats.mean < self.config.max_mean_interval_ms =>
            {
                RhythmMode::Rhythmic
            }
            _ => RhythmMode::Smooth,
        }
    }

    /// Drops back to smooth and restarts the analysis window.
    pub fn reset(&mut self) {
        self.mode = RhythmMode::Smooth;
        self.frames_since_analysis = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> RhythmClassifier {
        RhythmClassifier::new(RhythmConfig::default())
    }

    #[test]
    fn evenly_spaced_beats_are_rhythmic() {
        let beats = [0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, 3500.0];
        assert_eq!(classifier().classify(&beats), RhythmMode::Rhythmic);

        let stats = IntervalStats::from_timestamps(&beats).unwrap();
        assert_eq!(stats.mean, 500.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn irregular_beats_are_smooth() {
        let beats = [0.0, 300.0, 1200.0, 1900.0, 2100.0, 4000.0, 4050.0, 9000.0];
        assert_eq!(classifier().classify(&beats), RhythmMode::Smooth);
    }

    #[test]
    fn regular_but_slow_beats_are_smooth() {
        let beats: Vec<f64> = (0..8).map(|i| i as f64 * 800.0).collect();
        assert_eq!(classifier().classify(&beats), RhythmMode::Smooth);
    }

    #[test]
    fn mode_only_changes_at_window_boundaries() {
        let mut rhythm = classifier();
        let beats: Vec<f64> = (0..10).map(|i| i as f64 * 400.0).collect();
        for _ in 0..119 {
            assert_eq!(rhythm.observe(&beats), RhythmMode::Smooth);
        }
        assert_eq!(rhythm.observe(&beats), RhythmMode::Rhythmic);

        for _ in 0..119 {
            assert_eq!(rhythm.observe(&[]), RhythmMode::Rhythmic);
        }
        assert_eq!(rhythm.observe(&[]), RhythmMode::Smooth);
    }

    proptest! {
        #[test]
        fn short_histories_are_always_smooth(
            gaps in proptest::collection::vec(0.0f64..2000.0, 0..7),
        ) {
            let mut now = 0.0;
            let mut beats = vec![now];
            for gap in gaps {
                now += gap;
                beats.push(now);
            }
            prop_assert_eq!(classifier().classify(&beats), RhythmMode::Smooth);
        }
    }
}
