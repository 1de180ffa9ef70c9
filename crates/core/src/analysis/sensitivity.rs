use std::collections::VecDeque;

use crate::config::SensitivityConfig;

/// Adaptive gain driven by a rolling loudness history.
#[derive(Debug, Clone)]
pub struct SensitivityController {
    config: SensitivityConfig,
    auto_gain: f32,
    manual_gain: f32,
    history: VecDeque<f32>,
    calls_since_recompute: usize,
}

impl SensitivityController {
    pub fn new(config: SensitivityConfig) -> Self {
        let manual_gain = config
            .manual_gain
            .map(|gain| config.clamp(gain))
            .unwrap_or(config.default_gain);
        Self {
            auto_gain: manual_gain,
            manual_gain,
            history: VecDeque::with_capacity(config.history_capacity),
            calls_since_recompute: 0,
            config,
        }
    }

    /// Current effective gain.
    pub fn gain(&self) -> f32 {
        self.auto_gain
    }

    /// Whether the user value currently pins the gain.
    pub fn is_manual(&self) -> bool {
        (self.manual_gain - self.config.default_gain).abs() > f32::EPSILON
    }

    /// Sets the user sensitivity. Values outside the bounds are clamped.
    /// Returning to the default value hands control back to the adaptive
    /// loop, starting from that value.
    pub fn set_manual(&mut self, gain: f32) -> f32 {
        self.manual_gain = self.config.clamp(gain);
        self.auto_gain = self.manual_gain;
        self.calls_since_recompute = 0;
        self.manual_gain
    }

    /// Recent `overall` samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    /// Feeds one frame's loudness and returns the gain to use for it.
    pub fn update(&mut self, overall: f32) -> f32 {
        if self.is_manual() {
            self.auto_gain = self.manual_gain;
            return self.auto_gain;
        }

        while self.history.len() >= self.config.history_capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(overall.max(0.0));

        if self.history.len() < self.config.min_history {
            return self.auto_gain;
        }

        self.calls_since_recompute += 1;
        if self.calls_since_recompute >= self.config.recompute_every {
            self.calls_since_recompute = 0;
            self.recompute();
        }
        self.auto_gain
    }

    fn recompute(&mut self) {
        let config = &self.config;
        let max = self.history.iter().copied().fold(0.0_f32, f32::max);
        let mean = self.history.iter().sum::<f32>() / self.history.len() as f32;
        let mut gain = self.auto_gain;

        if max < config.low_volume {
            gain += config.step;
        } else if max > config.high_volume {
            gain -= config.step;
        }

        let range = max - mean;
        if range < config.dynamic_low {
            gain += config.dynamic_step;
        } else if range > config.dynamic_high {
            gain -= config.dynamic_step;
        }

        gain += (config.neutral_gain - gain) * config.relax_rate;

        let gain = config.clamp(gain);
        if (gain - self.auto_gain).abs() > f32::EPSILON {
            tracing::trace!(from = self.auto_gain, to = gain, max, mean, "auto gain adjusted");
        }
        self.auto_gain = gain;
    }
}
