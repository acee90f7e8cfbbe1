//! Movement intensity: raw movement energy mapped onto 0.0 – 1.0 and smoothed.

use crate::config::MovementConfig;
use std::collections::VecDeque;

/// Cap on smoothing entries kept, whatever the sample rate.
const MAX_SMOOTHING_ENTRIES: usize = 1024;

pub struct MovementIntensityEstimator {
    saturation_energy: f32,
    smoothing_window_ms: u64,
    recent: VecDeque<(u64, f32)>,
    sum: f32,
    intensity: f32,
}

impl MovementIntensityEstimator {
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            saturation_energy: config.saturation_energy,
            smoothing_window_ms: config.smoothing_window_ms,
            recent: VecDeque::with_capacity(256),
            sum: 0.0,
            intensity: 0.0,
        }
    }

    /// Instantaneous intensity for one energy reading.
    ///
    /// Square-root scaling spreads the low end, where small shifts in bed
    /// separate still sleep from restless sleep.
    pub fn normalize(&self, energy: f32) -> f32 {
        if energy.is_nan() || energy <= 0.0 {
            return 0.0;
        }
        (energy / self.saturation_energy).sqrt().clamp(0.0, 1.0)
    }

    /// Record the movement energy at `timestamp_ms` and return the smoothed
    /// intensity.
    pub fn update(&mut self, timestamp_ms: u64, energy: f32) -> f32 {
        let value = self.normalize(energy);
        self.recent.push_back((timestamp_ms, value));
        self.sum += value;

        let horizon = timestamp_ms.saturating_sub(self.smoothing_window_ms);
        while self.recent.len() > MAX_SMOOTHING_ENTRIES
            || self.recent.front().is_some_and(|&(ts, _)| ts < horizon)
        {
            if let Some((_, old)) = self.recent.pop_front() {
                self.sum -= old;
            }
        }

        if self.recent.len() == 1 {
            self.sum = value;
        }
        self.intensity = (self.sum / self.recent.len() as f32).clamp(0.0, 1.0);
        self.intensity
    }

    /// Latest smoothed intensity, 0.0 before any update.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.sum = 0.0;
        self.intensity = 0.0;
    }
}
