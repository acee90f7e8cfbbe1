//! Breath cycle detection and rate/regularity statistics.
//!
//! The respiratory band is run through an adaptive Schmitt trigger:
//! - the rolling max/min over a short window gives the signal's center and
//!   peak-to-trough range (monotonic deques, O(1) amortized per sample)
//! - a cycle starts when the signal rises through `center + h` and completes
//!   when it falls back through `center - h`, with `h` a fraction of half the
//!   range
//! - a rise inside the refractory period after the last accepted cycle start
//!   is a ripple and never becomes a cycle
//!
//! Crossing instants are interpolated between ticks, so interval statistics
//! are not quantized to the sample period.

use crate::config::BreathConfig;
use crate::types::BreathCycle;
use std::collections::VecDeque;

/// Upper bound on samples tracked for the rolling range, whatever the rate.
const MAX_RANGE_SAMPLES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// No usable range seen yet.
    Idle,
    Below {
        trough: f32,
    },
    Above {
        start_ms: f64,
        peak: f32,
        trough: f32,
        /// False when the rise was a refractory ripple or predates tracking.
        counted: bool,
    },
}

pub struct BreathCycleDetector {
    config: BreathConfig,
    max_deque: VecDeque<(u64, f32)>,
    min_deque: VecDeque<(u64, f32)>,
    prev: Option<(u64, f32)>,
    phase: Phase,
    last_start_ms: Option<f64>,
    intervals: VecDeque<f32>,
    cycles: VecDeque<BreathCycle>,
    cycles_detected: u32,
    rate_bpm: f32,
    regularity: f32,
}

/// Linear interpolation of the instant the signal passed `level`.
fn crossing_time(prev: Option<(u64, f32)>, ts: u64, value: f32, level: f32) -> f64 {
    match prev {
        Some((pts, pv)) if pts <= ts && value != pv => {
            let frac = ((level - pv) / (value - pv)).clamp(0.0, 1.0) as f64;
            pts as f64 + frac * (ts - pts) as f64
        }
        _ => ts as f64,
    }
}

impl BreathCycleDetector {
    pub fn new(config: &BreathConfig) -> Self {
        Self {
            max_deque: VecDeque::with_capacity(256),
            min_deque: VecDeque::with_capacity(256),
            prev: None,
            phase: Phase::Idle,
            last_start_ms: None,
            intervals: VecDeque::with_capacity(config.history_len),
            cycles: VecDeque::with_capacity(config.history_len),
            cycles_detected: 0,
            rate_bpm: 0.0,
            regularity: 0.0,
            config: config.clone(),
        }
    }

    /// Feed one respiratory-band value; returns the cycle it completes, if any.
    ///
    /// Timestamps must be non-decreasing.
    pub fn push(&mut self, timestamp_ms: u64, value: f32) -> Option<BreathCycle> {
        let (max, min) = self.track_range(timestamp_ms, value);
        let prev = self.prev.replace((timestamp_ms, value));

        let range = max - min;
        if range < self.config.min_amplitude {
            return None;
        }
        let center = 0.5 * (max + min);
        let half_width = self.config.threshold_fraction * 0.5 * range;
        let upper = center + half_width;
        let lower = center - half_width;

        match self.phase {
            Phase::Idle => {
                self.phase = if value > upper {
                    Phase::Above {
                        start_ms: timestamp_ms as f64,
                        peak: value,
                        trough: value,
                        counted: false,
                    }
                } else {
                    Phase::Below { trough: value }
                };
                None
            }
            Phase::Below { trough } => {
                let trough = trough.min(value);
                self.phase = if value > upper {
                    let start_ms = crossing_time(prev, timestamp_ms, value, upper);
                    let counted = self.last_start_ms.map_or(true, |last| {
                        start_ms - last >= self.config.refractory_ms as f64
                    });
                    Phase::Above {
                        start_ms,
                        peak: value,
                        trough,
                        counted,
                    }
                } else {
                    Phase::Below { trough }
                };
                None
            }
            Phase::Above {
                start_ms,
                peak,
                trough,
                counted,
            } => {
                let peak = peak.max(value);
                if value < lower {
                    let end_ms = crossing_time(prev, timestamp_ms, value, lower);
                    self.phase = Phase::Below { trough: value };
                    if counted {
                        return Some(self.record_cycle(start_ms, end_ms, peak - trough));
                    }
                    if let Some(last) = self.last_start_ms {
                        tracing::trace!(
                            "Ignored ripple {:.0}ms after cycle start",
                            start_ms - last
                        );
                    }
                } else {
                    self.phase = Phase::Above {
                        start_ms,
                        peak,
                        trough,
                        counted,
                    };
                }
                None
            }
        }
    }

    /// Push into the monotonic deques and return the current (max, min).
    fn track_range(&mut self, timestamp_ms: u64, value: f32) -> (f32, f32) {
        while self.max_deque.back().is_some_and(|&(_, v)| v <= value) {
            self.max_deque.pop_back();
        }
        self.max_deque.push_back((timestamp_ms, value));
        while self.min_deque.back().is_some_and(|&(_, v)| v >= value) {
            self.min_deque.pop_back();
        }
        self.min_deque.push_back((timestamp_ms, value));

        let horizon = timestamp_ms.saturating_sub(self.config.range_window_ms);
        for deque in [&mut self.max_deque, &mut self.min_deque] {
            while deque.len() > MAX_RANGE_SAMPLES
                || deque.front().is_some_and(|&(ts, _)| ts < horizon)
            {
                deque.pop_front();
            }
        }

        // The newest sample is never evicted, so both fronts exist.
        let max = self.max_deque.front().map_or(value, |&(_, v)| v);
        let min = self.min_deque.front().map_or(value, |&(_, v)| v);
        (max, min)
    }

    fn record_cycle(&mut self, start_ms: f64, end_ms: f64, amplitude: f32) -> BreathCycle {
        if let Some(last) = self.last_start_ms {
            let interval = start_ms - last;
            if interval <= self.config.max_interval_ms as f64 {
                if self.intervals.len() == self.config.history_len {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(interval as f32);
            } else {
                tracing::debug!("Breathing resumed after {:.1}s gap", interval / 1000.0);
            }
        }
        self.last_start_ms = Some(start_ms);
        self.cycles_detected = self.cycles_detected.saturating_add(1);

        let start_ts = start_ms.round() as u64;
        let cycle = BreathCycle {
            start_ts,
            end_ts: (end_ms.round() as u64).max(start_ts),
            amplitude,
        };
        if self.cycles.len() == self.config.history_len {
            self.cycles.pop_front();
        }
        self.cycles.push_back(cycle);

        self.recompute_statistics();
        tracing::debug!(
            "Breath cycle #{} at {}ms: rate {:.1} bpm, regularity {:.2}",
            self.cycles_detected,
            cycle.start_ts,
            self.rate_bpm,
            self.regularity
        );
        cycle
    }

    fn recompute_statistics(&mut self) {
        let n = self.intervals.len();
        if n == 0 {
            self.rate_bpm = 0.0;
            self.regularity = 0.0;
            return;
        }

        let mean = self.intervals.iter().sum::<f32>() / n as f32;
        if mean <= 0.0 {
            self.rate_bpm = 0.0;
            self.regularity = 0.0;
            return;
        }
        self.rate_bpm = 60_000.0 / mean;

        self.regularity = if n >= 2 {
            let variance = self
                .intervals
                .iter()
                .map(|x| (x - mean) * (x - mean))
                .sum::<f32>()
                / n as f32;
            let cv = variance.sqrt() / mean;
            1.0 - cv.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Breaths per minute over the interval history; 0.0 with fewer than two cycles.
    pub fn rate_bpm(&self) -> f32 {
        self.rate_bpm
    }

    /// 1 − coefficient of variation of intervals; 0.0 with fewer than two intervals.
    pub fn regularity(&self) -> f32 {
        self.regularity
    }

    /// True once at least one inter-cycle interval is known.
    pub fn has_rate(&self) -> bool {
        !self.intervals.is_empty()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn cycles_detected(&self) -> u32 {
        self.cycles_detected
    }

    pub fn last_cycle(&self) -> Option<&BreathCycle> {
        self.cycles.back()
    }

    /// Most recent cycles, oldest first.
    pub fn recent_cycles(&self) -> impl Iterator<Item = &BreathCycle> {
        self.cycles.iter()
    }

    pub fn reset(&mut self) {
        self.max_deque.clear();
        self.min_deque.clear();
        self.prev = None;
        self.phase = Phase::Idle;
        self.last_start_ms = None;
        self.intervals.clear();
        self.cycles.clear();
        self.cycles_detected = 0;
        self.rate_bpm = 0.0;
        self.regularity = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TICK_MS: u64 = 20;

    fn detector() -> BreathCycleDetector {
        BreathCycleDetector::new(&BreathConfig::default())
    }

    /// Feed a sinusoid from `start_ms` for `duration_ms`; returns cycles seen.
    fn feed_sine(
        det: &mut BreathCycleDetector,
        start_ms: u64,
        duration_ms: u64,
        freq_hz: f64,
        amplitude: f32,
    ) -> usize {
        let mut found = 0;
        for t in (start_ms..start_ms + duration_ms).step_by(TICK_MS as usize) {
            let secs = (t - start_ms) as f64 / 1000.0;
            let v = amplitude * (2.0 * PI * freq_hz * secs).sin() as f32;
            if det.push(t, v).is_some() {
                found += 1;
            }
        }
        found
    }

    #[test]
    fn test_periodic_signal_rate_and_regularity() {
        let mut det = detector();
        let found = feed_sine(&mut det, 0, 120_000, 0.25, 0.03);

        assert!((28..=31).contains(&found), "found {} cycles", found);
        assert_eq!(det.cycles_detected() as usize, found);
        assert!((det.rate_bpm() - 15.0).abs() < 0.2, "rate {}", det.rate_bpm());
        assert!(det.regularity() > 0.98, "regularity {}", det.regularity());
    }

    #[test]
    fn test_flat_signal_detects_nothing() {
        let mut det = detector();
        for t in (0..60_000).step_by(20) {
            assert!(det.push(t, 0.0).is_none());
        }
        assert_eq!(det.cycles_detected(), 0);
        assert_eq!(det.rate_bpm(), 0.0);
        assert_eq!(det.regularity(), 0.0);
        assert!(!det.has_rate());
    }

    #[test]
    fn test_sub_threshold_noise_is_ignored() {
        let mut det = detector();
        let found = feed_sine(&mut det, 0, 60_000, 0.25, 0.004);
        assert_eq!(found, 0);
    }

    #[test]
    fn test_refractory_period_suppresses_fast_ripples() {
        // 1 Hz oscillation: every other rise falls inside the 1.5 s refractory.
        let mut det = detector();
        feed_sine(&mut det, 0, 60_000, 1.0, 0.03);
        assert!((det.rate_bpm() - 30.0).abs() < 0.5, "rate {}", det.rate_bpm());
    }

    #[test]
    fn test_statistics_need_enough_cycles() {
        let mut det = detector();
        // Just over one period: at most one complete cycle.
        feed_sine(&mut det, 0, 5_000, 0.25, 0.03);
        assert!(det.cycles_detected() <= 1);
        assert_eq!(det.rate_bpm(), 0.0);
        assert_eq!(det.regularity(), 0.0);

        // Two cycles give a rate, but regularity needs two intervals.
        let mut det = detector();
        let mut t = 0;
        while det.interval_count() < 1 {
            let secs = t as f64 / 1000.0;
            det.push(t, 0.03 * (2.0 * PI * 0.25 * secs).sin() as f32);
            t += TICK_MS;
        }
        assert!(det.rate_bpm() > 0.0);
        assert_eq!(det.regularity(), 0.0);
    }

    #[test]
    fn test_gap_is_excluded_from_rate() {
        let mut det = detector();
        feed_sine(&mut det, 0, 60_000, 0.25, 0.03);
        let before = det.cycles_detected();

        for t in (60_000..95_000).step_by(20) {
            det.push(t, 0.0);
        }
        let during_gap = det.cycles_detected();
        assert!(during_gap <= before + 1);

        let resumed = feed_sine(&mut det, 95_000, 30_000, 0.25, 0.03);
        assert!(resumed >= 5);
        assert!((det.rate_bpm() - 15.0).abs() < 0.3, "rate {}", det.rate_bpm());
    }

    #[test]
    fn test_irregular_timing_lowers_regularity() {
        let mut det = detector();
        let mut phase = 0.0_f64;
        let mut long_cycle = false;
        for t in (0..180_000u64).step_by(TICK_MS as usize) {
            let period_s = if long_cycle { 5.5 } else { 2.5 };
            phase += 2.0 * PI * (TICK_MS as f64 / 1000.0) / period_s;
            if phase >= 2.0 * PI {
                phase -= 2.0 * PI;
                long_cycle = !long_cycle;
            }
            det.push(t, 0.03 * phase.sin() as f32);
        }

        let regularity = det.regularity();
        assert!((0.0..=1.0).contains(&regularity));
        assert!(regularity < 0.8, "regularity {}", regularity);
        assert!((det.rate_bpm() - 15.0).abs() < 1.5, "rate {}", det.rate_bpm());
    }

    #[test]
    fn test_histories_are_bounded() {
        let config = BreathConfig::default();
        let mut det = BreathCycleDetector::new(&config);
        feed_sine(&mut det, 0, 300_000, 0.25, 0.03);

        assert!(det.cycles_detected() as usize > config.history_len);
        assert_eq!(det.interval_count(), config.history_len);
        assert_eq!(det.recent_cycles().count(), config.history_len);

        let last = det.last_cycle().unwrap();
        assert!(last.end_ts > last.start_ts);
        assert!(last.amplitude > 0.04);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut det = detector();
        feed_sine(&mut det, 0, 60_000, 0.25, 0.03);
        assert!(det.cycles_detected() > 0);

        det.reset();
        assert_eq!(det.cycles_detected(), 0);
        assert_eq!(det.rate_bpm(), 0.0);
        assert!(det.last_cycle().is_none());
    }
}
