//! Deterministic synthetic sensor streams.
//!
//! A [`SignalBuilder`] lays down consecutive segments (breathing, still,
//! restless) as interleaved accelerometer and gyroscope samples at a fixed
//! rate. The same seed always yields the same samples.

use crate::types::ImuSample;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

pub const GRAVITY: f32 = 9.81;

/// Resting device tilt: gravity is mostly, not exactly, on z.
const REST_X: f32 = 0.3;
const REST_Y: f32 = 0.2;
/// Gyro bias, kept clear of zero so the magnitude follows the breathing sway.
const GYRO_BIAS_X: f32 = 0.02;
const GYRO_BIAS_Y: f32 = 0.01;
const GYRO_SWAY: f32 = 0.005;

pub struct SignalBuilder {
    rng: StdRng,
    sample_interval_ms: u64,
    amplitude: f32,
    jitter: f32,
    cursor_ms: u64,
    phase: f64,
    samples: Vec<ImuSample>,
}

impl SignalBuilder {
    /// 50 Hz, 0.05 m/s² chest excursion, no jitter, starting at t = 0.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sample_interval_ms: 20,
            amplitude: 0.05,
            jitter: 0.0,
            cursor_ms: 0,
            phase: 0.0,
            samples: Vec::new(),
        }
    }

    pub fn starting_at(mut self, timestamp_ms: u64) -> Self {
        self.cursor_ms = timestamp_ms;
        self
    }

    pub fn sample_rate_hz(mut self, hz: u32) -> Self {
        self.sample_interval_ms = (1000 / u64::from(hz.max(1))).max(1);
        self
    }

    /// Peak accelerometer excursion of a breath, in m/s².
    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Per-cycle period variation: each breath lasts the nominal period
    /// scaled by a uniform factor in `1 ± fraction`.
    pub fn jitter(mut self, fraction: f32) -> Self {
        self.jitter = fraction.clamp(0.0, 0.9);
        self
    }

    fn cycle_period_ms(&mut self, nominal_ms: f64) -> f64 {
        if self.jitter > 0.0 {
            let factor = 1.0 + f64::from(self.jitter) * self.rng.random_range(-1.0..1.0);
            nominal_ms * factor
        } else {
            nominal_ms
        }
    }

    fn push_tick(&mut self, accel: [f32; 3], gyro: [f32; 3]) {
        let t = self.cursor_ms;
        self.samples.push(ImuSample::accel(accel[0], accel[1], accel[2], t));
        self.samples.push(ImuSample::gyro(gyro[0], gyro[1], gyro[2], t));
        self.cursor_ms += self.sample_interval_ms;
    }

    /// Sinusoidal chest motion at `rate_bpm` for `duration_ms`.
    pub fn breathing(mut self, duration_ms: u64, rate_bpm: f32) -> Self {
        let nominal_ms = 60_000.0 / f64::from(rate_bpm.max(0.1));
        let mut period_ms = self.cycle_period_ms(nominal_ms);
        let end = self.cursor_ms + duration_ms;

        while self.cursor_ms < end {
            let sway = self.phase.sin() as f32;
            self.push_tick(
                [REST_X, REST_Y, GRAVITY + self.amplitude * sway],
                [GYRO_BIAS_X + GYRO_SWAY * sway, GYRO_BIAS_Y, 0.0],
            );

            self.phase += TAU * self.sample_interval_ms as f64 / period_ms;
            if self.phase >= TAU {
                self.phase -= TAU;
                period_ms = self.cycle_period_ms(nominal_ms);
            }
        }
        self
    }

    /// Device at rest: no breathing motion and no movement.
    pub fn still(mut self, duration_ms: u64) -> Self {
        let end = self.cursor_ms + duration_ms;
        while self.cursor_ms < end {
            self.push_tick(
                [REST_X, REST_Y, GRAVITY],
                [GYRO_BIAS_X, GYRO_BIAS_Y, 0.0],
            );
        }
        self
    }

    /// Vigorous random motion; `magnitude` is the per-axis bound in m/s².
    pub fn restless(mut self, duration_ms: u64, magnitude: f32) -> Self {
        let end = self.cursor_ms + duration_ms;
        while self.cursor_ms < end {
            let mut jolt = || magnitude * self.rng.random_range(-1.0f32..1.0);
            let accel = [REST_X + jolt(), REST_Y + jolt(), GRAVITY + jolt()];
            let gyro = [0.5 * jolt(), 0.5 * jolt(), 0.5 * jolt()];
            self.push_tick(accel, gyro);
        }
        self
    }

    /// Timestamp the next segment would start at.
    pub fn end_ms(&self) -> u64 {
        self.cursor_ms
    }

    pub fn build(self) -> Vec<ImuSample> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorKind;

    #[test]
    fn test_segments_are_contiguous_and_interleaved() {
        let builder = SignalBuilder::new(1)
            .starting_at(1_000)
            .breathing(2_000, 15.0)
            .still(1_000)
            .restless(1_000, 1.0);
        assert_eq!(builder.end_ms(), 5_000);

        let samples = builder.build();
        assert_eq!(samples.len(), 2 * 200);
        assert_eq!(samples[0].kind, SensorKind::Accel);
        assert_eq!(samples[1].kind, SensorKind::Gyro);
        assert_eq!(samples[0].timestamp_ms, 1_000);
        assert!(samples
            .windows(2)
            .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }

    #[test]
    fn test_same_seed_same_samples() {
        let make = |seed| {
            SignalBuilder::new(seed)
                .jitter(0.3)
                .breathing(30_000, 14.0)
                .restless(5_000, 2.0)
                .build()
        };
        assert_eq!(make(7), make(7));
        assert_ne!(make(7), make(8));
    }

    #[test]
    fn test_breathing_excursion() {
        let samples = SignalBuilder::new(0).breathing(8_000, 15.0).build();
        let z: Vec<f32> = samples
            .iter()
            .filter(|s| s.kind == SensorKind::Accel)
            .map(|s| s.z)
            .collect();
        let max = z.iter().cloned().fold(f32::MIN, f32::max);
        let min = z.iter().cloned().fold(f32::MAX, f32::min);
        assert!((max - GRAVITY - 0.05).abs() < 1e-3);
        assert!((GRAVITY - min - 0.05).abs() < 1e-3);
    }

    #[test]
    fn test_still_is_constant() {
        let samples = SignalBuilder::new(0).still(2_000).build();
        assert!(samples
            .iter()
            .filter(|s| s.kind == SensorKind::Accel)
            .all(|s| s.z == GRAVITY));
    }
}
