//! Respiratory band extraction and movement energy.
//!
//! Each sensor channel is reduced to its vector magnitude, then:
//! - a high-pass stage subtracts a slow moving average (gravity, drift, bias)
//! - a low-pass stage smooths away noise above the breathing band
//!
//! Both stages are one-pole exponential filters whose coefficients come from
//! the real inter-sample interval, so irregular arrival does not distort the
//! band. Updates are O(1) per sample with no history kept here.
//!
//! Movement energy deliberately skips all filtering: it is the variance of the
//! raw magnitudes over a short window, so it keeps the motion artifacts the
//! respiratory band suppresses.

use crate::config::FilterConfig;
use crate::stream::StreamWindow;
use crate::types::{ImuSample, SensorKind};

/// One value of the fused respiratory-band signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespiratorySample {
    pub timestamp_ms: u64,
    pub value: f32,
}

/// Cutoff frequency to the matching one-pole time constant, in ms.
fn time_constant_ms(cutoff_hz: f32) -> f32 {
    1000.0 / (2.0 * std::f32::consts::PI * cutoff_hz)
}

/// Fraction of the gap to the input an EMA covers after `dt_ms`.
fn ema_alpha(dt_ms: f32, tau_ms: f32) -> f32 {
    1.0 - (-dt_ms / tau_ms).exp()
}

/// Band filter state for one sensor channel.
#[derive(Debug, Clone)]
struct ChannelFilter {
    highpass_tau_ms: f32,
    lowpass_tau_ms: f32,
    /// Slow average of the magnitude; what the high-pass removes.
    baseline: f32,
    /// Current respiratory-band output.
    band: f32,
    last_ts: Option<u64>,
}

impl ChannelFilter {
    fn new(config: &FilterConfig) -> Self {
        Self {
            highpass_tau_ms: time_constant_ms(config.highpass_cutoff_hz),
            lowpass_tau_ms: time_constant_ms(config.lowpass_cutoff_hz),
            baseline: 0.0,
            band: 0.0,
            last_ts: None,
        }
    }

    fn update(&mut self, magnitude: f32, timestamp_ms: u64) -> f32 {
        if !magnitude.is_finite() {
            return self.band;
        }
        match self.last_ts {
            // Seed the baseline so the first sample does not ring the filter.
            None => {
                self.baseline = magnitude;
                self.band = 0.0;
            }
            Some(prev) => {
                let dt = timestamp_ms.saturating_sub(prev) as f32;
                self.baseline += ema_alpha(dt, self.highpass_tau_ms) * (magnitude - self.baseline);
                let highpassed = magnitude - self.baseline;
                self.band += ema_alpha(dt, self.lowpass_tau_ms) * (highpassed - self.band);
            }
        }
        self.last_ts = Some(timestamp_ms);
        self.band
    }

    fn reset(&mut self) {
        self.baseline = 0.0;
        self.band = 0.0;
        self.last_ts = None;
    }
}

/// Fuses accelerometer and gyroscope channels into one respiratory signal.
#[derive(Debug, Clone)]
pub struct MotionFilter {
    accel: ChannelFilter,
    gyro: ChannelFilter,
    accel_weight: f32,
    gyro_weight: f32,
    movement_window_ms: u64,
}

impl MotionFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            accel: ChannelFilter::new(config),
            gyro: ChannelFilter::new(config),
            accel_weight: config.accel_weight,
            gyro_weight: config.gyro_weight,
            movement_window_ms: config.movement_window_ms,
        }
    }

    /// Advance the channel of `sample` and return the fused band value.
    ///
    /// The other channel contributes its latest output unchanged; a channel
    /// that never received data contributes zero.
    pub fn process(&mut self, sample: &ImuSample) -> RespiratorySample {
        let magnitude = sample.magnitude();
        match sample.kind {
            SensorKind::Accel => self.accel.update(magnitude, sample.timestamp_ms),
            SensorKind::Gyro => self.gyro.update(magnitude, sample.timestamp_ms),
        };

        RespiratorySample {
            timestamp_ms: sample.timestamp_ms,
            value: self.accel_weight * self.accel.band + self.gyro_weight * self.gyro.band,
        }
    }

    /// Raw movement energy: magnitude variance of both channels combined.
    pub fn movement_energy(accel: StreamWindow<'_>, gyro: StreamWindow<'_>) -> f32 {
        accel.magnitude_variance() + gyro.magnitude_variance()
    }

    /// Window the caller should hand to [`MotionFilter::movement_energy`].
    pub fn movement_window_ms(&self) -> u64 {
        self.movement_window_ms
    }

    pub fn reset(&mut self) {
        self.accel.reset();
        self.gyro.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::stream::SensorStream;
    use std::f32::consts::PI;

    const GRAVITY: f32 = 9.81;

    fn accel_at(t_ms: u64, offset: f32) -> ImuSample {
        ImuSample::accel(0.3, 0.2, GRAVITY + offset, t_ms)
    }

    /// Peak |output| over the last `tail_ms` of a sinusoid run at 50 Hz.
    fn peak_response(freq_hz: f32, amplitude: f32, duration_ms: u64, tail_ms: u64) -> f32 {
        let mut filter = MotionFilter::new(&FilterConfig::default());
        let mut peak: f32 = 0.0;
        for t in (0..duration_ms).step_by(20) {
            let secs = t as f32 / 1000.0;
            let offset = amplitude * (2.0 * PI * freq_hz * secs).sin();
            let out = filter.process(&accel_at(t, offset)).value;
            if t >= duration_ms - tail_ms {
                peak = peak.max(out.abs());
            }
        }
        peak / FilterConfig::default().accel_weight
    }

    #[test]
    fn test_constant_gravity_gives_zero_band() {
        let mut filter = MotionFilter::new(&FilterConfig::default());
        let mut last = 1.0;
        for t in (0..30_000).step_by(20) {
            last = filter.process(&accel_at(t, 0.0)).value;
        }
        assert!(last.abs() < 1e-4);
    }

    #[test]
    fn test_breathing_band_passes() {
        let peak = peak_response(0.25, 0.05, 90_000, 20_000);
        assert!(peak > 0.8 * 0.05, "0.25 Hz should pass, got {}", peak);
        assert!(peak < 1.05 * 0.05);
    }

    #[test]
    fn test_fast_noise_is_attenuated() {
        let peak = peak_response(5.0, 0.05, 30_000, 10_000);
        assert!(peak < 0.2 * 0.05, "5 Hz should be suppressed, got {}", peak);
    }

    #[test]
    fn test_orientation_change_decays() {
        let mut filter = MotionFilter::new(&FilterConfig::default());
        for t in (0..10_000).step_by(20) {
            filter.process(&accel_at(t, 0.0));
        }
        // Magnitude jumps by 0.5 and stays there.
        let mut last = 0.0;
        for t in (10_000..70_000).step_by(20) {
            last = filter.process(&accel_at(t, 0.5)).value;
        }
        assert!(last.abs() < 0.01, "drift should be removed, got {}", last);
    }

    #[test]
    fn test_fusion_weights_channels() {
        let config = FilterConfig::default();
        let mut filter = MotionFilter::new(&config);
        filter.process(&accel_at(0, 0.0));
        let out = filter.process(&accel_at(500, 1.0));
        assert!(out.value > 0.0);
        assert_eq!(out.timestamp_ms, 500);

        let accel_only = out.value;
        let fused = filter.process(&ImuSample::gyro(0.02, 0.0, 0.0, 500)).value;
        // First gyro sample seeds its channel at zero output.
        assert_eq!(fused, accel_only);
        let after_gyro = filter.process(&ImuSample::gyro(0.5, 0.0, 0.0, 1_000)).value;
        assert!(after_gyro > accel_only * 0.5);
    }

    #[test]
    fn test_movement_energy_combines_channels() {
        let stream_config = StreamConfig::default();
        let mut accel = SensorStream::new(SensorKind::Accel, &stream_config).unwrap();
        let mut gyro = SensorStream::new(SensorKind::Gyro, &stream_config).unwrap();

        for (i, t) in (0..2_000).step_by(20).enumerate() {
            let jolt = if i % 2 == 0 { 1.0 } else { -1.0 };
            accel.push(ImuSample::accel(0.0, 0.0, GRAVITY + jolt, t));
            gyro.push(ImuSample::gyro(0.0, 0.0, 0.1, t));
        }

        let energy = MotionFilter::movement_energy(accel.window(2_000), gyro.window(2_000));
        assert!((energy - 1.0).abs() < 0.05, "energy {}", energy);

        let quiet = MotionFilter::movement_energy(gyro.window(2_000), gyro.window(2_000));
        assert!(quiet < 1e-6);
    }

    #[test]
    fn test_overflowing_magnitude_leaves_band_intact() {
        let mut filter = MotionFilter::new(&FilterConfig::default());
        for t in (0..10_000).step_by(20) {
            filter.process(&accel_at(t, 0.0));
        }
        let before = filter.process(&accel_at(10_000, 0.0)).value;

        // 1e20² overflows f32, so the magnitude is infinite.
        let out = filter.process(&ImuSample::accel(1e20, 0.0, 0.0, 10_020)).value;
        assert_eq!(out, before);

        // Breathing is still tracked afterwards.
        let peak = (10_040..70_000)
            .step_by(20)
            .map(|t| {
                let secs = t as f32 / 1000.0;
                let offset = 0.05 * (2.0 * PI * 0.25 * secs).sin();
                filter.process(&accel_at(t, offset)).value.abs()
            })
            .fold(0.0_f32, f32::max);
        assert!(peak.is_finite() && peak > 0.02, "peak {}", peak);
    }

    #[test]
    fn test_reset_reseeds_baseline() {
        let mut filter = MotionFilter::new(&FilterConfig::default());
        filter.process(&accel_at(0, 0.0));
        filter.process(&accel_at(1_000, 3.0));
        filter.reset();
        let out = filter.process(&accel_at(2_000, 3.0));
        assert_eq!(out.value, 0.0);
    }
}
