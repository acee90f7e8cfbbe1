//! Core domain types for the RespiroSync engine.
//!
//! This module defines the fundamental types used throughout the pipeline:
//! - Raw motion samples and their sensor kind
//! - Detected breath cycles
//! - Sleep stages and the metrics snapshot handed to callers

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Sensor Types
// ============================================================================

/// Which motion sensor produced a sample
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Gyro,
    Accel,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Gyro => "gyro",
            SensorKind::Accel => "accel",
        }
    }
}

/// A single timestamped 3-axis sample.
///
/// Accelerometer values are in m/s² and gyroscope values in rad/s, or
/// whatever device-native units the caller feeds consistently. No bias
/// correction is ever applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub kind: SensorKind,
    pub timestamp_ms: u64,
}

impl ImuSample {
    pub fn new(kind: SensorKind, x: f32, y: f32, z: f32, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            z,
            kind,
            timestamp_ms,
        }
    }

    pub fn accel(x: f32, y: f32, z: f32, timestamp_ms: u64) -> Self {
        Self::new(SensorKind::Accel, x, y, z, timestamp_ms)
    }

    pub fn gyro(x: f32, y: f32, z: f32, timestamp_ms: u64) -> Self {
        Self::new(SensorKind::Gyro, x, y, z, timestamp_ms)
    }

    /// Vector norm of the three axes.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// False if any axis is NaN or infinite, or the magnitude overflows.
    pub fn is_finite(&self) -> bool {
        self.magnitude().is_finite()
    }
}

// ============================================================================
// Breathing Types
// ============================================================================

/// One complete inhale-exhale oscillation found in the respiratory signal
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreathCycle {
    /// Rising crossing of the upper threshold (inhale onset)
    pub start_ts: u64,
    /// Falling crossing of the lower threshold (exhale complete)
    pub end_ts: u64,
    /// Peak-to-trough excursion of the respiratory signal
    pub amplitude: f32,
}

impl BreathCycle {
    pub fn duration_ms(&self) -> u64 {
        self.end_ts.saturating_sub(self.start_ts)
    }
}

// ============================================================================
// Sleep Stage and Metrics
// ============================================================================

/// Sleep stage classification
///
/// Discriminants are the stage codes exposed to binding layers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Awake = 0,
    LightSleep = 1,
    DeepSleep = 2,
    RemSleep = 3,
    #[default]
    Unknown = 4,
}

impl SleepStage {
    /// Stable numeric code for binding layers.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Inverse of [`SleepStage::code`]. Unrecognized codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SleepStage::Awake,
            1 => SleepStage::LightSleep,
            2 => SleepStage::DeepSleep,
            3 => SleepStage::RemSleep,
            _ => SleepStage::Unknown,
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            SleepStage::Awake => "Awake",
            SleepStage::LightSleep => "Light Sleep",
            SleepStage::DeepSleep => "Deep Sleep",
            SleepStage::RemSleep => "REM Sleep",
            SleepStage::Unknown => "Unknown",
        }
    }

    pub fn is_asleep(&self) -> bool {
        matches!(
            self,
            SleepStage::LightSleep | SleepStage::DeepSleep | SleepStage::RemSleep
        )
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time view of a session's metrics
///
/// "No answer yet" is `Unknown` with zero confidence, never a missing value.
/// The `Default` value is the zeroed snapshot written for invalid handles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub current_stage: SleepStage,
    /// Heuristic confidence in `current_stage`, 0.0 – 1.0
    pub confidence: f32,
    /// Breaths per minute, 0.0 while unavailable
    pub breathing_rate_bpm: f32,
    /// 0.0 – 1.0, higher means more consistent cycle timing
    pub breathing_regularity: f32,
    /// 0.0 – 1.0, higher means more movement
    pub movement_intensity: f32,
    pub breath_cycles_detected: u32,
    pub possible_apnea: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_codes_roundtrip() {
        for stage in [
            SleepStage::Awake,
            SleepStage::LightSleep,
            SleepStage::DeepSleep,
            SleepStage::RemSleep,
            SleepStage::Unknown,
        ] {
            assert_eq!(SleepStage::from_code(stage.code()), stage);
        }
        assert_eq!(SleepStage::Unknown.code(), 4);
        assert_eq!(SleepStage::from_code(42), SleepStage::Unknown);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(SleepStage::RemSleep.to_string(), "REM Sleep");
        assert_eq!(SleepStage::LightSleep.label(), "Light Sleep");
        assert!(SleepStage::DeepSleep.is_asleep());
        assert!(!SleepStage::Awake.is_asleep());
        assert!(!SleepStage::Unknown.is_asleep());
    }

    #[test]
    fn test_default_snapshot_is_no_answer() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.current_stage, SleepStage::Unknown);
        assert_eq!(snapshot.confidence, 0.0);
        assert_eq!(snapshot.breath_cycles_detected, 0);
        assert!(!snapshot.possible_apnea);
    }

    #[test]
    fn test_sample_magnitude_and_finiteness() {
        let sample = ImuSample::accel(3.0, 4.0, 0.0, 10);
        assert!((sample.magnitude() - 5.0).abs() < 1e-6);
        assert!(sample.is_finite());
        assert!(!ImuSample::gyro(f32::NAN, 0.0, 0.0, 10).is_finite());
        assert!(!ImuSample::gyro(0.0, f32::INFINITY, 0.0, 10).is_finite());
        assert!(!ImuSample::accel(1e20, 0.0, 0.0, 10).is_finite());
    }

    #[test]
    fn test_snapshot_serializes_snake_case_stage() {
        let snapshot = MetricsSnapshot {
            current_stage: SleepStage::DeepSleep,
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"deep_sleep\""));
    }
}
