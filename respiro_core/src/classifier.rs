//! Sleep stage classification with hysteresis.
//!
//! Each evaluation tick produces a candidate stage and a score from the
//! current breathing and movement features. The reported stage only changes
//! when the candidate agrees with it, or when the current stage has been held
//! for the minimum dwell time and the candidate has led continuously for the
//! confirmation period. Brief disturbances therefore never flip the stage.

use crate::config::ClassifierConfig;
use crate::types::SleepStage;

/// Inputs to one classification tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageFeatures {
    /// `None` until at least two breath cycles have been seen
    pub rate_bpm: Option<f32>,
    pub regularity: f32,
    pub movement: f32,
}

/// Hysteresis phase of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierPhase {
    /// The latest candidate matches the current stage.
    Settled,
    /// `candidate` has led every tick since `since_ms`.
    Confirming { candidate: SleepStage, since_ms: u64 },
}

pub struct SleepStageClassifier {
    config: ClassifierConfig,
    origin_ms: u64,
    stage: SleepStage,
    confidence: f32,
    stage_entered_ms: u64,
    phase: ClassifierPhase,
}

/// 1.0 at the center of [min, max], falling to 0.0 at either edge.
fn centered_margin(value: f32, min: f32, max: f32) -> f32 {
    let half = 0.5 * (max - min);
    if half <= 0.0 {
        return 0.0;
    }
    let mid = min + half;
    (1.0 - (value - mid).abs() / half).clamp(0.0, 1.0)
}

impl SleepStageClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            config: config.clone(),
            origin_ms: 0,
            stage: SleepStage::Unknown,
            confidence: 0.0,
            stage_entered_ms: 0,
            phase: ClassifierPhase::Settled,
        }
    }

    /// Back to Unknown with warm-up measured from `origin_ms`.
    pub fn reset(&mut self, origin_ms: u64) {
        self.origin_ms = origin_ms;
        self.stage = SleepStage::Unknown;
        self.confidence = 0.0;
        self.stage_entered_ms = origin_ms;
        self.phase = ClassifierPhase::Settled;
    }

    pub fn is_warmed_up(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.origin_ms) >= self.config.warmup_ms
    }

    /// Candidate stage for `features` and its score in [0, 1].
    pub fn candidate(&self, features: &StageFeatures) -> (SleepStage, f32) {
        let c = &self.config;
        let Some(rate) = features.rate_bpm else {
            return (SleepStage::Unknown, 0.0);
        };
        let movement = features.movement.clamp(0.0, 1.0);
        let regularity = features.regularity.clamp(0.0, 1.0);

        if movement >= c.awake_movement_threshold {
            let span = (1.0 - c.awake_movement_threshold).max(f32::EPSILON);
            let excess = ((movement - c.awake_movement_threshold) / span).clamp(0.0, 1.0);
            return (SleepStage::Awake, 0.5 + 0.5 * excess);
        }

        if movement < c.sleep_movement_threshold {
            let stillness = 1.0 - movement / c.sleep_movement_threshold.max(f32::EPSILON);
            let in_deep_rate = (c.deep_rate_min_bpm..=c.deep_rate_max_bpm).contains(&rate);
            if regularity >= c.deep_min_regularity && in_deep_rate {
                let steadiness = ((regularity - c.deep_min_regularity)
                    / (1.0 - c.deep_min_regularity).max(f32::EPSILON))
                .clamp(0.0, 1.0);
                let pace = centered_margin(rate, c.deep_rate_min_bpm, c.deep_rate_max_bpm);
                let margin = (stillness + steadiness + pace) / 3.0;
                return (SleepStage::DeepSleep, 0.5 + 0.5 * margin);
            }

            let in_rem_rate = (c.rem_rate_min_bpm..=c.rem_rate_max_bpm).contains(&rate);
            let in_rem_regularity =
                regularity >= c.rem_min_regularity && regularity < c.rem_max_regularity;
            if in_rem_rate && in_rem_regularity {
                let variability =
                    centered_margin(regularity, c.rem_min_regularity, c.rem_max_regularity);
                let pace = centered_margin(rate, c.rem_rate_min_bpm, c.rem_rate_max_bpm);
                let margin = (stillness + variability + pace) / 3.0;
                return (SleepStage::RemSleep, 0.5 + 0.5 * margin);
            }
        }

        let calm = 1.0 - movement / c.awake_movement_threshold.max(f32::EPSILON);
        (SleepStage::LightSleep, (0.4 + 0.3 * calm).clamp(0.0, 1.0))
    }

    /// One classification tick at ingestion time `now_ms`.
    pub fn evaluate(&mut self, now_ms: u64, features: &StageFeatures) -> SleepStage {
        if !self.is_warmed_up(now_ms) {
            return self.stage;
        }

        let (candidate, score) = self.candidate(features);
        if candidate == self.stage {
            self.phase = ClassifierPhase::Settled;
            self.confidence = score;
            return self.stage;
        }

        if self.stage == SleepStage::Unknown {
            self.transition(candidate, score, now_ms);
            return self.stage;
        }

        let since_ms = match self.phase {
            ClassifierPhase::Confirming {
                candidate: pending,
                since_ms,
            } if pending == candidate => since_ms,
            _ => now_ms,
        };
        self.phase = ClassifierPhase::Confirming {
            candidate,
            since_ms,
        };

        let dwell = now_ms.saturating_sub(self.stage_entered_ms);
        let led = now_ms.saturating_sub(since_ms);
        if dwell >= self.config.min_dwell_ms && led >= self.config.confirmation_ms {
            self.transition(candidate, score, now_ms);
        } else {
            self.confidence = score * self.config.pending_confidence_discount;
        }
        self.stage
    }

    fn transition(&mut self, stage: SleepStage, score: f32, now_ms: u64) {
        tracing::debug!(
            "Stage {} -> {} at {}ms (confidence {:.2})",
            self.stage,
            stage,
            now_ms,
            score
        );
        self.stage = stage;
        self.confidence = score;
        self.stage_entered_ms = now_ms;
        self.phase = ClassifierPhase::Settled;
    }

    /// Stage and confidence as reported at query time `now_ms`.
    pub fn output(&self, now_ms: u64) -> (SleepStage, f32) {
        if !self.is_warmed_up(now_ms) {
            return (SleepStage::Unknown, 0.0);
        }
        (self.stage, self.confidence.clamp(0.0, 1.0))
    }

    pub fn stage(&self) -> SleepStage {
        self.stage
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn phase(&self) -> ClassifierPhase {
        self.phase
    }

    pub fn stage_entered_ms(&self) -> u64 {
        self.stage_entered_ms
    }
}
