//! Possible-apnea detection: a long gap between breath cycles while the
//! sleeper is lying still.
//!
//! A gap with movement is not flagged; turning over routinely hides a few
//! breaths from the respiratory band.
//!
//! Nothing is flagged before the first breath cycle of a session. A device
//! that is motionless from the start is treated as not yet worn, not as a
//! sleeper who never breathed.

use crate::config::ApneaConfig;

/// Apnea tracking state carried between ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApneaState {
    /// End of the most recent breath cycle
    pub last_cycle_ts: Option<u64>,
    /// Highest movement intensity seen since that cycle
    pub peak_movement_since_cycle: f32,
    pub flagged: bool,
}

pub struct ApneaDetector {
    config: ApneaConfig,
    state: ApneaState,
}

impl ApneaDetector {
    pub fn new(config: &ApneaConfig) -> Self {
        Self {
            config: config.clone(),
            state: ApneaState::default(),
        }
    }

    /// Whether the situation at `now_ms` looks like a breathing pause.
    ///
    /// Always `false` without a previous cycle to measure the gap from.
    pub fn evaluate(
        config: &ApneaConfig,
        now_ms: u64,
        last_cycle_ts: Option<u64>,
        peak_movement: f32,
    ) -> bool {
        match last_cycle_ts {
            Some(last) => {
                now_ms.saturating_sub(last) > config.gap_threshold_ms
                    && peak_movement < config.low_movement_threshold
            }
            None => false,
        }
    }

    /// Track the movement intensity of the current tick.
    pub fn observe_movement(&mut self, intensity: f32) {
        if intensity > self.state.peak_movement_since_cycle {
            self.state.peak_movement_since_cycle = intensity;
        }
    }

    /// A breath cycle ended at `end_ts`; clears any pending flag.
    pub fn record_cycle(&mut self, end_ts: u64) {
        if self.state.flagged {
            tracing::info!("Breathing resumed at {}ms, apnea flag cleared", end_ts);
            self.state.flagged = false;
        }
        self.state.last_cycle_ts = Some(end_ts);
        self.state.peak_movement_since_cycle = 0.0;
    }

    /// Re-evaluate at ingestion time, logging flag transitions.
    pub fn update(&mut self, now_ms: u64) -> bool {
        let flagged = self.check(now_ms);
        if flagged != self.state.flagged {
            if flagged {
                tracing::info!(
                    "Possible apnea: no breath cycle for {}ms with movement below {:.2}",
                    now_ms.saturating_sub(self.state.last_cycle_ts.unwrap_or(now_ms)),
                    self.config.low_movement_threshold
                );
            } else {
                tracing::info!("Apnea flag cleared by movement at {}ms", now_ms);
            }
            self.state.flagged = flagged;
        }
        flagged
    }

    /// Evaluate at an arbitrary query time without touching state.
    pub fn check(&self, now_ms: u64) -> bool {
        Self::evaluate(
            &self.config,
            now_ms,
            self.state.last_cycle_ts,
            self.state.peak_movement_since_cycle,
        )
    }

    pub fn state(&self) -> &ApneaState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = ApneaState::default();
    }
}
