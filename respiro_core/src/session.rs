//! Engine session: owns every buffer and detector for one monitoring session.
//!
//! Ingestion pipeline, per accepted sample:
//! 1. Reject samples whose magnitude is not finite, and samples older than
//!    their stream's newest
//! 2. Push into the stream for that sensor kind
//! 3. Advance the motion filter and feed breath detection and apnea tracking
//! 4. On each evaluation tick, recompute movement energy over the stream
//!    windows, then run the classifier
//!
//! Movement energy walks both stream windows, so it is only computed on
//! evaluation ticks; per-sample work stays O(1) amortized.
//!
//! Queries never mutate the session, so `get_metrics` may be called at any
//! rate without changing what later queries return.

use crate::apnea::ApneaDetector;
use crate::breath::BreathCycleDetector;
use crate::classifier::{SleepStageClassifier, StageFeatures};
use crate::config::Config;
use crate::filter::MotionFilter;
use crate::movement::MovementIntensityEstimator;
use crate::stream::SensorStream;
use crate::types::{BreathCycle, ImuSample, MetricsSnapshot, SensorKind};
use crate::Result;

pub struct EngineSession {
    config: Config,
    accel: SensorStream,
    gyro: SensorStream,
    filter: MotionFilter,
    breath: BreathCycleDetector,
    movement: MovementIntensityEstimator,
    apnea: ApneaDetector,
    classifier: SleepStageClassifier,
    origin_ms: Option<u64>,
    /// Newest timestamp across both streams; drives everything downstream.
    last_tick_ms: u64,
    next_evaluation_ms: u64,
    samples_accepted: u64,
    samples_dropped: u64,
}

impl EngineSession {
    /// Allocate a session for `config`.
    ///
    /// Fails on an inconsistent config or when the sample buffers cannot be
    /// reserved.
    pub fn new(config: Config) -> Result<Self> {
        if let Err(e) = config.validate() {
            tracing::warn!("Refusing to create session: {}", e);
            return Err(e);
        }

        Ok(Self {
            accel: SensorStream::new(SensorKind::Accel, &config.stream)?,
            gyro: SensorStream::new(SensorKind::Gyro, &config.stream)?,
            filter: MotionFilter::new(&config.filter),
            breath: BreathCycleDetector::new(&config.breath),
            movement: MovementIntensityEstimator::new(&config.movement),
            apnea: ApneaDetector::new(&config.apnea),
            classifier: SleepStageClassifier::new(&config.classifier),
            origin_ms: None,
            last_tick_ms: 0,
            next_evaluation_ms: 0,
            samples_accepted: 0,
            samples_dropped: 0,
            config,
        })
    }

    /// Begin a new session at `timestamp_ms`, discarding all prior state.
    pub fn start_session(&mut self, timestamp_ms: u64) {
        self.accel.reset();
        self.gyro.reset();
        self.filter.reset();
        self.breath.reset();
        self.movement.reset();
        self.apnea.reset();
        self.set_origin(timestamp_ms);
        self.last_tick_ms = timestamp_ms;
        self.samples_accepted = 0;
        self.samples_dropped = 0;
        tracing::info!("Session started at {}ms", timestamp_ms);
    }

    fn set_origin(&mut self, timestamp_ms: u64) {
        self.origin_ms = Some(timestamp_ms);
        self.classifier.reset(timestamp_ms);
        self.next_evaluation_ms = timestamp_ms;
    }

    pub fn feed_gyro(&mut self, x: f32, y: f32, z: f32, timestamp_ms: u64) -> bool {
        self.feed(ImuSample::gyro(x, y, z, timestamp_ms))
    }

    pub fn feed_accel(&mut self, x: f32, y: f32, z: f32, timestamp_ms: u64) -> bool {
        self.feed(ImuSample::accel(x, y, z, timestamp_ms))
    }

    /// Ingest one sample. Returns `false` when the sample was dropped.
    pub fn feed(&mut self, sample: ImuSample) -> bool {
        if !sample.is_finite() {
            tracing::trace!(
                "Dropped non-finite {} sample at {}ms",
                sample.kind.as_str(),
                sample.timestamp_ms
            );
            self.samples_dropped += 1;
            return false;
        }

        let stream = match sample.kind {
            SensorKind::Accel => &mut self.accel,
            SensorKind::Gyro => &mut self.gyro,
        };
        if !stream.push(sample) {
            tracing::trace!(
                "Dropped out-of-order {} sample at {}ms (last {:?})",
                sample.kind.as_str(),
                sample.timestamp_ms,
                stream.last_timestamp()
            );
            self.samples_dropped += 1;
            return false;
        }

        if self.origin_ms.is_none() {
            self.set_origin(sample.timestamp_ms);
        }
        let tick = sample.timestamp_ms.max(self.last_tick_ms);
        self.last_tick_ms = tick;

        let band = self.filter.process(&sample);
        if band.value.is_finite() {
            if let Some(cycle) = self.breath.push(tick, band.value) {
                self.apnea.record_cycle(cycle.end_ts);
            }
        }

        if tick >= self.next_evaluation_ms {
            let window_ms = self.filter.movement_window_ms();
            let energy = MotionFilter::movement_energy(
                self.accel.window(window_ms),
                self.gyro.window(window_ms),
            );
            let intensity = self.movement.update(tick, energy);
            self.apnea.observe_movement(intensity);

            let features = self.features();
            self.classifier.evaluate(tick, &features);
            let interval = self.config.classifier.evaluation_interval_ms;
            let behind = (tick - self.next_evaluation_ms) % interval;
            self.next_evaluation_ms = tick.saturating_add(interval - behind);
        }
        self.apnea.update(tick);

        self.samples_accepted += 1;
        true
    }

    fn features(&self) -> StageFeatures {
        StageFeatures {
            rate_bpm: self.breath.has_rate().then(|| self.breath.rate_bpm()),
            regularity: self.breath.regularity(),
            movement: self.movement.intensity(),
        }
    }

    /// Snapshot of the session as seen at `timestamp_ms`.
    ///
    /// Rate, regularity, movement and cycle count are always the latest
    /// ingested values. Only the warm-up gate and the apnea gap are measured
    /// against `timestamp_ms`, so a query older than the newest sample does
    /// not rewind the estimates.
    pub fn get_metrics(&self, timestamp_ms: u64) -> MetricsSnapshot {
        if self.origin_ms.is_some() && timestamp_ms < self.last_tick_ms {
            tracing::debug!(
                "Metrics queried at {}ms report estimates as of {}ms",
                timestamp_ms,
                self.last_tick_ms
            );
        }
        let (current_stage, confidence) = match self.origin_ms {
            Some(_) => self.classifier.output(timestamp_ms),
            None => Default::default(),
        };

        MetricsSnapshot {
            current_stage,
            confidence,
            breathing_rate_bpm: self.breath.rate_bpm(),
            breathing_regularity: self.breath.regularity(),
            movement_intensity: self.movement.intensity(),
            breath_cycles_detected: self.breath.cycles_detected(),
            possible_apnea: self.apnea.check(timestamp_ms),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warm-up reference point; `None` until started or fed.
    pub fn origin_ms(&self) -> Option<u64> {
        self.origin_ms
    }

    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted
    }

    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }

    /// Most recent breath cycles, oldest first.
    pub fn recent_cycles(&self) -> impl Iterator<Item = &BreathCycle> {
        self.breath.recent_cycles()
    }
}
