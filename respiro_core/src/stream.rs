//! Time-windowed sample buffer for one sensor kind.
//!
//! Samples are kept in arrival order, which the stream guarantees is also
//! timestamp order: anything older than the last accepted sample is refused.
//! Memory is bounded twice, by the retention window and by a hard sample cap.

use crate::config::StreamConfig;
use crate::types::{ImuSample, SensorKind};
use crate::{Error, Result};
use std::collections::vec_deque;
use std::collections::VecDeque;

pub struct SensorStream {
    kind: SensorKind,
    samples: VecDeque<ImuSample>,
    retention_ms: u64,
    max_samples: usize,
    last_ts: Option<u64>,
}

impl SensorStream {
    /// Create a stream with its full sample capacity reserved up front.
    pub fn new(kind: SensorKind, config: &StreamConfig) -> Result<Self> {
        let mut samples = VecDeque::new();
        samples.try_reserve_exact(config.max_samples).map_err(|e| {
            Error::ResourceExhausted(format!(
                "{} stream ({} samples): {}",
                kind.as_str(),
                config.max_samples,
                e
            ))
        })?;

        Ok(Self {
            kind,
            samples,
            retention_ms: config.retention_ms,
            max_samples: config.max_samples,
            last_ts: None,
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Append a sample, evicting whatever falls out of the retention window.
    ///
    /// Returns `false` (and changes nothing) for a sample of the wrong kind or
    /// one older than the last accepted timestamp. Equal timestamps are kept.
    pub fn push(&mut self, sample: ImuSample) -> bool {
        if sample.kind != self.kind {
            return false;
        }
        if let Some(last) = self.last_ts {
            if sample.timestamp_ms < last {
                return false;
            }
        }

        if let Some(horizon) = sample.timestamp_ms.checked_sub(self.retention_ms) {
            while self
                .samples
                .front()
                .is_some_and(|s| s.timestamp_ms < horizon)
            {
                self.samples.pop_front();
            }
        }
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }

        self.samples.push_back(sample);
        self.last_ts = Some(sample.timestamp_ms);
        true
    }

    /// Read-only view of the samples newer than `latest - duration_ms`.
    pub fn window(&self, duration_ms: u64) -> StreamWindow<'_> {
        let start = match self.last_ts.and_then(|last| last.checked_sub(duration_ms)) {
            Some(cutoff) => self.samples.partition_point(|s| s.timestamp_ms <= cutoff),
            None => 0,
        };
        StreamWindow {
            samples: &self.samples,
            start,
        }
    }

    pub fn latest(&self) -> Option<&ImuSample> {
        self.samples.back()
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_ts
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all samples and the ordering watermark, keeping the allocation.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_ts = None;
    }
}

/// Borrowed view over the tail of a [`SensorStream`].
///
/// Cheap to copy; every call to [`StreamWindow::iter`] restarts from the
/// oldest sample in the view.
#[derive(Clone, Copy)]
pub struct StreamWindow<'a> {
    samples: &'a VecDeque<ImuSample>,
    start: usize,
}

impl<'a> StreamWindow<'a> {
    pub fn iter(&self) -> vec_deque::Iter<'a, ImuSample> {
        self.samples.range(self.start..)
    }

    pub fn len(&self) -> usize {
        self.samples.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Population variance of sample magnitudes; 0.0 with fewer than two samples.
    ///
    /// Accumulates in f64: squared deviations of large finite magnitudes
    /// would overflow an f32 sum.
    pub fn magnitude_variance(&self) -> f32 {
        let n = self.len();
        if n < 2 {
            return 0.0;
        }
        let magnitude = |s: &ImuSample| f64::from(s.magnitude());
        let mean = self.iter().map(magnitude).sum::<f64>() / n as f64;
        let variance = self
            .iter()
            .map(|s| {
                let d = magnitude(s) - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        variance as f32
    }
}
