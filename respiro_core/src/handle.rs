//! Owned session handle with the semantics binding layers expect.
//!
//! A handle is either live or invalid. Creating with a bad config or without
//! memory yields an invalid handle instead of an error; every ingestion call
//! on an invalid handle is a silent no-op and `get_metrics` reports
//! [`Error::InvalidHandle`] after writing the zeroed snapshot.

use crate::config::Config;
use crate::session::EngineSession;
use crate::types::MetricsSnapshot;
use crate::{Error, Result};

#[derive(Default)]
pub struct SessionHandle {
    session: Option<Box<EngineSession>>,
}

impl SessionHandle {
    /// Live handle with the default configuration.
    pub fn create() -> Self {
        Self::create_with_config(Config::default())
    }

    pub fn create_with_config(config: Config) -> Self {
        match EngineSession::new(config) {
            Ok(session) => Self {
                session: Some(Box::new(session)),
            },
            Err(e) => {
                tracing::warn!("Session creation failed, returning invalid handle: {}", e);
                Self::invalid()
            }
        }
    }

    /// A handle that never refers to a session.
    pub fn invalid() -> Self {
        Self { session: None }
    }

    pub fn is_valid(&self) -> bool {
        self.session.is_some()
    }

    /// Release the session. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.session = None;
    }

    pub fn start_session(&mut self, timestamp_ms: u64) {
        if let Some(session) = self.session.as_mut() {
            session.start_session(timestamp_ms);
        }
    }

    pub fn feed_gyro(&mut self, x: f32, y: f32, z: f32, timestamp_ms: u64) {
        if let Some(session) = self.session.as_mut() {
            session.feed_gyro(x, y, z, timestamp_ms);
        }
    }

    pub fn feed_accel(&mut self, x: f32, y: f32, z: f32, timestamp_ms: u64) {
        if let Some(session) = self.session.as_mut() {
            session.feed_accel(x, y, z, timestamp_ms);
        }
    }

    /// Write the snapshot at `timestamp_ms` into `out`.
    pub fn get_metrics(&self, timestamp_ms: u64, out: &mut MetricsSnapshot) -> Result<()> {
        match self.session.as_deref() {
            Some(session) => {
                *out = session.get_metrics(timestamp_ms);
                Ok(())
            }
            None => {
                *out = MetricsSnapshot::default();
                Err(Error::InvalidHandle)
            }
        }
    }

    /// Borrow the underlying session, if any.
    pub fn session(&self) -> Option<&EngineSession> {
        self.session.as_deref()
    }
}
