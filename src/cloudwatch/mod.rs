//! The shipper side: deliver lines to a CloudWatch Logs destination.

pub mod client;
pub mod event;
#[cfg(test)]
pub mod fake;
pub mod shipper;

use async_trait::async_trait;

use crate::config::Destination;
use event::LogEvent;

pub use client::CloudWatchSink;
pub use shipper::{ShipError, Shipper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// Events the service accepted the request for but refused to store
    /// (too old, too new or past retention).
    pub rejected: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Unable to create log group \"{group}\": {reason}")]
    CreateGroup { group: String, reason: String },
    #[error("Unable to create log stream \"{destination}\": {reason}")]
    CreateStream {
        destination: Destination,
        reason: String,
    },
    #[error("Unable to send {count} log events to \"{destination}\": {reason}")]
    PutEvents {
        destination: Destination,
        count: usize,
        reason: String,
    },
    #[error("Invalid log event: {0}")]
    InvalidEvent(String),
}

/// A log destination service. Both create calls are idempotent: an existing
/// resource is reported as [`Creation::AlreadyExists`], not as an error.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn create_group(&self, group: &str) -> Result<Creation, SinkError>;

    async fn create_stream(&self, destination: &Destination) -> Result<Creation, SinkError>;

    /// Appends `events`, which are in chronological order, to the stream.
    async fn put_events(
        &self,
        destination: &Destination,
        events: Vec<LogEvent>,
    ) -> Result<PutOutcome, SinkError>;
}
