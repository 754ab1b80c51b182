//! In-memory log destination for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::event::LogEvent;
use super::{Creation, LogSink, PutOutcome, SinkError};
use crate::config::Destination;
use crate::container::fake::Journal;

#[derive(Default)]
pub struct FakeSink {
    journal: Journal,
    groups: Mutex<HashSet<String>>,
    streams: Mutex<HashSet<(String, String)>>,
    events: Mutex<Vec<LogEvent>>,
    batches: Mutex<Vec<usize>>,
    /// Refuse every request after this many successful puts.
    pub fail_after: Option<usize>,
    /// Report this many rejected events on each put.
    pub reject: usize,
}

impl FakeSink {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSink for FakeSink {
    async fn create_group(&self, group: &str) -> Result<Creation, SinkError> {
        self.journal.record("sink:create_group");
        if self.groups.lock().unwrap().insert(group.to_string()) {
            Ok(Creation::Created)
        } else {
            Ok(Creation::AlreadyExists)
        }
    }

    async fn create_stream(&self, destination: &Destination) -> Result<Creation, SinkError> {
        self.journal.record("sink:create_stream");
        if !self.groups.lock().unwrap().contains(&destination.group) {
            return Err(SinkError::CreateStream {
                destination: destination.clone(),
                reason: "ResourceNotFoundException: The specified log group does not exist."
                    .to_string(),
            });
        }
        let key = (destination.group.clone(), destination.stream.clone());
        if self.streams.lock().unwrap().insert(key) {
            Ok(Creation::Created)
        } else {
            Ok(Creation::AlreadyExists)
        }
    }

    async fn put_events(
        &self,
        destination: &Destination,
        events: Vec<LogEvent>,
    ) -> Result<PutOutcome, SinkError> {
        self.journal.record("sink:put");
        let key = (destination.group.clone(), destination.stream.clone());
        let refused = match self.fail_after {
            Some(limit) => self.batches.lock().unwrap().len() >= limit,
            None => false,
        };
        if refused || !self.streams.lock().unwrap().contains(&key) {
            return Err(SinkError::PutEvents {
                destination: destination.clone(),
                count: events.len(),
                reason: "ThrottlingException: Rate exceeded".to_string(),
            });
        }

        self.batches.lock().unwrap().push(events.len());
        self.events.lock().unwrap().extend(events);
        Ok(PutOutcome {
            rejected: self.reject,
        })
    }
}
