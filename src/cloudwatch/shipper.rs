//! Forwards container output lines to the destination as they arrive.
//!
//! There is no flush timer. Each request carries the line that was awaited
//! plus whatever further lines were already buffered when it arrived, capped
//! at the batch size. While a request is in flight nothing is read, so a slow
//! service slows the reader down instead of growing a queue.

use futures_util::{FutureExt, Stream, StreamExt};
use log::{info, warn};

use super::event::{LogEvent, MonotonicClock};
use super::{Creation, LogSink, SinkError};
use crate::config::{Destination, RunConfig, ShippingOptions};
use crate::container::{LaunchError, OutputLine};

#[derive(Debug, thiserror::Error)]
pub enum ShipError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Output(#[from] LaunchError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipReport {
    /// Lines read from the container.
    pub lines: usize,
    /// Events accepted by the requests that were sent.
    pub sent: usize,
    pub batches: usize,
    /// Lines with an empty message, which the service does not accept.
    pub skipped: usize,
    /// Events the service refused to store.
    pub rejected: usize,
}

pub struct Shipper<'a> {
    sink: &'a dyn LogSink,
    destination: &'a Destination,
    options: ShippingOptions,
    command: String,
}

impl<'a> Shipper<'a> {
    pub fn new(sink: &'a dyn LogSink, config: &'a RunConfig) -> Self {
        Self {
            sink,
            destination: &config.destination,
            options: config.shipping,
            command: config.container.command.to_string(),
        }
    }

    /// Creates the log group and then the log stream, tolerating both
    /// already existing.
    pub async fn ensure_destination(&self) -> Result<(), SinkError> {
        let group = &self.destination.group;
        if self.sink.create_group(group).await? == Creation::Created {
            info!("Log group \"{}\" has been created", group);
        }
        if self.sink.create_stream(self.destination).await? == Creation::Created {
            info!("Log stream \"{}\" has been created", self.destination);
        }
        Ok(())
    }

    /// Reads `lines` to the end, sending them in order.
    pub async fn ship<L>(&self, lines: &mut L) -> Result<ShipReport, ShipError>
    where
        L: Stream<Item = Result<OutputLine, LaunchError>> + Unpin,
    {
        let batch_size = self.options.batch_size.max(1);
        let mut clock = MonotonicClock::default();
        let mut report = ShipReport::default();
        let mut batch: Vec<(i64, OutputLine)> = Vec::with_capacity(batch_size);

        loop {
            let first = match lines.next().await {
                Some(line) => line?,
                None => break,
            };
            batch.push((clock.now(), first));

            let mut failure = None;
            let mut ended = false;
            while batch.len() < batch_size {
                match lines.next().now_or_never() {
                    Some(Some(Ok(line))) => batch.push((clock.now(), line)),
                    Some(Some(Err(err))) => {
                        failure = Some(err);
                        break;
                    }
                    Some(None) => {
                        ended = true;
                        break;
                    }
                    None => break,
                }
            }

            self.send(&batch, &mut report).await?;
            batch.clear();

            if let Some(err) = failure {
                return Err(err.into());
            }
            if ended {
                break;
            }
        }

        Ok(report)
    }

    async fn send(
        &self,
        batch: &[(i64, OutputLine)],
        report: &mut ShipReport,
    ) -> Result<(), SinkError> {
        report.lines += batch.len();

        let events: Vec<LogEvent> = batch
            .iter()
            .filter_map(|(timestamp, line)| {
                let message = self.options.format.render(&self.command, line);
                (!message.is_empty()).then_some(LogEvent {
                    timestamp: *timestamp,
                    message,
                })
            })
            .collect();
        report.skipped += batch.len() - events.len();

        if events.is_empty() {
            return Ok(());
        }

        let count = events.len();
        let outcome = self.sink.put_events(self.destination, events).await?;
        report.batches += 1;
        report.sent += count;
        if outcome.rejected > 0 {
            warn!(
                "{} of {} log events were rejected by {}",
                outcome.rejected, count, self.destination
            );
            report.rejected += outcome.rejected;
        }
        info!("Sent {} logs", count);
        Ok(())
    }
}
