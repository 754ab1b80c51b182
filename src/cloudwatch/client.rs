//! CloudWatch Logs sink on top of the AWS SDK.

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::config::Credentials;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::{InputLogEvent, RejectedLogEventsInfo};

use super::event::LogEvent;
use super::{Creation, LogSink, PutOutcome, SinkError};
use crate::config::{AwsSettings, Destination};

const PROVIDER_NAME: &str = "log-container";

pub struct CloudWatchSink {
    client: Client,
}

impl CloudWatchSink {
    /// Builds a client from static credentials. Nothing is sent until the
    /// first call. The SDK's own retries are disabled: a failed request is
    /// reported as is.
    pub async fn new(settings: &AwsSettings) -> Self {
        let credentials = Credentials::new(
            &settings.credentials.access_key_id,
            &settings.credentials.secret_access_key,
            settings.credentials.session_token.clone(),
            None,
            PROVIDER_NAME,
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl LogSink for CloudWatchSink {
    async fn create_group(&self, group: &str) -> Result<Creation, SinkError> {
        match self
            .client
            .create_log_group()
            .log_group_name(group)
            .send()
            .await
        {
            Ok(_) => Ok(Creation::Created),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception()) =>
            {
                Ok(Creation::AlreadyExists)
            }
            Err(err) => Err(SinkError::CreateGroup {
                group: group.to_string(),
                reason: DisplayErrorContext(&err).to_string(),
            }),
        }
    }

    async fn create_stream(&self, destination: &Destination) -> Result<Creation, SinkError> {
        match self
            .client
            .create_log_stream()
            .log_group_name(&destination.group)
            .log_stream_name(&destination.stream)
            .send()
            .await
        {
            Ok(_) => Ok(Creation::Created),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception()) =>
            {
                Ok(Creation::AlreadyExists)
            }
            Err(err) => Err(SinkError::CreateStream {
                destination: destination.clone(),
                reason: DisplayErrorContext(&err).to_string(),
            }),
        }
    }

    async fn put_events(
        &self,
        destination: &Destination,
        events: Vec<LogEvent>,
    ) -> Result<PutOutcome, SinkError> {
        let count = events.len();
        let events = events
            .into_iter()
            .map(|event| {
                InputLogEvent::builder()
                    .timestamp(event.timestamp)
                    .message(event.message)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SinkError::InvalidEvent(e.to_string()))?;

        let output = self
            .client
            .put_log_events()
            .log_group_name(&destination.group)
            .log_stream_name(&destination.stream)
            .set_log_events(Some(events))
            .send()
            .await
            .map_err(|err| SinkError::PutEvents {
                destination: destination.clone(),
                count,
                reason: DisplayErrorContext(&err).to_string(),
            })?;

        let rejected = output
            .rejected_log_events_info()
            .map(|info| rejected_count(count, info))
            .unwrap_or(0);
        Ok(PutOutcome { rejected })
    }
}

fn rejected_count(count: usize, info: &RejectedLogEventsInfo) -> usize {
    let index = |value: Option<i32>| value.and_then(|v| usize::try_from(v).ok());
    rejected_in_range(
        count,
        index(info.too_new_log_event_start_index()),
        index(info.too_old_log_event_end_index()),
        index(info.expired_log_event_end_index()),
    )
}

/// Events before the too-old/expired end index and from the too-new start
/// index on were not stored.
fn rejected_in_range(
    count: usize,
    too_new_start: Option<usize>,
    too_old_end: Option<usize>,
    expired_end: Option<usize>,
) -> usize {
    let old = too_old_end.max(expired_end).unwrap_or(0).min(count);
    let new_start = too_new_start.unwrap_or(count).clamp(old, count);
    old + (count - new_start)
}
