use crate::container::OutputLine;

/// One entry of a `PutLogEvents` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp: i64,
    pub message: String,
}

/// How a line becomes an event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MessageFormat {
    /// The line text as is.
    #[default]
    Plain,
    /// `{"command": ..., "source": "stdout"|"stderr", "data": <line>}`
    Json,
}

impl MessageFormat {
    pub fn render(&self, command: &str, line: &OutputLine) -> String {
        match self {
            MessageFormat::Plain => line.text.clone(),
            MessageFormat::Json => serde_json::json!({
                "command": command,
                "source": line.source,
                "data": line.text,
            })
            .to_string(),
        }
    }
}

/// Hands out millisecond timestamps that never go backwards, even if the
/// wall clock does. Events of one request must be in chronological order.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: i64,
}

impl MonotonicClock {
    pub fn now(&mut self) -> i64 {
        self.observe(chrono::Utc::now().timestamp_millis())
    }

    fn observe(&mut self, millis: i64) -> i64 {
        self.last = self.last.max(millis);
        self.last
    }
}
