//! Turns the frames a container writes into whole lines.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bollard::container::LogOutput;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use super::LaunchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Stdout,
    Stderr,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Stdout => "stdout",
            Source::Stderr => "stderr",
        }
    }
}

/// A frame of output as delivered by the runtime. Not line aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub source: Source,
    pub bytes: Bytes,
}

impl OutputChunk {
    pub fn stdout(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Stdout,
            bytes: bytes.into(),
        }
    }

    pub fn stderr(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Stderr,
            bytes: bytes.into(),
        }
    }
}

impl From<LogOutput> for OutputChunk {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::StdErr { message } => Self::stderr(message),
            LogOutput::StdOut { message }
            | LogOutput::StdIn { message }
            | LogOutput::Console { message } => Self::stdout(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: Source,
    pub text: String,
}

/// Bytes of one source not yet ending in a newline.
#[derive(Debug, Default)]
struct Pending {
    buf: BytesMut,
    /// Length of the prefix of `buf` already known to hold no newline.
    scanned: usize,
}

/// Per-source line assembly. Bytes of stdout and stderr never end up in the
/// same line, whatever the interleaving of their frames. Each byte is
/// searched for a newline once, however many frames a line spans.
#[derive(Debug, Default)]
pub struct LineSplitter {
    stdout: Pending,
    stderr: Pending,
}

impl LineSplitter {
    fn pending(&mut self, source: Source) -> &mut Pending {
        match source {
            Source::Stdout => &mut self.stdout,
            Source::Stderr => &mut self.stderr,
        }
    }

    /// Appends a frame and moves every completed line into `out`.
    pub fn push(&mut self, chunk: OutputChunk, out: &mut VecDeque<OutputLine>) {
        let pending = self.pending(chunk.source);
        pending.buf.extend_from_slice(&chunk.bytes);

        while let Some(offset) = pending.buf[pending.scanned..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let line = pending.buf.split_to(pending.scanned + offset + 1);
            pending.scanned = 0;
            out.push_back(decode(chunk.source, &line[..line.len() - 1]));
        }
        pending.scanned = pending.buf.len();
    }

    /// Emits whatever is left without a trailing newline, stdout first.
    pub fn finish(&mut self, out: &mut VecDeque<OutputLine>) {
        for source in [Source::Stdout, Source::Stderr] {
            let rest = std::mem::take(self.pending(source));
            if !rest.buf.is_empty() {
                out.push_back(decode(source, &rest.buf));
            }
        }
    }
}

fn decode(source: Source, bytes: &[u8]) -> OutputLine {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    OutputLine {
        source,
        text: String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Stream adapter yielding the lines of a frame stream in arrival order.
///
/// An error from the frame stream is yielded after the lines completed before
/// it, and ends the stream.
pub struct OutputLines<S> {
    inner: S,
    splitter: LineSplitter,
    ready: VecDeque<OutputLine>,
    failure: Option<LaunchError>,
    finished: bool,
}

impl<S> OutputLines<S>
where
    S: Stream<Item = Result<OutputChunk, LaunchError>> + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            splitter: LineSplitter::default(),
            ready: VecDeque::new(),
            failure: None,
            finished: false,
        }
    }
}

impl<S> Stream for OutputLines<S>
where
    S: Stream<Item = Result<OutputChunk, LaunchError>> + Unpin,
{
    type Item = Result<OutputLine, LaunchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();

        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if let Some(err) = this.failure.take() {
                return Poll::Ready(Some(Err(err)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    log::debug!("{} frame of {} bytes", chunk.source.as_str(), chunk.bytes.len());
                    this.splitter.push(chunk, &mut this.ready);
                }
                Poll::Ready(Some(Err(err))) => {
                    this.failure = Some(err);
                    this.finished = true;
                }
                Poll::Ready(None) => {
                    this.splitter.finish(&mut this.ready);
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
