use super::ChatResult;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Finite, single-use stream of reply fragments.
///
/// `None` marks the end of the reply. After the end, or after the first
/// error, the stream keeps returning `None`.
pub struct FragmentStream {
    inner: BoxStream<'static, ChatResult<String>>,
    finished: bool,
}

impl FragmentStream {
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = ChatResult<String>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
            finished: false,
        }
    }

    pub fn once(content: String) -> Self {
        Self::new(stream::iter([Ok(content)]))
    }

    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = ChatResult<String>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(fragments))
    }

    /// Stream fed by a producer task through an unbounded channel; the stream
    /// ends once every sender is dropped.
    pub fn from_channel(rx: mpsc::UnboundedReceiver<ChatResult<String>>) -> Self {
        Self::new(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    /// Drain the stream and concatenate every fragment.
    pub async fn collect_text(mut self) -> ChatResult<String> {
        let mut content = String::new();
        while let Some(fragment) = self.next().await {
            content.push_str(&fragment?);
        }
        Ok(content)
    }
}

impl Stream for FragmentStream {
    type Item = ChatResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Err(err))) => {
                self.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Splits a byte stream into text lines without breaking multi-byte
/// characters that straddle chunk boundaries.
#[derive(Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no `\n`.
    scanned: usize,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line, without its `\n` / `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.pending.len();
            return None;
        };
        let pos = self.scanned + offset;
        self.scanned = 0;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left after the body ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Collects `data:` lines of a server-sent event until the blank line that
/// terminates it.
#[derive(Default)]
pub struct SseDecoder {
    data: Option<String>,
}

impl SseDecoder {
    /// Feed one line; returns the event payload when the line ends an event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut self.data {
                Some(acc) => {
                    acc.push('\n');
                    acc.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }

    /// Payload of an event left open when the body ended.
    pub fn finish(&mut self) -> Option<String> {
        self.data.take()
    }
}
