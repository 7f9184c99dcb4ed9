//! Streaming transport for the chat endpoint.
//!
//! One HTTP request per user message. The response body is consumed
//! incrementally and decoded into [`StreamEvent`]s by the frame decoder.
//! The transport does not retry or reconnect; recovery is the caller's
//! decision.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ChatError;
use crate::protocol::{ChatRequest, FrameDecoder, FrameFormat, StreamEvent};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ChatTransport {
    client: Client,
    url: String,
    format: FrameFormat,
    idle_timeout: Duration,
}

impl ChatTransport {
    pub fn new(url: impl Into<String>) -> Self {
        ChatTransport {
            client: Client::new(),
            url: url.into(),
            format: FrameFormat::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    /// Fail the stream if no bytes arrive within `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open one streaming request for `message`. A non-2xx status fails
    /// immediately with the response body as diagnostic detail.
    pub async fn send_message(
        &self,
        message: &str,
        session_id: &str,
        thread_id: &str,
    ) -> Result<EventStream, ChatError> {
        let request = ChatRequest {
            message: message.to_string(),
            id: session_id.to_string(),
            thread_id: thread_id.to_string(),
        };

        debug!(url = %self.url, session_id, thread_id, "opening chat stream");
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await?;
            return Err(ChatError::Transport { status, detail });
        }

        let bytes = response
            .bytes_stream()
            .map(|res| res.map(|b| b.to_vec()))
            .boxed();

        Ok(EventStream {
            bytes,
            decoder: FrameDecoder::new(self.format.clone()),
            pending: VecDeque::new(),
            idle_timeout: self.idle_timeout,
            done: false,
        })
    }
}

/// The decoded event sequence of one in-flight response.
pub struct EventStream {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    idle_timeout: Duration,
    done: bool,
}

impl EventStream {
    /// Await the next protocol event. Returns `Ok(None)` once the transport
    /// signals end-of-stream; any trailing partial record is discarded.
    pub async fn next_event(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamEvent>, ChatError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                read = tokio::time::timeout(self.idle_timeout, self.bytes.next()) => {
                    match read {
                        Err(_) => {
                            return Err(ChatError::IdleTimeout {
                                secs: self.idle_timeout.as_secs(),
                            })
                        }
                        Ok(next) => next,
                    }
                }
            };

            match next {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.pending.extend(self.decoder.push(&chunk));
                }
                None => {
                    self.done = true;
                    self.decoder.finish();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn stream_of(reads: Vec<&'static [u8]>) -> EventStream {
        let bytes = stream::iter(
            reads
                .into_iter()
                .map(|r| Ok::<Vec<u8>, reqwest::Error>(r.to_vec())),
        )
        .boxed();
        EventStream {
            bytes,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            idle_timeout: Duration::from_secs(5),
            done: false,
        }
    }

    async fn drain(mut s: EventStream) -> Vec<StreamEvent> {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        while let Some(ev) = s.next_event(&cancel).await.expect("stream error") {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn test_events_across_read_boundaries() {
        let s = stream_of(vec![
            b"data: {\"type\":\"start\",\"thread_id\":\"t1\"}\ndata: {\"type\":\"chu",
            b"nk\",\"content\":\"hel",
            b"lo\"}\ndata: {\"type\":\"end\"}\n",
        ]);
        let events = drain(s).await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            StreamEvent::Chunk {
                content: "hello".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_end_of_stream_returns_none() {
        let s = stream_of(vec![b"data: {\"type\":\"end\"}\n"]);
        let cancel = CancellationToken::new();
        let mut s = s;
        assert!(s.next_event(&cancel).await.expect("event").is_some());
        assert!(s.next_event(&cancel).await.expect("eos").is_none());
        // Further polls stay at end-of-stream.
        assert!(s.next_event(&cancel).await.expect("eos").is_none());
    }

    #[tokio::test]
    async fn test_trailing_partial_record_discarded() {
        let s = stream_of(vec![
            b"data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: {\"type\":\"chunk\"",
        ]);
        let events = drain(s).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_stream() {
        // A stream that never yields keeps next_event pending until cancel fires.
        let bytes = stream::pending::<Result<Vec<u8>, reqwest::Error>>().boxed();
        let mut s = EventStream {
            bytes,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            idle_timeout: Duration::from_secs(60),
            done: false,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = s.next_event(&cancel).await.expect_err("cancelled");
        assert!(matches!(err, ChatError::Cancelled));
    }

    #[tokio::test]
    async fn test_idle_timeout_fires() {
        let bytes = stream::pending::<Result<Vec<u8>, reqwest::Error>>().boxed();
        let mut s = EventStream {
            bytes,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            idle_timeout: Duration::from_millis(20),
            done: false,
        };
        let cancel = CancellationToken::new();
        let err = s.next_event(&cancel).await.expect_err("timeout");
        assert!(matches!(err, ChatError::IdleTimeout { .. }));
    }

    #[tokio::test]
    async fn test_malformed_frame_between_valid_chunks() {
        let s = stream_of(vec![
            b"data: {\"type\":\"chunk\",\"content\":\"a\"}\n",
            b"data: {broken\n",
            b"data: {\"type\":\"chunk\",\"content\":\"b\"}\n",
        ]);
        let events = drain(s).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk {
                    content: "a".to_string()
                },
                StreamEvent::Chunk {
                    content: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_event_stream_drains_outside_async_context() {
        let s = stream_of(vec![b"data: {\"type\":\"chunk\",\"content\":\"sync\"}\n"]);
        let events = tokio_test::block_on(drain(s));
        assert_eq!(
            events,
            vec![StreamEvent::Chunk {
                content: "sync".to_string()
            }]
        );
    }

    #[test]
    fn test_transport_builder() {
        let t = ChatTransport::new("http://localhost:8000/api/chat")
            .with_idle_timeout(Duration::from_secs(5))
            .with_format(FrameFormat::new("data: ", b"\n\n".to_vec()));
        assert_eq!(t.url(), "http://localhost:8000/api/chat");
        assert_eq!(t.idle_timeout, Duration::from_secs(5));
        assert_eq!(t.format.delimiter, b"\n\n".to_vec());
    }
}
