//! Folds the decoded event sequence into the response text.
//!
//! `chunk` payloads append to a running accumulator that is exposed after
//! every append; that partial text drives the typing effect. `start` and
//! `end` re-synchronize the thread identifier; an `end` carrying a
//! `full_response` replaces the accumulator wholesale, since the server's
//! post-processed answer is authoritative over the sum of chunks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::StreamEvent;
use crate::session::ConversationContext;

pub struct ResponseAccumulator {
    context: Arc<ConversationContext>,
    text: String,
    saw_end: bool,
    /// When set, each partial snapshot is also pushed here.
    partial_tx: Option<mpsc::UnboundedSender<String>>,
}

impl ResponseAccumulator {
    pub fn new(context: Arc<ConversationContext>) -> Self {
        ResponseAccumulator {
            context,
            text: String::new(),
            saw_end: false,
            partial_tx: None,
        }
    }

    pub fn with_partial_tx(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.partial_tx = Some(tx);
        self
    }

    /// Apply one event. Returns the updated partial text after a `chunk`,
    /// `None` for events that do not change the displayed text.
    pub fn apply(&mut self, event: StreamEvent) -> Option<&str> {
        match event {
            StreamEvent::Start { thread_id } => {
                if let Some(id) = thread_id {
                    self.context.set_thread_id(&id);
                }
                None
            }
            StreamEvent::Chunk { content } => {
                if content.is_empty() {
                    debug!("dropping chunk with empty content");
                    return None;
                }
                self.text.push_str(&content);
                if let Some(tx) = &self.partial_tx {
                    let _ = tx.send(self.text.clone());
                }
                Some(&self.text)
            }
            StreamEvent::End {
                thread_id,
                full_response,
            } => {
                if let Some(id) = thread_id {
                    self.context.set_thread_id(&id);
                }
                if let Some(full) = full_response {
                    if !full.is_empty() {
                        self.text = full;
                    }
                }
                self.saw_end = true;
                None
            }
        }
    }

    /// Whether an explicit `end` event arrived. A stream that closes without
    /// one still yields the accumulated text, but the turn should only be
    /// marked complete on explicit termination.
    pub fn saw_end(&self) -> bool {
        self.saw_end
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the accumulator and return the final response text.
    pub fn finish(self) -> String {
        self.text
    }
}
