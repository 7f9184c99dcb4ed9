pub mod blog;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod interpreter;
pub mod protocol;
pub mod session;
pub mod transport;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use conversation::{Conversation, ConversationEvent, DEFAULT_GREETING};
use error::ChatError;
use interpreter::ResponseAccumulator;
use session::ConversationContext;
use transport::ChatTransport;

pub use conversation::{Message, Phase, Sender};
pub use protocol::{FrameFormat, StreamEvent};

// ---------------------------------------------------------------------------
// ChatClient — send-and-stream engine for one conversation
// ---------------------------------------------------------------------------

/// One conversation widget: identity context, transport, and the message
/// list state machine. Each instance owns its own context, so independent
/// clients never share thread state.
pub struct ChatClient {
    transport: ChatTransport,
    context: Arc<ConversationContext>,
    conversation: Conversation,
    /// When set, every partial text snapshot is pushed here as it arrives.
    pub partial_tx: Option<mpsc::UnboundedSender<String>>,
}

impl ChatClient {
    pub fn new(transport: ChatTransport, context: Arc<ConversationContext>) -> Self {
        ChatClient {
            transport,
            context,
            conversation: Conversation::new(DEFAULT_GREETING),
            partial_tx: None,
        }
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.conversation = Conversation::new(greeting);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Send one message and stream the reply to completion.
    pub async fn send(&mut self, text: &str) -> Result<String, ChatError> {
        self.send_with_cancel(text, &CancellationToken::new())
            .await
    }

    /// Send one message; the turn fails with [`ChatError::Cancelled`] if
    /// `cancel` fires mid-stream. Whatever the outcome, the conversation
    /// never stays in a streaming phase: it resolves to `Idle` on success
    /// and `Error` (apology message, input re-enabled) on failure.
    pub async fn send_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self
            .conversation
            .apply(ConversationEvent::Submitted(text.to_string()))
        {
            return Err(ChatError::Busy);
        }

        let session_id = self.context.session_id();
        let thread_id = self.context.thread_id().unwrap_or_default();

        match self.run_stream(text, &session_id, &thread_id, cancel).await {
            Ok(final_text) => {
                self.conversation
                    .apply(ConversationEvent::Completed(final_text.clone()));
                Ok(final_text)
            }
            Err(e) => {
                warn!(error = %e, "chat turn failed");
                self.conversation.apply(ConversationEvent::Failed);
                Err(e)
            }
        }
    }

    async fn run_stream(
        &mut self,
        text: &str,
        session_id: &str,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let mut stream = self
            .transport
            .send_message(text, session_id, thread_id)
            .await?;

        let mut acc = ResponseAccumulator::new(Arc::clone(&self.context));
        while let Some(event) = stream.next_event(cancel).await? {
            if let Some(snapshot) = acc.apply(event) {
                let snapshot = snapshot.to_string();
                self.conversation
                    .apply(ConversationEvent::PartialText(snapshot.clone()));
                if let Some(tx) = &self.partial_tx {
                    let _ = tx.send(snapshot);
                }
            }
        }
        Ok(acc.finish())
    }

    /// Start a new conversation: single greeting message, thread id cleared.
    /// The session id is retained.
    pub fn reset(&mut self) {
        self.conversation.apply(ConversationEvent::Reset);
        self.context.clear_conversation();
    }
}
