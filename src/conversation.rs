//! Conversation state machine for one chat widget.
//!
//! All mutation goes through a single transition function, so the
//! "streaming placeholder" lifecycle has no reachable flag combination
//! outside the intended phases.

use serde::Serialize;

/// Greeting seeded into a fresh conversation and restored on reset.
pub const DEFAULT_GREETING: &str =
    "Hi there! I'm your support assistant. How can I help you today?";

/// Static fallback shown when a turn fails.
pub const APOLOGY: &str = "Sorry, I'm having trouble connecting. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Ordinal position within the conversation, starting at 1.
    pub id: usize,
    pub text: String,
    pub sender: Sender,
    /// True only for the in-flight bot placeholder; at most one at a time.
    pub streaming: bool,
}

/// Lifecycle phase of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No request in flight; input enabled.
    Idle,
    /// User message and placeholder appended; request opened; input disabled.
    Sending,
    /// Partial text arriving; input disabled.
    Streaming,
    /// Last turn failed; apology shown; input re-enabled.
    Error,
}

/// Inputs to the transition function.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// User submitted a message.
    Submitted(String),
    /// Accumulated partial text for the streaming placeholder.
    PartialText(String),
    /// Stream finished; final response text.
    Completed(String),
    /// Stream failed terminally.
    Failed,
    /// User reset the conversation.
    Reset,
}

#[derive(Debug)]
pub struct Conversation {
    greeting: String,
    messages: Vec<Message>,
    phase: Phase,
}

impl Conversation {
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let mut conv = Conversation {
            greeting,
            messages: Vec::new(),
            phase: Phase::Idle,
        };
        conv.seed_greeting();
        conv
    }

    fn seed_greeting(&mut self) {
        self.messages.clear();
        self.messages.push(Message {
            id: 1,
            text: self.greeting.clone(),
            sender: Sender::Bot,
            streaming: false,
        });
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Input is accepted only when no turn is in flight.
    pub fn input_enabled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Error)
    }

    /// The single authoritative transition function. Returns `true` when the
    /// event was accepted; events that are invalid in the current phase are
    /// rejected without side effects.
    pub fn apply(&mut self, event: ConversationEvent) -> bool {
        match event {
            ConversationEvent::Submitted(text) => {
                let text = text.trim().to_string();
                if text.is_empty() || !self.input_enabled() {
                    return false;
                }
                self.push_message(text, Sender::User, false);
                // Streaming placeholder, finalized on Completed/Failed.
                self.push_message(String::new(), Sender::Bot, true);
                self.phase = Phase::Sending;
                true
            }
            ConversationEvent::PartialText(text) => {
                if !matches!(self.phase, Phase::Sending | Phase::Streaming) {
                    return false;
                }
                if let Some(placeholder) = self.streaming_message_mut() {
                    placeholder.text = text;
                }
                self.phase = Phase::Streaming;
                true
            }
            ConversationEvent::Completed(text) => {
                if !matches!(self.phase, Phase::Sending | Phase::Streaming) {
                    return false;
                }
                if let Some(placeholder) = self.streaming_message_mut() {
                    placeholder.text = text;
                    placeholder.streaming = false;
                }
                self.phase = Phase::Idle;
                true
            }
            ConversationEvent::Failed => {
                if !matches!(self.phase, Phase::Sending | Phase::Streaming) {
                    return false;
                }
                if let Some(placeholder) = self.streaming_message_mut() {
                    placeholder.text = APOLOGY.to_string();
                    placeholder.streaming = false;
                }
                self.phase = Phase::Error;
                true
            }
            ConversationEvent::Reset => {
                self.seed_greeting();
                self.phase = Phase::Idle;
                true
            }
        }
    }

    fn push_message(&mut self, text: String, sender: Sender, streaming: bool) {
        let id = self.messages.len() + 1;
        self.messages.push(Message {
            id,
            text,
            sender,
            streaming,
        });
    }

    fn streaming_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.streaming)
    }

    /// Count of messages currently marked streaming. Always 0 or 1.
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.streaming).count()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Conversation::new(DEFAULT_GREETING)
    }
}
