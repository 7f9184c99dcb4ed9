use thiserror::Error;

/// Crate-wide error type.
///
/// Frame-level problems (bad UTF-8, malformed JSON) never surface here: the
/// decoder drops those records and keeps going. Only failures that terminate
/// a whole operation become a `ChatError`.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The endpoint answered with a non-2xx status. The body is kept as
    /// diagnostic text.
    #[error("endpoint returned HTTP {status}: {detail}")]
    Transport { status: u16, detail: String },

    /// Network-level failure (connect, TLS, mid-stream disconnect).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// No bytes arrived within the configured idle interval.
    #[error("stream idle for {secs}s, giving up")]
    IdleTimeout { secs: u64 },

    /// The caller cancelled the in-flight turn.
    #[error("operation cancelled")]
    Cancelled,

    /// A send was attempted while another turn was still streaming.
    #[error("a message is already in flight")]
    Busy,

    /// The submitted message was empty or whitespace-only.
    #[error("message is empty")]
    EmptyMessage,

    /// Login failed, or the one-time token refresh after a 401 failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Reading or writing a client-side state file failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}
