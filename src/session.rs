//! Session and thread identity for a conversation.
//!
//! The session identifier is generated client-side once per context and never
//! changes. The thread identifier is assigned by the assistant backend on the
//! first streamed response and is attached to every later message so replies
//! continue the same logical conversation. Resetting a conversation clears
//! the thread identifier only.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ContextState {
    session_id: Option<String>,
    thread_id: Option<String>,
}

/// Identity store for one conversation widget.
///
/// Each widget owns (or shares via `Arc`) its own context, so independent
/// conversations never cross-talk. Persistence is write-through and
/// best-effort: a failed write is logged and the in-memory state stays
/// authoritative, matching browser session-storage semantics.
#[derive(Debug)]
pub struct ConversationContext {
    inner: Mutex<ContextState>,
    path: Option<PathBuf>,
}

impl ConversationContext {
    /// A context that lives only as long as the process.
    pub fn in_memory() -> Self {
        ConversationContext {
            inner: Mutex::new(ContextState::default()),
            path: None,
        }
    }

    /// A context backed by a state file. Missing or unreadable files start
    /// a fresh context rather than failing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring corrupt context file");
                ContextState::default()
            }),
            Err(_) => ContextState::default(),
        };
        ConversationContext {
            inner: Mutex::new(state),
            path: Some(path),
        }
    }

    /// Return the session identifier, generating and storing a fresh one on
    /// first use. Idempotent for the lifetime of the context.
    pub fn session_id(&self) -> String {
        let mut state = self.inner.lock().expect("context lock poisoned");
        if let Some(id) = &state.session_id {
            return id.clone();
        }
        let id = Uuid::new_v4().to_string();
        state.session_id = Some(id.clone());
        self.persist(&state);
        id
    }

    pub fn thread_id(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("context lock poisoned")
            .thread_id
            .clone()
    }

    /// Record the server-assigned thread identifier.
    pub fn set_thread_id(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let mut state = self.inner.lock().expect("context lock poisoned");
        state.thread_id = Some(id.to_string());
        self.persist(&state);
    }

    /// Drop the thread identifier so the next message starts a fresh
    /// conversation on the backend. The session identifier is retained.
    pub fn clear_conversation(&self) {
        let mut state = self.inner.lock().expect("context lock poisoned");
        state.thread_id = None;
        self.persist(&state);
    }

    fn persist(&self, state: &ContextState) {
        let Some(path) = &self.path else { return };
        let raw = match serde_json::to_string_pretty(state) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize context state");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, raw) {
            warn!(path = %path.display(), error = %e, "failed to persist context state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_idempotent() {
        let ctx = ConversationContext::in_memory();
        let first = ctx.session_id();
        let second = ctx.session_id();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_session_ids_distinct_across_contexts() {
        let a = ConversationContext::in_memory();
        let b = ConversationContext::in_memory();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_thread_id_starts_empty() {
        let ctx = ConversationContext::in_memory();
        assert!(ctx.thread_id().is_none());
    }

    #[test]
    fn test_set_and_get_thread_id() {
        let ctx = ConversationContext::in_memory();
        ctx.set_thread_id("thr-42");
        assert_eq!(ctx.thread_id().as_deref(), Some("thr-42"));
    }

    #[test]
    fn test_empty_thread_id_ignored() {
        let ctx = ConversationContext::in_memory();
        ctx.set_thread_id("");
        assert!(ctx.thread_id().is_none());
    }

    #[test]
    fn test_clear_conversation_keeps_session_id() {
        let ctx = ConversationContext::in_memory();
        let session = ctx.session_id();
        ctx.set_thread_id("thr-1");
        ctx.clear_conversation();
        assert!(ctx.thread_id().is_none());
        assert_eq!(ctx.session_id(), session);
    }

    #[test]
    fn test_file_backed_context_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("context.json");

        let ctx = ConversationContext::load_or_default(&path);
        let session = ctx.session_id();
        ctx.set_thread_id("thr-7");
        drop(ctx);

        let reloaded = ConversationContext::load_or_default(&path);
        assert_eq!(reloaded.session_id(), session);
        assert_eq!(reloaded.thread_id().as_deref(), Some("thr-7"));
    }

    #[test]
    fn test_corrupt_context_file_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("context.json");
        std::fs::write(&path, "{not json").expect("write");

        let ctx = ConversationContext::load_or_default(&path);
        assert!(ctx.thread_id().is_none());
    }

    #[test]
    fn test_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ConversationContext::load_or_default(dir.path().join("absent.json"));
        assert!(ctx.thread_id().is_none());
    }
}
