//! TOML configuration for endpoints, frame format, and state files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChatError;
use crate::protocol::FrameFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat streaming endpoint.
    pub chat_url: String,
    /// Base URL of the blog REST API.
    pub api_url: String,
    /// Data-frame prefix of the streaming protocol.
    pub frame_prefix: String,
    /// Record delimiter; the server has shipped both "\n" and "\n\n".
    pub frame_delimiter: String,
    /// Fail a stream when no bytes arrive for this many seconds.
    pub idle_timeout_secs: u64,
    /// Directory for the context and token state files. Defaults to a
    /// per-user directory under the system temp dir.
    pub state_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chat_url: "http://localhost:8000/api/chat".to_string(),
            api_url: "http://localhost:8000/api".to_string(),
            frame_prefix: "data: ".to_string(),
            frame_delimiter: "\n".to_string(),
            idle_timeout_secs: 30,
            state_dir: None,
        }
    }
}

impl Config {
    /// Read a config file, or return defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Config, ChatError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.frame_prefix.clone(), self.frame_delimiter.as_bytes())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("chatline"))
    }

    pub fn context_file(&self) -> PathBuf {
        self.state_dir().join("context.json")
    }

    pub fn token_file(&self) -> PathBuf {
        self.state_dir().join("tokens.json")
    }
}
