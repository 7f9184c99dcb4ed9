use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(version)]
#[command(about = "Terminal client for a streaming support assistant")]
pub struct Args {
    /// One-shot message to send; omit for interactive mode
    pub message: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Chat streaming endpoint (overrides config)
    #[arg(long)]
    pub chat_url: Option<String>,

    /// Data-frame prefix (overrides config)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Record delimiter, with \n escapes (overrides config)
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Idle timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Clear the stored thread id before the first message
    #[arg(long)]
    pub reset: bool,

    /// Keep all state in memory (no context or token files)
    #[arg(long)]
    pub ephemeral: bool,
}

/// Expand `\n`, `\r`, and `\t` escapes in a delimiter argument, so
/// `--delimiter '\n\n'` works from a shell.
pub fn unescape_delimiter(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
