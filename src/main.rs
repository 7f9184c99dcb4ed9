use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chatline::cli::{unescape_delimiter, Args};
use chatline::config::Config;
use chatline::conversation::APOLOGY;
use chatline::error::ChatError;
use chatline::session::ConversationContext;
use chatline::transport::ChatTransport;
use chatline::ChatClient;

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = &args.chat_url {
        config.chat_url = url.clone();
    }
    if let Some(prefix) = &args.prefix {
        config.frame_prefix = prefix.clone();
    }
    if let Some(delimiter) = &args.delimiter {
        config.frame_delimiter = unescape_delimiter(delimiter);
    }
    if let Some(timeout) = args.timeout {
        config.idle_timeout_secs = timeout;
    }

    let context = if args.ephemeral {
        ConversationContext::in_memory()
    } else {
        ConversationContext::load_or_default(config.context_file())
    };

    let transport = ChatTransport::new(&config.chat_url)
        .with_format(config.frame_format())
        .with_idle_timeout(config.idle_timeout());
    let mut client = ChatClient::new(transport, Arc::new(context));

    if args.reset {
        client.reset();
    }

    // One-shot mode: send, print, exit.
    if let Some(message) = &args.message {
        run_turn(&mut client, message).await;
        return Ok(());
    }

    println!(
        "{} {}",
        "assistant:".bright_cyan().bold(),
        client.conversation().messages()[0].text
    );
    println!(
        "{}",
        "(/reset starts a new conversation, /quit exits)".bright_black()
    );

    let stdin = io::stdin();
    loop {
        print!("{} ", "you:".bright_green().bold());
        let _ = io::stdout().flush();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                client.reset();
                println!(
                    "{} {}",
                    "assistant:".bright_cyan().bold(),
                    client.conversation().messages()[0].text
                );
                continue;
            }
            _ => run_turn(&mut client, line).await,
        }
    }

    Ok(())
}

/// Drive one send-and-stream turn, printing partial text as it arrives.
async fn run_turn(client: &mut ChatClient, message: &str) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    client.partial_tx = Some(tx);

    print!("{} ", "assistant:".bright_cyan().bold());
    let _ = io::stdout().flush();

    // Snapshots are cumulative; print only the unseen suffix of each.
    let printer = tokio::spawn(async move {
        let mut shown = String::new();
        while let Some(snapshot) = rx.recv().await {
            if let Some(suffix) = snapshot.strip_prefix(shown.as_str()) {
                print!("{suffix}");
                let _ = io::stdout().flush();
            }
            shown = snapshot;
        }
        shown
    });

    // Ctrl-C cancels the in-flight turn without killing the prompt loop.
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let listener = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => watcher.cancel(),
            _ = watcher.cancelled() => {}
        }
    });

    let result = client.send_with_cancel(message, &cancel).await;
    cancel.cancel();
    let _ = listener.await;

    client.partial_tx = None;
    let shown = printer.await.unwrap_or_default();

    match result {
        Ok(final_text) => {
            if shown.is_empty() {
                println!("{final_text}");
            } else if final_text != shown {
                // The server's authoritative full response differed from the
                // sum of chunks.
                println!("\n{} {final_text}", "assistant (final):".bright_cyan());
            } else {
                println!();
            }
        }
        Err(e) => {
            if !shown.is_empty() {
                println!();
            }
            println!("{}", APOLOGY.bright_red());
            eprintln!("{} {e}", "error:".bright_red().bold());
        }
    }
}
