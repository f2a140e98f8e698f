//! Careline terminal client - composition root.
//!
//! 1. Parse CLI arguments and initialize tracing (stderr, so the chat on
//!    stdout stays readable)
//! 2. Load configuration from TOML
//! 3. Build the chat backend (HTTP, or canned replies with `--offline`)
//! 4. Run the launcher / topic menu / thread loop on stdin

mod app;
mod cli;
mod commands;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, LinesStream};
use tokio_stream::StreamExt;

use careline_client::{ChatBackend, HttpBackend, MockBackend};
use careline_core::config::{CarelineConfig, GeneralConfig};
use careline_core::events::ChatEvent;

use crate::app::{App, Flow};
use crate::cli::CliArgs;

/// How often a running recording is checked against its maximum length.
const LIMIT_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Write every chat event to stderr as one JSON line.
async fn log_events(rx: broadcast::Receiver<ChatEvent>) {
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => serde_json::to_string(&event).ok(),
        Err(_) => None,
    });
    tokio::pin!(stream);
    while let Some(line) = stream.next().await {
        eprintln!("{}", line);
    }
}

fn prompt<W: Write>(app: &App, out: &mut W) -> std::io::Result<()> {
    write!(out, "{}", app.prompt())?;
    out.flush()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();

    // Tracing first, so problems loading the config are reported.
    let config_level = CarelineConfig::peek_log_level(&config_file)
        .unwrap_or_else(|| GeneralConfig::default().log_level);
    let level = args.resolve_log_level(&config_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Careline v{}", env!("CARGO_PKG_VERSION"));

    // Config. An explicit path must be readable.
    let mut config = if args.config_is_explicit() {
        CarelineConfig::load(&config_file)?
    } else {
        CarelineConfig::load_or_default(&config_file)
    };
    config.backend.base_url = args.resolve_api_url(&config.backend.base_url);
    config.voice.strategy = args.resolve_voice_strategy(config.voice.strategy);
    if args.expanded {
        config.ui.start_expanded = true;
    }
    config.validate()?;
    tracing::debug!(path = %config_file.display(), ?config, "Configuration resolved");

    // Backend.
    let backend: Arc<dyn ChatBackend> = if args.offline {
        tracing::info!("Offline mode, using canned replies");
        Arc::new(MockBackend::new())
    } else {
        Arc::new(HttpBackend::from_config(&config)?)
    };

    let mut app = App::new(&config, backend);
    if args.events {
        tokio::spawn(log_events(app.store().subscribe()));
    }

    // === Input loop ===

    let mut stdout = std::io::stdout();
    app.render_screen(&mut stdout)?;
    prompt(&app, &mut stdout)?;

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut limit_check = tokio::time::interval(LIMIT_CHECK_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else { break };
                if app.handle_line(&line?, &mut stdout).await? == Flow::Quit {
                    break;
                }
                prompt(&app, &mut stdout)?;
            }
            _ = limit_check.tick() => {
                if app.is_recording() && app.tick(&mut stdout).await? {
                    prompt(&app, &mut stdout)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                break;
            }
        }
    }

    tracing::info!("Careline stopped");
    Ok(())
}
