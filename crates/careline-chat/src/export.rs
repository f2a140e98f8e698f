//! Writing a topic's thread to a transcript file.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};

use careline_core::error::{CarelineError, Result};
use careline_core::types::{Message, MessageKind, Topic};

/// Transcript file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CarelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(CarelineError::Config(format!(
                "unknown export format: {}",
                other
            ))),
        }
    }
}

/// `chat-<topic>-<YYYYmmdd-HHMMSS>.<ext>`
pub fn transcript_file_name(topic: Topic, at: DateTime<Local>, format: ExportFormat) -> String {
    format!(
        "chat-{}-{}.{}",
        topic.agent_id(),
        at.format("%Y%m%d-%H%M%S"),
        format.extension()
    )
}

/// Render messages in the given format.
pub fn render_transcript(topic: Topic, messages: &[Message], format: ExportFormat) -> String {
    let mut out = String::new();
    match format {
        ExportFormat::Markdown => {
            let _ = writeln!(out, "# {}\n", topic.label());
            for message in messages {
                let _ = writeln!(
                    out,
                    "**{}** _{}_\n",
                    message.role.label(),
                    local_time(message.timestamp)
                );
                let _ = writeln!(out, "{}\n", body_text(message));
                for card in &message.service_cards {
                    let _ = write!(out, "- **{}**", card.name);
                    if !card.description.is_empty() {
                        let _ = write!(out, ": {}", card.description);
                    }
                    if !card.contact.is_empty() {
                        let _ = write!(out, " ({})", card.contact);
                    }
                    out.push('\n');
                }
                for reference in &message.references {
                    let title = if reference.title.is_empty() {
                        reference.domain()
                    } else {
                        reference.title.as_str()
                    };
                    let _ = writeln!(out, "- [{}]({})", title, reference.url);
                }
                if !message.service_cards.is_empty() || !message.references.is_empty() {
                    out.push('\n');
                }
            }
        }
        ExportFormat::Text => {
            let _ = writeln!(out, "{}\n", topic.label());
            for message in messages {
                let _ = writeln!(
                    out,
                    "[{}] {}: {}",
                    local_time(message.timestamp),
                    message.role.label(),
                    body_text(message)
                );
                for card in &message.service_cards {
                    let _ = writeln!(out, "    * {}", card.name);
                }
                for reference in &message.references {
                    let _ = writeln!(out, "    -> {}", reference.url);
                }
            }
        }
    }
    out
}

/// Write the transcript into `dir` and return the file path.
///
/// An empty thread is rejected rather than producing an empty file.
pub fn export_transcript(
    dir: &Path,
    topic: Topic,
    messages: &[Message],
    format: ExportFormat,
) -> Result<PathBuf> {
    if messages.is_empty() {
        return Err(CarelineError::EmptyTranscript);
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(transcript_file_name(topic, Local::now(), format));
    std::fs::write(&path, render_transcript(topic, messages, format))?;
    tracing::info!(
        path = %path.display(),
        messages = messages.len(),
        "Transcript exported"
    );
    Ok(path)
}

fn body_text(message: &Message) -> String {
    match (message.kind, &message.audio) {
        (MessageKind::Voice, Some(audio)) => format!(
            "{} ({}, {} s)",
            message.body, audio.file_name, audio.duration_secs
        ),
        _ => message.body.clone(),
    }
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}
