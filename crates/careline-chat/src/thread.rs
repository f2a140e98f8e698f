//! Thread view: the message list as rows ready for rendering.

use std::fmt::Write as _;

use careline_core::types::{Message, MessageKind, Reference, ServiceCard};
use careline_voice::format_elapsed;

use crate::store::ConversationStore;

/// Whether each message should show its sender label.
///
/// The first message always does; after that a label appears only when the
/// sender differs from the previous message.
pub fn display_labels(messages: &[Message]) -> Vec<bool> {
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| i == 0 || messages[i - 1].role != m.role)
        .collect()
}

/// One rendered entry in the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow<'a> {
    pub message: &'a Message,
    pub show_label: bool,
    /// Empty unless this is the most recent assistant message.
    pub quick_replies: &'a [String],
    pub service_cards: &'a [ServiceCard],
    pub references: &'a [Reference],
    /// A reply is pending below this row.
    pub typing: bool,
}

/// Snapshot of the current topic's thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView<'a> {
    pub rows: Vec<ThreadRow<'a>>,
    /// Nothing to show yet but a reply is on its way.
    pub standalone_typing: bool,
}

impl<'a> ThreadView<'a> {
    pub fn build(store: &'a ConversationStore) -> Self {
        Self::from_messages(store.messages(), store.is_loading())
    }

    pub fn from_messages(messages: &'a [Message], loading: bool) -> Self {
        let labels = display_labels(messages);
        let latest_assistant = messages.iter().rposition(Message::is_assistant);
        let last = messages.len().checked_sub(1);

        let rows = messages
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (message, show_label))| ThreadRow {
                message,
                show_label,
                quick_replies: if Some(i) == latest_assistant {
                    message.quick_replies.as_slice()
                } else {
                    &[]
                },
                service_cards: &message.service_cards,
                references: &message.references,
                typing: loading && Some(i) == last,
            })
            .collect();

        Self {
            rows,
            standalone_typing: loading && messages.is_empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && !self.standalone_typing
    }

    /// Plain-text rendering for a terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            render_row(&mut out, row);
        }
        if self.standalone_typing {
            out.push_str("  ...\n");
        }
        out
    }
}

impl<'a> ThreadRow<'a> {
    /// A row for a message rendered on its own, e.g. as it arrives.
    ///
    /// Quick replies are shown whenever the message has them, since a newly
    /// arrived assistant message is by definition the latest one.
    pub fn standalone(message: &'a Message, show_label: bool) -> Self {
        Self {
            message,
            show_label,
            quick_replies: if message.is_assistant() {
                message.quick_replies.as_slice()
            } else {
                &[]
            },
            service_cards: message.service_cards.as_slice(),
            references: message.references.as_slice(),
            typing: false,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        render_row(&mut out, self);
        out
    }
}

fn render_row(out: &mut String, row: &ThreadRow<'_>) {
    let message = row.message;
    if row.show_label {
        let _ = writeln!(out, "{}:", message.role.label());
    }
    match (message.kind, &message.audio) {
        (MessageKind::Voice, Some(audio)) => {
            let _ = writeln!(
                out,
                "  [{}] {} ({})",
                message.body,
                audio.file_name,
                format_elapsed(audio.duration_secs)
            );
        }
        _ => {
            for line in message.body.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
    }

    for card in row.service_cards {
        let _ = writeln!(out, "  +-- {}", card.name);
        if !card.description.is_empty() {
            let _ = writeln!(out, "  |   {}", card.description);
        }
        if !card.contact.is_empty() {
            let _ = writeln!(out, "  |   Kontakt: {}", card.contact);
        }
        if !card.url.is_empty() {
            let _ = writeln!(out, "  |   {}", card.url);
        }
    }

    for reference in row.references {
        let title = if reference.title.is_empty() {
            reference.url.as_str()
        } else {
            reference.title.as_str()
        };
        let _ = writeln!(out, "  -> {} ({})", title, reference.domain());
        if !reference.description.is_empty() {
            let _ = writeln!(out, "     {}", reference.description);
        }
    }

    for (i, reply) in row.quick_replies.iter().enumerate() {
        let _ = writeln!(out, "  [{}] {}", i + 1, reply);
    }

    if row.typing {
        out.push_str("  ...\n");
    }
}
