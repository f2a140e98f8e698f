use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Message, Topic};

/// Events emitted by the conversation store after each state change.
///
/// Front ends subscribe to these instead of polling the store's fields:
/// an optimistic `MessageAppended` for the user's turn arrives immediately,
/// followed later by either the assistant's `MessageAppended` or `SendFailed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChatEvent {
    /// The current topic changed (or was cleared with `None`).
    TopicChanged {
        topic: Option<Topic>,
        timestamp: DateTime<Utc>,
    },

    /// The backend issued a session for a topic.
    SessionStarted {
        topic: Topic,
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to a topic's history.
    MessageAppended {
        topic: Topic,
        message: Message,
        timestamp: DateTime<Utc>,
    },

    /// The in-flight flag flipped.
    LoadingChanged {
        loading: bool,
        timestamp: DateTime<Utc>,
    },

    /// A backend call failed and was replaced with a fallback message.
    SendFailed {
        topic: Topic,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A topic's history was emptied.
    HistoryCleared {
        topic: Topic,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// When the event was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatEvent::TopicChanged { timestamp, .. }
            | ChatEvent::SessionStarted { timestamp, .. }
            | ChatEvent::MessageAppended { timestamp, .. }
            | ChatEvent::LoadingChanged { timestamp, .. }
            | ChatEvent::SendFailed { timestamp, .. }
            | ChatEvent::HistoryCleared { timestamp, .. } => *timestamp,
        }
    }

    /// Short machine-friendly name, used as a log field.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChatEvent::TopicChanged { .. } => "topic_changed",
            ChatEvent::SessionStarted { .. } => "session_started",
            ChatEvent::MessageAppended { .. } => "message_appended",
            ChatEvent::LoadingChanged { .. } => "loading_changed",
            ChatEvent::SendFailed { .. } => "send_failed",
            ChatEvent::HistoryCleared { .. } => "history_cleared",
        }
    }
}
