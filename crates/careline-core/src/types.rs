use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CarelineError;

// =============================================================================
// Enums
// =============================================================================

/// Conversation topic, selecting which backend agent handles the chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Finding elderly-care services.
    Service,
    /// Applying for elderly care.
    Apply,
    /// Finding contact information.
    Contact,
    /// General questions.
    General,
}

impl Topic {
    /// Every topic, in menu order.
    pub const ALL: [Topic; 4] = [Topic::Service, Topic::Apply, Topic::Contact, Topic::General];

    /// Agent identifier sent to the backend.
    pub fn agent_id(&self) -> &'static str {
        match self {
            Topic::Service => "service",
            Topic::Apply => "apply",
            Topic::Contact => "contact",
            Topic::General => "general",
        }
    }

    /// Human-readable label shown in the menu and header.
    pub fn label(&self) -> &'static str {
        match self {
            Topic::Service => "Hitta äldreomsorg",
            Topic::Apply => "Att söka äldreomsorg",
            Topic::Contact => "Hitta kontaktinformation",
            Topic::General => "Allmäna frågor",
        }
    }

    /// Menu icon name.
    pub fn icon(&self) -> &'static str {
        match self {
            Topic::Service => "tree",
            Topic::Apply => "book",
            Topic::Contact => "chat",
            Topic::General => "leaf",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_id())
    }
}

impl FromStr for Topic {
    type Err = CarelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Topic::ALL
            .into_iter()
            .find(|t| t.agent_id() == key)
            .ok_or_else(|| CarelineError::UnknownTopic(s.to_string()))
    }
}

/// Who sent a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Sender label shown above a message.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "Du",
            Role::Assistant => "Assistent",
        }
    }
}

/// How a message body should be presented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Voice,
}

// =============================================================================
// Cards and references
// =============================================================================

/// A structured service listing rendered inline in the thread.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ServiceCardWire")]
pub struct ServiceCard {
    pub name: String,
    pub description: String,
    pub contact: String,
    pub url: String,
    pub images: Vec<String>,
}

/// Accepts the field names used by different backend revisions.
#[derive(Deserialize)]
struct ServiceCardWire {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "about")]
    description: String,
    #[serde(default)]
    contact: String,
    #[serde(default, alias = "source")]
    url: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    image: Option<String>,
}

impl From<ServiceCardWire> for ServiceCard {
    fn from(wire: ServiceCardWire) -> Self {
        let mut images = wire.images;
        if let Some(image) = wire.image.filter(|i| !i.is_empty()) {
            if !images.contains(&image) {
                images.insert(0, image);
            }
        }
        Self {
            name: wire.name,
            description: wire.description,
            contact: wire.contact,
            url: wire.url,
            images,
        }
    }
}

/// A link reference rendered as a preview card.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image: String,
}

impl Reference {
    /// Host part of the URL, without a leading `www.`.
    pub fn domain(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(self.url.as_str());
        let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
        host.strip_prefix("www.").unwrap_or(host)
    }
}

// =============================================================================
// Audio
// =============================================================================

/// A recorded audio clip awaiting upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub duration_secs: u64,
}

impl AudioClip {
    /// Describe this clip for storage in message history (drops the bytes).
    pub fn to_ref(&self) -> AudioRef {
        AudioRef {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            byte_len: self.bytes.len(),
            duration_secs: self.duration_secs,
        }
    }
}

/// Metadata about the audio a voice message carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub file_name: String,
    pub mime_type: String,
    pub byte_len: usize,
    pub duration_secs: u64,
}

// =============================================================================
// Session and messages
// =============================================================================

/// Backend-issued session identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response body of the `start`, `message` and JSON `voice` endpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatReply {
    pub session_id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub quick_replies: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub references: Vec<Reference>,
    #[serde(deserialize_with = "null_as_default")]
    pub service_cards: Vec<ServiceCard>,
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single entry in a topic's history.
///
/// Messages are never edited after they are appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub kind: MessageKind,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_cards: Vec<ServiceCard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRef>,
}

impl Message {
    fn new(role: Role, kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            kind,
            body: body.into(),
            timestamp: Utc::now(),
            quick_replies: Vec::new(),
            service_cards: Vec::new(),
            references: Vec::new(),
            audio: None,
        }
    }

    /// A text message typed by the user.
    pub fn user_text(body: impl Into<String>) -> Self {
        Self::new(Role::User, MessageKind::Text, body)
    }

    /// A voice clip sent by the user.
    pub fn user_voice(label: impl Into<String>, audio: AudioRef) -> Self {
        let mut msg = Self::new(Role::User, MessageKind::Voice, label);
        msg.audio = Some(audio);
        msg
    }

    /// A plain assistant message with no attachments.
    pub fn assistant_text(body: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageKind::Text, body)
    }

    /// A voice clip returned by the assistant.
    pub fn assistant_voice(label: impl Into<String>, audio: AudioRef) -> Self {
        let mut msg = Self::new(Role::Assistant, MessageKind::Voice, label);
        msg.audio = Some(audio);
        msg
    }

    /// An assistant message built from a backend reply.
    pub fn from_reply(reply: ChatReply) -> Self {
        let mut msg = Self::new(Role::Assistant, MessageKind::Text, reply.message);
        msg.quick_replies = reply.quick_replies;
        msg.service_cards = reply.service_cards;
        msg.references = reply.references;
        msg
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
