//! Pluggable voice upload strategies.
//!
//! Backend revisions disagree on what the voice endpoint returns, so the
//! contract is chosen by `voice.strategy` in the configuration.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use careline_core::config::{VoiceConfig, VoiceStrategyKind};
use careline_core::error::{CarelineError, Result};
use careline_core::types::{AudioClip, AudioRef, ChatReply, SessionId, Topic};

use crate::api::{ApiClient, MessageRequest, MESSAGE_PATH};

/// What the assistant answered to a voice clip.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceReply {
    /// A regular chat reply.
    Chat(ChatReply),
    /// An audio clip.
    Audio(AudioRef),
}

/// Result of uploading one voice clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceOutcome {
    /// Text recognised by the backend, when the strategy exposes it.
    pub transcript: Option<String>,
    pub reply: VoiceReply,
}

impl VoiceOutcome {
    pub fn chat(reply: ChatReply) -> Self {
        Self {
            transcript: None,
            reply: VoiceReply::Chat(reply),
        }
    }
}

/// Body of a transcription response.
#[derive(Debug, Deserialize)]
struct TranscriptionReply {
    #[serde(alias = "transcription")]
    text: String,
}

/// Turns a recorded clip into an assistant reply.
#[async_trait]
pub trait VoiceUploader: Send + Sync {
    fn kind(&self) -> VoiceStrategyKind;

    async fn upload(
        &self,
        api: &ApiClient,
        session: &SessionId,
        topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome>;
}

/// Build the uploader selected by the configuration.
pub fn uploader_for(config: &VoiceConfig) -> Box<dyn VoiceUploader> {
    match config.strategy {
        VoiceStrategyKind::JsonReply => Box::new(JsonReplyUploader {
            path: config.upload_path.clone(),
        }),
        VoiceStrategyKind::AudioReply => Box::new(AudioReplyUploader {
            path: config.upload_path.clone(),
        }),
        VoiceStrategyKind::TranscribeThenChat => Box::new(TranscribeThenChat {
            path: config.transcribe_path.clone(),
        }),
        VoiceStrategyKind::Disabled => Box::new(DisabledUploader),
    }
}

/// Multipart form carrying `session_id` and `audio_file`.
fn voice_form(session: &SessionId, clip: &AudioClip) -> Result<Form> {
    let part = Part::bytes(clip.bytes.clone())
        .file_name(clip.file_name.clone())
        .mime_str(&clip.mime_type)?;
    Ok(Form::new()
        .text("session_id", session.0.clone())
        .part("audio_file", part))
}

/// Uploads the clip; the response is a JSON chat reply.
pub struct JsonReplyUploader {
    path: String,
}

#[async_trait]
impl VoiceUploader for JsonReplyUploader {
    fn kind(&self) -> VoiceStrategyKind {
        VoiceStrategyKind::JsonReply
    }

    async fn upload(
        &self,
        api: &ApiClient,
        session: &SessionId,
        _topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        let reply: ChatReply = api
            .post_multipart(&self.path, voice_form(session, clip)?)
            .await?;
        Ok(VoiceOutcome::chat(reply))
    }
}

/// Uploads the clip; the response body is audio.
///
/// A JSON body is still accepted and treated as a chat reply.
pub struct AudioReplyUploader {
    path: String,
}

#[async_trait]
impl VoiceUploader for AudioReplyUploader {
    fn kind(&self) -> VoiceStrategyKind {
        VoiceStrategyKind::AudioReply
    }

    async fn upload(
        &self,
        api: &ApiClient,
        session: &SessionId,
        _topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        let raw = api
            .post_multipart_raw(&self.path, voice_form(session, clip)?)
            .await?;
        if raw.is_json() {
            let reply: ChatReply = serde_json::from_slice(&raw.bytes)
                .map_err(|e| CarelineError::Decode(e.to_string()))?;
            return Ok(VoiceOutcome::chat(reply));
        }
        if raw.bytes.is_empty() {
            return Err(CarelineError::Decode("empty audio reply".to_string()));
        }
        let mime_type = raw
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or("audio/mpeg")
            .to_string();
        let ext = extension_for(&mime_type);
        Ok(VoiceOutcome {
            transcript: None,
            reply: VoiceReply::Audio(AudioRef {
                file_name: format!("reply.{}", ext),
                mime_type,
                byte_len: raw.bytes.len(),
                duration_secs: 0,
            }),
        })
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/mp4" | "audio/aac" => "m4a",
        _ => "mp3",
    }
}

/// Uploads the clip for transcription, then sends the text as a message.
pub struct TranscribeThenChat {
    path: String,
}

#[async_trait]
impl VoiceUploader for TranscribeThenChat {
    fn kind(&self) -> VoiceStrategyKind {
        VoiceStrategyKind::TranscribeThenChat
    }

    async fn upload(
        &self,
        api: &ApiClient,
        session: &SessionId,
        topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        let transcription: TranscriptionReply = api
            .post_multipart(&self.path, voice_form(session, clip)?)
            .await?;
        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            return Err(CarelineError::Decode("empty transcription".to_string()));
        }
        tracing::debug!(chars = text.len(), "Voice clip transcribed");

        let request = MessageRequest {
            session_id: session.0.clone(),
            message: text.clone(),
            agent: topic.agent_id().to_string(),
        };
        let reply: ChatReply = api.post_json(MESSAGE_PATH, &request).await?;
        Ok(VoiceOutcome {
            transcript: Some(text),
            reply: VoiceReply::Chat(reply),
        })
    }
}

/// Rejects every clip.
pub struct DisabledUploader;

#[async_trait]
impl VoiceUploader for DisabledUploader {
    fn kind(&self) -> VoiceStrategyKind {
        VoiceStrategyKind::Disabled
    }

    async fn upload(
        &self,
        _api: &ApiClient,
        _session: &SessionId,
        _topic: Topic,
        _clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        Err(CarelineError::VoiceUnavailable(
            "voice input is disabled in the configuration".to_string(),
        ))
    }
}
