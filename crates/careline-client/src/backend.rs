//! The seam between the conversation store and the chat service.

use async_trait::async_trait;

use careline_core::config::CarelineConfig;
use careline_core::error::Result;
use careline_core::types::{AudioClip, ChatReply, SessionId, Topic};

use crate::api::{ApiClient, MessageRequest, StartRequest, MESSAGE_PATH, START_PATH};
use crate::voice::{uploader_for, VoiceOutcome, VoiceUploader};

/// Operations the conversation store needs from the backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a session for `topic` and return the greeting.
    async fn start(&self, topic: Topic) -> Result<ChatReply>;

    /// Send a text message within a session.
    async fn send_message(&self, session: &SessionId, topic: Topic, text: &str)
        -> Result<ChatReply>;

    /// Send a recorded voice clip within a session.
    async fn send_voice(
        &self,
        session: &SessionId,
        topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome>;
}

/// `ChatBackend` over HTTP.
pub struct HttpBackend {
    api: ApiClient,
    voice: Box<dyn VoiceUploader>,
}

impl HttpBackend {
    pub fn new(api: ApiClient, voice: Box<dyn VoiceUploader>) -> Self {
        Self { api, voice }
    }

    /// Build the client and voice strategy from configuration.
    pub fn from_config(config: &CarelineConfig) -> Result<Self> {
        let api = ApiClient::new(&config.backend)?;
        let voice = uploader_for(&config.voice);
        tracing::info!(
            base_url = %api.base_url(),
            voice_strategy = ?voice.kind(),
            "Chat backend configured"
        );
        Ok(Self::new(api, voice))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn start(&self, topic: Topic) -> Result<ChatReply> {
        let request = StartRequest {
            agent: topic.agent_id().to_string(),
        };
        self.api.post_json(START_PATH, &request).await
    }

    async fn send_message(
        &self,
        session: &SessionId,
        topic: Topic,
        text: &str,
    ) -> Result<ChatReply> {
        let request = MessageRequest {
            session_id: session.0.clone(),
            message: text.to_string(),
            agent: topic.agent_id().to_string(),
        };
        self.api.post_json(MESSAGE_PATH, &request).await
    }

    async fn send_voice(
        &self,
        session: &SessionId,
        topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        self.voice.upload(&self.api, session, topic, clip).await
    }
}
