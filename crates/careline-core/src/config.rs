use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CarelineError, Result};
use crate::types::Topic;

/// Top-level configuration for Careline.
///
/// Loaded from `~/.careline/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarelineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
}

impl CarelineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CarelineConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Read only `general.log_level` from a config file.
    ///
    /// Used to set up logging before the full load, so load warnings are
    /// not lost. Returns `None` when the file is missing, unparsable, or has
    /// no log level.
    pub fn peek_log_level(path: &Path) -> Option<String> {
        let content = std::fs::read_to_string(path).ok()?;
        let value: toml::Value = toml::from_str(&content).ok()?;
        value
            .get("general")?
            .get("log_level")?
            .as_str()
            .map(str::to_string)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CarelineError::Config(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                self.backend.base_url
            )));
        }
        if self.backend.timeout_secs == 0 {
            return Err(CarelineError::Config(
                "backend.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.topics.enabled.is_empty() {
            return Err(CarelineError::Config(
                "topics.enabled must list at least one topic".to_string(),
            ));
        }
        if self.voice.max_duration_secs == 0 {
            return Err(CarelineError::Config(
                "voice.max_duration_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Directory that exported transcripts are written to.
    pub export_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            export_dir: ".".to_string(),
        }
    }
}

/// Chat backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL the `/api/chatbot/*` paths are appended to.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Keep backend cookies between requests.
    pub cookies: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            cookies: true,
        }
    }
}

/// How a recorded voice clip is turned into an assistant reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStrategyKind {
    /// Upload the clip; the backend answers with a JSON chat reply.
    #[default]
    JsonReply,
    /// Upload the clip; the backend answers with raw audio.
    AudioReply,
    /// Upload the clip for transcription, then send the text as a chat message.
    TranscribeThenChat,
    /// Voice input is turned off.
    Disabled,
}

/// Voice capture and upload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub strategy: VoiceStrategyKind,
    /// Upload path for `json_reply` and `audio_reply`.
    pub upload_path: String,
    /// Upload path for `transcribe_then_chat`.
    pub transcribe_path: String,
    /// Recording stops automatically after this many seconds.
    pub max_duration_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            strategy: VoiceStrategyKind::JsonReply,
            upload_path: "/api/chatbot/voice".to_string(),
            transcribe_path: "/api/chatbot/voice".to_string(),
            max_duration_secs: 120,
        }
    }
}

/// User-facing texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Shown when the greeting request fails.
    pub greeting_error: String,
    /// Shown when a text or voice send fails.
    pub send_error: String,
    /// Body of the user's voice message in the thread.
    pub voice_placeholder: String,
    /// Body of an assistant voice reply in the thread.
    pub assistant_voice_placeholder: String,
    /// Header shown when no topic is selected.
    pub back_label: String,
    /// Open the panel on launch instead of showing the launcher.
    pub start_expanded: bool,
    /// Keep a topic's messages when returning to topic selection.
    /// The backend session is dropped either way.
    pub keep_history: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            greeting_error: "Tyvärr kunde jag inte starta konversationen just nu. Försök igen senare."
                .to_string(),
            send_error: "Något gick fel. Försök igen senare.".to_string(),
            voice_placeholder: "Röstmeddelande".to_string(),
            assistant_voice_placeholder: "Röstsvar".to_string(),
            back_label: "Tillbaka".to_string(),
            start_expanded: false,
            keep_history: false,
        }
    }
}

/// Which topics the selection screen offers, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub enabled: Vec<Topic>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            enabled: Topic::ALL.to_vec(),
        }
    }
}
