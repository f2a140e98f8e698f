//! CLI argument definitions for the Careline terminal client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use careline_core::config::VoiceStrategyKind;

/// Careline: elderly-care support chat in the terminal.
#[derive(Parser, Debug)]
#[command(name = "careline", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the chat backend.
    #[arg(short = 'u', long = "api-url")]
    pub api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// How voice messages are sent to the backend.
    #[arg(long = "voice", value_enum)]
    pub voice: Option<VoiceArg>,

    /// Answer from canned replies instead of contacting a backend.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Open the chat panel immediately.
    #[arg(short = 'e', long = "expanded")]
    pub expanded: bool,

    /// Write every chat event to stderr as a JSON line.
    #[arg(long = "events")]
    pub events: bool,
}

/// `--voice` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VoiceArg {
    JsonReply,
    AudioReply,
    TranscribeThenChat,
    Disabled,
}

impl From<VoiceArg> for VoiceStrategyKind {
    fn from(arg: VoiceArg) -> Self {
        match arg {
            VoiceArg::JsonReply => VoiceStrategyKind::JsonReply,
            VoiceArg::AudioReply => VoiceStrategyKind::AudioReply,
            VoiceArg::TranscribeThenChat => VoiceStrategyKind::TranscribeThenChat,
            VoiceArg::Disabled => VoiceStrategyKind::Disabled,
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CARELINE_CONFIG env var > ~/.careline/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.config_path_from(std::env::var("CARELINE_CONFIG").ok())
    }

    fn config_path_from(&self, env: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env.filter(|p| !p.is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Whether the config path was given explicitly, in which case a
    /// missing or broken file is an error instead of a fallback to defaults.
    pub fn config_is_explicit(&self) -> bool {
        self.config.is_some()
    }

    /// Resolve the backend base URL.
    ///
    /// Priority: --api-url flag > CARELINE_API_URL env var > config file value.
    pub fn resolve_api_url(&self, config_url: &str) -> String {
        self.api_url_from(std::env::var("CARELINE_API_URL").ok(), config_url)
    }

    fn api_url_from(&self, env: Option<String>, config_url: &str) -> String {
        if let Some(ref url) = self.api_url {
            return url.clone();
        }
        if let Some(url) = env.filter(|u| !u.trim().is_empty()) {
            return url;
        }
        config_url.to_string()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the voice strategy.
    ///
    /// Priority: --voice flag > config file value.
    pub fn resolve_voice_strategy(&self, config_strategy: VoiceStrategyKind) -> VoiceStrategyKind {
        self.voice.map(Into::into).unwrap_or(config_strategy)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".careline").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".careline").join("config.toml");
    }
    PathBuf::from("config.toml")
}
