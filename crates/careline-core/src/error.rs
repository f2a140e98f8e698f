use thiserror::Error;

/// Top-level error type for Careline.
///
/// Network failures never escape the conversation store; they are logged and
/// turned into an apology message in the thread. Everything else propagates
/// with `?` to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CarelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("No active session")]
    NoSession,

    #[error("Nothing to export: the conversation is empty")]
    EmptyTranscript,

    #[error("Voice messages are unavailable: {0}")]
    VoiceUnavailable(String),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Quick reply {index} out of range ({available} available)")]
    QuickReplyOutOfRange { index: usize, available: usize },
}

impl CarelineError {
    /// Whether this error came from talking to the backend.
    ///
    /// These are the failures the store replaces with an apology message.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CarelineError::Transport(_)
                | CarelineError::Backend { .. }
                | CarelineError::Decode(_)
                | CarelineError::VoiceUnavailable(_)
        )
    }
}

impl From<toml::de::Error> for CarelineError {
    fn from(err: toml::de::Error) -> Self {
        CarelineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CarelineError {
    fn from(err: toml::ser::Error) -> Self {
        CarelineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CarelineError {
    fn from(err: serde_json::Error) -> Self {
        CarelineError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CarelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CarelineError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            CarelineError::Backend {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            CarelineError::Transport(err.to_string())
        }
    }
}

/// A specialized `Result` type for Careline operations.
pub type Result<T> = std::result::Result<T, CarelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CarelineError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = CarelineError::Backend {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned 502: bad gateway");

        let err = CarelineError::QuickReplyOutOfRange {
            index: 4,
            available: 2,
        };
        assert_eq!(err.to_string(), "Quick reply 4 out of range (2 available)");

        let err = CarelineError::InvalidTransition {
            from: "Idle".to_string(),
            to: "Paused".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid state transition: Idle -> Paused");

        assert_eq!(
            CarelineError::EmptyTranscript.to_string(),
            "Nothing to export: the conversation is empty"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CarelineError = io_err.into();
        assert!(matches!(err, CarelineError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err: CarelineError = parse_err.into();
        assert!(matches!(err, CarelineError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CarelineError = json_err.into();
        assert!(matches!(err, CarelineError::Serialization(_)));
    }

    #[test]
    fn test_is_network() {
        assert!(CarelineError::Transport("refused".into()).is_network());
        assert!(CarelineError::Backend {
            status: 500,
            body: String::new()
        }
        .is_network());
        assert!(CarelineError::Decode("eof".into()).is_network());
        assert!(CarelineError::VoiceUnavailable("disabled".into()).is_network());

        assert!(!CarelineError::EmptyTranscript.is_network());
        assert!(!CarelineError::NoSession.is_network());
        assert!(!CarelineError::UnknownTopic("x".into()).is_network());
        assert!(!CarelineError::Recorder("denied".into()).is_network());
    }
}
