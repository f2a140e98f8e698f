//! Audio recording backends.
//!
//! [`AudioRecorder`] abstracts the platform's microphone. [`MockRecorder`]
//! produces a silent WAV clip without hardware; [`FileRecorder`] treats an
//! existing audio file as the microphone, which is how the terminal front
//! end sends voice messages.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use careline_core::error::{CarelineError, Result};
use careline_core::types::AudioClip;

/// Sample rate of clips produced by [`MockRecorder`].
pub const MOCK_SAMPLE_RATE: u32 = 16_000;

// =============================================================================
// Trait
// =============================================================================

/// A microphone-like audio source.
///
/// Implementations only manage the audio stream; status bookkeeping and the
/// elapsed-time counter live in [`crate::VoiceCapture`].
pub trait AudioRecorder: Send + Sync {
    /// Open the input and begin buffering audio.
    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    /// Hold buffering without closing the input.
    fn pause(&self) -> Result<()>;

    /// Continue buffering after a pause.
    fn resume(&self) -> Result<()>;

    /// Close the input and return everything buffered since `start`.
    fn stop(&self) -> impl Future<Output = Result<AudioClip>> + Send;

    /// Close the input and discard the buffer.
    fn cancel(&self);

    /// Whether the input is open.
    fn is_active(&self) -> bool;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Recorder that needs no audio hardware.
#[derive(Debug, Default)]
pub struct MockRecorder {
    active: AtomicBool,
    paused: AtomicBool,
    deny_permission: bool,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose `start` fails as if microphone access was refused.
    pub fn denied() -> Self {
        Self {
            deny_permission: true,
            ..Self::default()
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl AudioRecorder for MockRecorder {
    async fn start(&self) -> Result<()> {
        if self.deny_permission {
            return Err(CarelineError::Recorder(
                "microphone permission denied".to_string(),
            ));
        }
        if self.active.swap(true, Ordering::Relaxed) {
            return Err(CarelineError::Recorder(
                "recorder is already active".to_string(),
            ));
        }
        self.paused.store(false, Ordering::Relaxed);
        tracing::debug!("Mock recorder started");
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        if !self.is_active() {
            return Err(CarelineError::Recorder("recorder is not active".to_string()));
        }
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        if !self.is_active() {
            return Err(CarelineError::Recorder("recorder is not active".to_string()));
        }
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn stop(&self) -> Result<AudioClip> {
        if !self.active.swap(false, Ordering::Relaxed) {
            return Err(CarelineError::Recorder("recorder is not active".to_string()));
        }
        self.paused.store(false, Ordering::Relaxed);
        // A tenth of a second of 16-bit mono silence.
        let samples = vec![0u8; (MOCK_SAMPLE_RATE as usize / 10) * 2];
        let mut bytes = wav_header(samples.len() as u32, MOCK_SAMPLE_RATE);
        bytes.extend_from_slice(&samples);
        tracing::debug!(bytes = bytes.len(), "Mock recorder stopped");
        Ok(AudioClip {
            bytes,
            mime_type: "audio/wav".to_string(),
            file_name: "audio.wav".to_string(),
            duration_secs: 0,
        })
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// 44-byte RIFF header for 16-bit mono PCM.
pub fn wav_header(data_len: u32, sample_rate: u32) -> Vec<u8> {
    let byte_rate = sample_rate * 2;
    let mut h = Vec::with_capacity(44);
    h.extend_from_slice(b"RIFF");
    h.extend_from_slice(&(36 + data_len).to_le_bytes());
    h.extend_from_slice(b"WAVE");
    h.extend_from_slice(b"fmt ");
    h.extend_from_slice(&16u32.to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes()); // PCM
    h.extend_from_slice(&1u16.to_le_bytes()); // mono
    h.extend_from_slice(&sample_rate.to_le_bytes());
    h.extend_from_slice(&byte_rate.to_le_bytes());
    h.extend_from_slice(&2u16.to_le_bytes()); // block align
    h.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    h.extend_from_slice(b"data");
    h.extend_from_slice(&data_len.to_le_bytes());
    h
}

// =============================================================================
// File-backed implementation
// =============================================================================

/// Recorder that "captures" the contents of an audio file.
///
/// `start` checks the file is readable, `stop` reads it.
#[derive(Debug)]
pub struct FileRecorder {
    path: PathBuf,
    active: AtomicBool,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// MIME type guessed from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("m4a") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

impl AudioRecorder for FileRecorder {
    async fn start(&self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.path).await.map_err(|e| {
            CarelineError::Recorder(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(CarelineError::Recorder(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        if self.active.swap(true, Ordering::Relaxed) {
            return Err(CarelineError::Recorder(
                "recorder is already active".to_string(),
            ));
        }
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CarelineError::Recorder("recorder is not active".to_string()))
        }
    }

    fn resume(&self) -> Result<()> {
        self.pause()
    }

    async fn stop(&self) -> Result<AudioClip> {
        if !self.active.swap(false, Ordering::Relaxed) {
            return Err(CarelineError::Recorder("recorder is not active".to_string()));
        }
        let bytes = tokio::fs::read(&self.path).await?;
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        Ok(AudioClip {
            bytes,
            mime_type: mime_for_path(&self.path).to_string(),
            file_name,
            duration_secs: 0,
        })
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}
