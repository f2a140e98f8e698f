//! One voice-input interaction: record, pause, play back, send or discard.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use careline_core::error::{CarelineError, Result};
use careline_core::types::AudioClip;

use crate::recorder::AudioRecorder;
use crate::state::{RecorderStatus, StatusMachine};

/// Drives an [`AudioRecorder`] through one recording and keeps the
/// elapsed-seconds counter the composer displays.
///
/// The counter is advanced by a background ticker while the status is
/// `Recording`. When it reaches `max_duration_secs` the ticker stops and
/// raises a flag; [`VoiceCapture::enforce_limit`] then finalizes the clip.
pub struct VoiceCapture<R: AudioRecorder + 'static> {
    recorder: Arc<R>,
    status: StatusMachine,
    elapsed: Arc<AtomicU64>,
    limit_reached: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    clip: Option<AudioClip>,
    playing: bool,
    max_duration_secs: u64,
    tick: Duration,
}

impl<R: AudioRecorder + 'static> VoiceCapture<R> {
    pub fn new(recorder: R, max_duration_secs: u64) -> Self {
        Self {
            recorder: Arc::new(recorder),
            status: StatusMachine::new(),
            elapsed: Arc::new(AtomicU64::new(0)),
            limit_reached: Arc::new(AtomicBool::new(false)),
            ticker: None,
            clip: None,
            playing: false,
            max_duration_secs,
            tick: Duration::from_secs(1),
        }
    }

    /// Override the ticker period. A "second" of elapsed time is one tick.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn status(&self) -> RecorderStatus {
        self.status.current()
    }

    /// True from `start` until the clip is sent or discarded.
    pub fn is_active(&self) -> bool {
        self.status() != RecorderStatus::Idle
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Seconds to show in the composer: the running counter while
    /// recording, the clip length once stopped.
    pub fn display_secs(&self) -> u64 {
        match (&self.clip, self.status()) {
            (Some(clip), RecorderStatus::Stopped) => clip.duration_secs,
            _ => self.elapsed_secs(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached.load(Ordering::Relaxed)
    }

    /// Open the microphone and start counting.
    ///
    /// If the recorder refuses (e.g. permission denied) the failure is
    /// logged and the status stays `Idle`.
    pub async fn start(&mut self) -> Result<()> {
        if self.status() != RecorderStatus::Idle {
            return Err(CarelineError::InvalidTransition {
                from: self.status().to_string(),
                to: RecorderStatus::Recording.to_string(),
            });
        }
        if let Err(e) = self.recorder.start().await {
            tracing::warn!(error = %e, "Could not start recording");
            return Err(e);
        }
        self.status.transition(RecorderStatus::Recording)?;
        self.elapsed.store(0, Ordering::Relaxed);
        self.limit_reached.store(false, Ordering::Relaxed);
        self.playing = false;
        self.clip = None;
        self.spawn_ticker();
        tracing::info!("Voice recording started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.status.transition(RecorderStatus::Paused)?;
        if let Err(e) = self.recorder.pause() {
            self.status.transition(RecorderStatus::Recording)?;
            return Err(e);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.status.transition(RecorderStatus::Recording)?;
        if let Err(e) = self.recorder.resume() {
            self.status.transition(RecorderStatus::Paused)?;
            return Err(e);
        }
        Ok(())
    }

    /// Close the microphone and keep the clip for playback or sending.
    pub async fn stop(&mut self) -> Result<&AudioClip> {
        let current = self.status();
        if !current.is_capturing() {
            return Err(CarelineError::InvalidTransition {
                from: current.to_string(),
                to: RecorderStatus::Stopped.to_string(),
            });
        }
        self.stop_ticker();
        let mut clip = match self.recorder.stop().await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "Recorder failed to stop cleanly");
                self.discard();
                return Err(e);
            }
        };
        clip.duration_secs = self.elapsed.swap(0, Ordering::Relaxed);
        self.status.transition(RecorderStatus::Stopped)?;
        tracing::info!(
            duration_secs = clip.duration_secs,
            bytes = clip.bytes.len(),
            "Voice recording stopped"
        );
        Ok(&*self.clip.insert(clip))
    }

    /// Finalize the recording if the ticker hit the duration limit.
    ///
    /// Returns `true` when the recording was stopped by this call.
    pub async fn enforce_limit(&mut self) -> Result<bool> {
        if self.limit_reached() && self.status().is_capturing() {
            tracing::info!(
                max_duration_secs = self.max_duration_secs,
                "Recording reached maximum duration"
            );
            self.stop().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flip the playback flag of a stopped clip. Returns the new value.
    pub fn toggle_playback(&mut self) -> Result<bool> {
        if self.status() != RecorderStatus::Stopped {
            return Err(CarelineError::InvalidTransition {
                from: self.status().to_string(),
                to: "Playing".to_string(),
            });
        }
        self.playing = !self.playing;
        Ok(self.playing)
    }

    /// Hand the clip over for sending; the capture returns to `Idle`.
    ///
    /// Stops the recording first if it is still running.
    pub async fn take_clip(&mut self) -> Result<AudioClip> {
        if self.status().is_capturing() {
            self.stop().await?;
        }
        let clip = self.clip.take().ok_or_else(|| {
            CarelineError::Recorder("no recorded clip to send".to_string())
        })?;
        self.status.transition(RecorderStatus::Idle)?;
        self.playing = false;
        Ok(clip)
    }

    /// Abandon the interaction and discard any audio.
    pub fn cancel(&mut self) {
        if self.status() != RecorderStatus::Idle {
            tracing::info!("Voice recording cancelled");
        }
        self.discard();
    }

    fn discard(&mut self) {
        self.stop_ticker();
        if self.recorder.is_active() {
            self.recorder.cancel();
        }
        self.clip = None;
        self.playing = false;
        self.elapsed.store(0, Ordering::Relaxed);
        self.limit_reached.store(false, Ordering::Relaxed);
        self.status.reset();
    }

    fn spawn_ticker(&mut self) {
        self.stop_ticker();
        let status = self.status.clone();
        let elapsed = Arc::clone(&self.elapsed);
        let limit_reached = Arc::clone(&self.limit_reached);
        let max = self.max_duration_secs;
        let tick = self.tick;
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                match status.current() {
                    RecorderStatus::Recording => {
                        let n = elapsed.fetch_add(1, Ordering::Relaxed) + 1;
                        if n >= max {
                            limit_reached.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                    RecorderStatus::Paused => {}
                    RecorderStatus::Idle | RecorderStatus::Stopped => break,
                }
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl<R: AudioRecorder + 'static> Drop for VoiceCapture<R> {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Render seconds as `m:ss`.
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
