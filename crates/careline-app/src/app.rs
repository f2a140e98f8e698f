//! Terminal front end: routes commands to the store and renders events.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use careline_chat::{
    export_transcript, header_title, ConversationStore, ExportFormat, Panel, Screen, SendOutcome,
    ThreadRow, ThreadView, TopicMenu,
};
use careline_client::ChatBackend;
use careline_core::config::CarelineConfig;
use careline_core::error::CarelineError;
use careline_core::events::ChatEvent;
use careline_core::types::{Role, Topic};
use careline_voice::{format_elapsed, FileRecorder, MockRecorder, VoiceCapture};

use crate::commands::{help_text, Command};

/// Whether the main loop should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    store: ConversationStore,
    events: broadcast::Receiver<ChatEvent>,
    panel: Panel,
    menu: TopicMenu,
    recording: Option<VoiceCapture<MockRecorder>>,
    max_duration_secs: u64,
    export_dir: PathBuf,
    last_role: Option<Role>,
}

impl App {
    pub fn new(config: &CarelineConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let store = ConversationStore::from_config(backend, config);
        let events = store.subscribe();
        Self {
            store,
            events,
            panel: Panel::new(config.ui.start_expanded),
            menu: TopicMenu::from_config(config),
            recording: None,
            max_duration_secs: config.voice.max_duration_secs,
            export_dir: PathBuf::from(&config.general.export_dir),
            last_role: None,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn screen(&self) -> Screen {
        self.panel.screen()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.as_ref().is_some_and(|c| c.is_active())
    }

    /// Draw the current screen from scratch.
    pub fn render_screen<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self.panel.screen() {
            Screen::Launcher => writeln!(out, "[ Careline ] Tryck Enter för att öppna chatten."),
            Screen::TopicMenu => {
                writeln!(out, "== {} ==", header_title(None, &self.store.ui().back_label))?;
                write!(out, "{}", self.menu.render_text())
            }
            Screen::Thread => {
                writeln!(
                    out,
                    "== {} ==",
                    header_title(self.store.current_topic(), &self.store.ui().back_label)
                )?;
                write!(out, "{}", ThreadView::build(&self.store).render_text())
            }
        }
    }

    pub fn prompt(&self) -> &'static str {
        match (self.screen(), self.is_recording()) {
            (Screen::Thread, true) => "(rec) > ",
            (Screen::Thread, false) => "> ",
            (Screen::TopicMenu, _) => "ämne> ",
            (Screen::Launcher, _) => "",
        }
    }

    /// Parse and handle one line of input.
    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        let command = Command::parse(line, self.panel.screen());
        if command.is_network() {
            writeln!(out, "  ...")?;
            out.flush()?;
        }
        self.handle(command, out).await
    }

    pub async fn handle<W: Write>(&mut self, command: Command, out: &mut W) -> io::Result<Flow> {
        tracing::debug!(?command, screen = %self.panel.screen(), "Handling command");
        let result = match command {
            Command::Empty => Ok(()),
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                write!(out, "{}", help_text(self.panel.screen()))?;
                Ok(())
            }
            Command::Toggle => {
                if self.panel.screen() == Screen::Thread {
                    self.leave_thread();
                }
                self.panel.toggle();
                self.drain_events(out)?;
                self.render_screen(out)?;
                Ok(())
            }
            Command::SelectTopic(input) => match self.menu.select(&input) {
                Ok(topic) => self.open_topic(topic, out).await,
                Err(e) => Err(e),
            },
            Command::Send(text) => self.store.send_text(Some(&text)).await.map(drop),
            Command::QuickReply(index) => self.store.select_quick_reply(index).await.map(drop),
            Command::Clear => self.store.clear_history(),
            Command::Back => {
                self.leave_thread();
                self.panel.back_to_menu();
                self.drain_events(out)?;
                self.render_screen(out)?;
                Ok(())
            }
            Command::Export(format) => self.export(format.as_deref(), out),
            Command::VoiceFile(path) => self.send_file(path).await,
            Command::Record => self.start_recording(out).await,
            Command::Pause => self.with_recording(|c| c.pause()),
            Command::Resume => self.with_recording(|c| c.resume()),
            Command::Stop => self.stop_recording(out).await,
            Command::Play => self.toggle_playback(out),
            Command::SendRecording => match self.recording.as_mut() {
                Some(capture) => self.store.send_recording(capture).await.map(drop),
                None => Err(no_recording()),
            },
            Command::CancelRecording => {
                if let Some(capture) = self.recording.as_mut() {
                    capture.cancel();
                }
                self.store.set_voice_input_active(false);
                Ok(())
            }
            Command::Unknown(input) => {
                writeln!(out, "! Okänt kommando: {} (/help)", input)?;
                Ok(())
            }
        };

        self.drain_events(out)?;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Command failed");
            writeln!(out, "! {}", e)?;
        }
        Ok(Flow::Continue)
    }

    /// Finalize a recording that reached its maximum length.
    ///
    /// Returns whether anything was written.
    pub async fn tick<W: Write>(&mut self, out: &mut W) -> io::Result<bool> {
        let Some(capture) = self.recording.as_mut() else {
            return Ok(false);
        };
        match capture.enforce_limit().await {
            Ok(true) => {
                writeln!(
                    out,
                    "\n  Maxlängd nådd, inspelningen stoppad ({}). /send eller /cancel",
                    format_elapsed(capture.display_secs())
                )?;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                writeln!(out, "\n! {}", e)?;
                Ok(true)
            }
        }
    }

    async fn open_topic<W: Write>(&mut self, topic: Topic, out: &mut W) -> Result<(), CarelineError> {
        self.panel.open_thread();
        self.last_role = None;
        let outcome = self.store.start_conversation(topic).await;
        if let Ok(SendOutcome::Resumed) = outcome {
            // Earlier messages produce no events; draw them once.
            self.drain_events(out)?;
            write!(out, "{}", ThreadView::build(&self.store).render_text())?;
            self.last_role = self.store.messages().last().map(|m| m.role);
        }
        outcome.map(drop)
    }

    fn leave_thread(&mut self) {
        if let Some(capture) = self.recording.as_mut() {
            capture.cancel();
        }
        self.store.return_to_topics();
        self.last_role = None;
    }

    fn export<W: Write>(&self, format: Option<&str>, out: &mut W) -> Result<(), CarelineError> {
        let format: ExportFormat = match format {
            Some(f) => f.parse()?,
            None => ExportFormat::default(),
        };
        let topic = self.store.current_topic().ok_or(CarelineError::NoSession)?;
        let path = export_transcript(&self.export_dir, topic, self.store.messages(), format)?;
        writeln!(out, "  Sparad: {}", path.display())?;
        Ok(())
    }

    async fn send_file(&mut self, path: PathBuf) -> Result<(), CarelineError> {
        let mut capture = VoiceCapture::new(FileRecorder::new(path), self.max_duration_secs);
        capture.start().await?;
        self.store.send_recording(&mut capture).await.map(drop)
    }

    async fn start_recording<W: Write>(&mut self, out: &mut W) -> Result<(), CarelineError> {
        let max = self.max_duration_secs;
        let capture = self
            .recording
            .get_or_insert_with(|| VoiceCapture::new(MockRecorder::new(), max));
        capture.cancel();
        capture.start().await?;
        self.store.set_voice_input_active(true);
        writeln!(out, "  Spelar in ... (max {})", format_elapsed(max))?;
        Ok(())
    }

    async fn stop_recording<W: Write>(&mut self, out: &mut W) -> Result<(), CarelineError> {
        let capture = self.recording.as_mut().ok_or_else(no_recording)?;
        let clip = capture.stop().await?;
        writeln!(
            out,
            "  Inspelning klar ({}). /play, /send eller /cancel",
            format_elapsed(clip.duration_secs)
        )?;
        Ok(())
    }

    fn toggle_playback<W: Write>(&mut self, out: &mut W) -> Result<(), CarelineError> {
        let capture = self.recording.as_mut().ok_or_else(no_recording)?;
        let playing = capture.toggle_playback()?;
        writeln!(
            out,
            "{}",
            if playing { "  Spelar upp" } else { "  Uppspelning pausad" }
        )?;
        Ok(())
    }

    fn with_recording<F>(&mut self, f: F) -> Result<(), CarelineError>
    where
        F: FnOnce(&mut VoiceCapture<MockRecorder>) -> Result<(), CarelineError>,
    {
        let capture = self.recording.as_mut().ok_or_else(no_recording)?;
        f(capture)
    }

    /// Render everything the store published since the last call.
    fn drain_events<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.render_event(&event, out)?,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Renderer fell behind the event stream");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
            }
        }
    }

    fn render_event<W: Write>(&mut self, event: &ChatEvent, out: &mut W) -> io::Result<()> {
        match event {
            ChatEvent::TopicChanged {
                topic: Some(topic), ..
            } => writeln!(out, "== {} ==", topic.label()),
            ChatEvent::MessageAppended { topic, message, .. }
                if Some(*topic) == self.store.current_topic() =>
            {
                let show_label = self.last_role != Some(message.role);
                self.last_role = Some(message.role);
                write!(out, "{}", ThreadRow::standalone(message, show_label).render_text())
            }
            ChatEvent::HistoryCleared { topic, .. }
                if Some(*topic) == self.store.current_topic() =>
            {
                self.last_role = None;
                writeln!(out, "  (historiken rensad)")
            }
            _ => Ok(()),
        }
    }
}

fn no_recording() -> CarelineError {
    CarelineError::Recorder("ingen inspelning".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use careline_client::MockBackend;
    use careline_core::types::ChatReply;

    fn app_with(mock: Arc<MockBackend>) -> (App, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CarelineConfig::default();
        config.general.export_dir = dir.path().to_string_lossy().to_string();
        (App::new(&config, mock), dir)
    }

    async fn run(app: &mut App, line: &str) -> String {
        let mut out = Vec::new();
        app.handle_line(line, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_launcher_to_thread() {
        let (mut app, _dir) = app_with(Arc::new(MockBackend::new()));
        assert_eq!(app.screen(), Screen::Launcher);

        let out = run(&mut app, "").await;
        assert_eq!(app.screen(), Screen::TopicMenu);
        assert!(out.contains("== Tillbaka =="));
        assert!(out.contains("1. [tree] Hitta äldreomsorg"));

        let out = run(&mut app, "2").await;
        assert_eq!(app.screen(), Screen::Thread);
        assert!(out.contains("== Att söka äldreomsorg =="));
        assert!(out.contains("Assistent:\n  Hej! Välkommen till Att söka äldreomsorg.\n"));
    }

    #[tokio::test]
    async fn test_conversation_rendering() {
        let mock = Arc::new(MockBackend::new());
        mock.push_reply(ChatReply {
            message: "Hej!".into(),
            quick_replies: vec!["Boende".into()],
            ..ChatReply::default()
        });
        let (mut app, _dir) = app_with(Arc::clone(&mock));
        run(&mut app, "").await;
        run(&mut app, "service").await;

        let out = run(&mut app, "/1").await;
        assert!(out.contains("Du:\n  Boende\n"));
        assert!(out.contains("Assistent:\n  Du skrev: Boende\n"));

        let out = run(&mut app, "/1").await;
        assert!(out.contains("! Quick reply 0 out of range"));

        let out = run(&mut app, "en fråga till").await;
        assert!(out.contains("Du:\n  en fråga till\n"));
    }

    #[tokio::test]
    async fn test_failure_renders_apology() {
        let mock = Arc::new(MockBackend::new());
        let (mut app, _dir) = app_with(Arc::clone(&mock));
        run(&mut app, "").await;
        run(&mut app, "4").await;
        mock.push_failure("down");

        let out = run(&mut app, "hej").await;
        assert!(out.contains("Något gick fel. Försök igen senare."));
    }

    #[tokio::test]
    async fn test_record_and_send() {
        let mock = Arc::new(MockBackend::new());
        let (mut app, _dir) = app_with(Arc::clone(&mock));
        run(&mut app, "").await;
        run(&mut app, "contact").await;

        let out = run(&mut app, "/send").await;
        assert!(out.contains("! Recorder error"));

        run(&mut app, "/record").await;
        assert!(app.is_recording());
        assert!(app.store().voice_input_active());
        run(&mut app, "/stop").await;
        let out = run(&mut app, "/play").await;
        assert!(out.contains("Spelar upp"));

        let out = run(&mut app, "/send").await;
        assert!(out.contains("[Röstmeddelande] audio.wav"));
        assert!(out.contains("Jag har tagit emot ditt röstmeddelande."));
        assert!(!app.is_recording());
    }

    #[tokio::test]
    async fn test_back_clear_and_export() {
        let (mut app, dir) = app_with(Arc::new(MockBackend::new()));
        run(&mut app, "").await;
        run(&mut app, "1").await;

        let out = run(&mut app, "/export txt").await;
        assert!(out.contains("Sparad:"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let out = run(&mut app, "/clear").await;
        assert!(out.contains("(historiken rensad)"));
        assert!(app.store().messages().is_empty());

        let out = run(&mut app, "/export").await;
        assert!(out.contains("! Nothing to export"));

        let out = run(&mut app, "/back").await;
        assert_eq!(app.screen(), Screen::TopicMenu);
        assert!(out.contains("1. [tree]"));
        assert!(app.store().current_topic().is_none());
    }

    /// Accepts nothing; every write fails.
    struct ClosedOutput;

    impl Write for ClosedOutput {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_errors_reach_the_caller() {
        let (mut app, _dir) = app_with(Arc::new(MockBackend::new()));
        run(&mut app, "").await;
        run(&mut app, "contact").await;
        run(&mut app, "/record").await;

        assert!(app.handle(Command::Stop, &mut ClosedOutput).await.is_err());
        assert!(app.handle(Command::Play, &mut ClosedOutput).await.is_err());
        assert!(app.handle(Command::Export(None), &mut ClosedOutput).await.is_err());
        assert!(app.handle(Command::Record, &mut ClosedOutput).await.is_err());
        assert!(app.is_recording());
    }

    #[tokio::test]
    async fn test_close_from_thread_resets() {
        let (mut app, _dir) = app_with(Arc::new(MockBackend::new()));
        run(&mut app, "").await;
        run(&mut app, "1").await;
        let out = run(&mut app, "/close").await;
        assert_eq!(app.screen(), Screen::Launcher);
        assert!(out.contains("Tryck Enter"));
        assert!(app.store().current_topic().is_none());
    }

    #[tokio::test]
    async fn test_resumed_topic_is_redrawn() {
        let mock = Arc::new(MockBackend::new());
        let mut config = CarelineConfig::default();
        config.ui.keep_history = true;
        config.ui.start_expanded = true;
        let mut app = App::new(&config, Arc::clone(&mock) as Arc<dyn ChatBackend>);
        assert_eq!(app.screen(), Screen::TopicMenu);

        run(&mut app, "general").await;
        run(&mut app, "hej").await;
        run(&mut app, "/back").await;

        let out = run(&mut app, "general").await;
        assert_eq!(out.matches("== Allmäna frågor ==").count(), 1);
        assert!(out.contains("Du:\n  hej\n"));
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_enforces_recording_limit() {
        let mut config = CarelineConfig::default();
        config.voice.max_duration_secs = 2;
        config.ui.start_expanded = true;
        let mut app = App::new(&config, Arc::new(MockBackend::new()));
        run(&mut app, "1").await;
        run(&mut app, "/record").await;

        let mut out = Vec::new();
        assert!(!app.tick(&mut out).await.unwrap());
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        assert!(app.tick(&mut out).await.unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Maxlängd nådd"));
        assert!(text.contains("(0:02)"));

        let out = run(&mut app, "/send").await;
        assert!(out.contains("audio.wav (0:02)"));
    }

    #[tokio::test]
    async fn test_quit_and_unknown() {
        let (mut app, _dir) = app_with(Arc::new(MockBackend::new()));
        let mut out = Vec::new();
        assert_eq!(app.handle_line("/quit", &mut out).await.unwrap(), Flow::Quit);

        run(&mut app, "").await;
        let out = run(&mut app, "billing").await;
        assert!(out.contains("! Unknown topic: billing"));
        assert_eq!(app.screen(), Screen::TopicMenu);
    }
}
