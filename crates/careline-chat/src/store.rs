//! Conversation store: the single owner of chat state.
//!
//! Holds one history per enabled topic, the current topic, the composer
//! buffer, and the in-flight flag. Every mutation is published as a
//! [`ChatEvent`] so front ends can render from the event stream.
//!
//! Backend failures never propagate out of the send operations. They are
//! logged and replaced with a fixed apology message in the thread.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use careline_client::{ChatBackend, VoiceReply};
use careline_core::config::{CarelineConfig, UiConfig};
use careline_core::error::{CarelineError, Result};
use careline_core::events::ChatEvent;
use careline_core::types::{AudioClip, Message, SessionId, Topic};
use careline_voice::{AudioRecorder, VoiceCapture};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a send or start request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty input; nothing happened.
    Ignored,
    /// The topic already had history; no request was made.
    Resumed,
    /// The backend answered and its reply was appended.
    Replied,
    /// The backend failed and the apology message was appended.
    Failed,
}

/// One topic's conversation.
#[derive(Debug, Clone, Default)]
pub struct TopicHistory {
    pub session: Option<SessionId>,
    pub messages: Vec<Message>,
}

/// The conversation store.
///
/// Constructed once by the application and passed by reference to the
/// screens that need it.
///
/// Every request takes `&mut self`, so a second send cannot start while one
/// is awaiting the backend. `loading` only drives the typing indicator. A
/// request future dropped before completion leaves it set until the next
/// request finishes.
pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    ui: UiConfig,
    topics: Vec<Topic>,
    histories: HashMap<Topic, TopicHistory>,
    current: Option<Topic>,
    composer: String,
    loading: bool,
    voice_input_active: bool,
    events: broadcast::Sender<ChatEvent>,
}

impl ConversationStore {
    /// Create a store with an empty history for each of `topics`.
    pub fn new(backend: Arc<dyn ChatBackend>, ui: UiConfig, topics: &[Topic]) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut ordered = Vec::with_capacity(topics.len());
        for topic in topics {
            if !ordered.contains(topic) {
                ordered.push(*topic);
            }
        }
        let histories = ordered
            .iter()
            .map(|t| (*t, TopicHistory::default()))
            .collect();
        Self {
            backend,
            ui,
            topics: ordered,
            histories,
            current: None,
            composer: String::new(),
            loading: false,
            voice_input_active: false,
            events,
        }
    }

    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &CarelineConfig) -> Self {
        Self::new(backend, config.ui.clone(), &config.topics.enabled)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Topics this store accepts, in menu order.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn current_topic(&self) -> Option<Topic> {
        self.current
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn ui(&self) -> &UiConfig {
        &self.ui
    }

    /// Messages of the current topic.
    pub fn messages(&self) -> &[Message] {
        self.current
            .and_then(|t| self.histories.get(&t))
            .map(|h| h.messages.as_slice())
            .unwrap_or(&[])
    }

    /// History of any enabled topic.
    pub fn history(&self, topic: Topic) -> Result<&TopicHistory> {
        self.histories
            .get(&topic)
            .ok_or_else(|| CarelineError::UnknownTopic(topic.to_string()))
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.current
            .and_then(|t| self.histories.get(&t))
            .and_then(|h| h.session.as_ref())
    }

    pub fn composer(&self) -> &str {
        &self.composer
    }

    pub fn set_composer(&mut self, text: impl Into<String>) {
        self.composer = text.into();
    }

    pub fn voice_input_active(&self) -> bool {
        self.voice_input_active
    }

    /// Switch the composer between text and voice input.
    pub fn set_voice_input_active(&mut self, active: bool) {
        self.voice_input_active = active;
    }

    /// Quick replies offered on the most recent assistant message.
    pub fn quick_replies(&self) -> &[String] {
        self.messages()
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(|m| m.quick_replies.as_slice())
            .unwrap_or(&[])
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Make `topic` current and fetch its greeting unless it has a
    /// conversation to resume.
    ///
    /// Switching away from another topic resets that topic the same way
    /// [`return_to_topics`](Self::return_to_topics) does. A topic whose only
    /// content is the greeting apology is cleared and greeted again.
    pub async fn start_conversation(&mut self, topic: Topic) -> Result<SendOutcome> {
        let history = self.history(topic)?;
        let resumable = self.is_resumable(history);
        let stale = !resumable && !history.messages.is_empty();

        if self.current != Some(topic) {
            if let Some(prev) = self.current.replace(topic) {
                let clear = !self.ui.keep_history;
                self.reset_topic(prev, clear);
            }
            self.emit(ChatEvent::TopicChanged {
                topic: Some(topic),
                timestamp: Utc::now(),
            });
        }
        if resumable {
            tracing::debug!(%topic, "Resuming existing conversation");
            return Ok(SendOutcome::Resumed);
        }
        if stale {
            tracing::debug!(%topic, "Retrying greeting after earlier failure");
            self.reset_topic(topic, true);
        }

        tracing::info!(%topic, "Starting conversation");
        self.set_loading(true);
        let backend = Arc::clone(&self.backend);
        let outcome = match backend.start(topic).await {
            Ok(mut reply) => {
                let session = reply.session_id.take();
                self.set_session(topic, session);
                self.append(topic, Message::from_reply(reply));
                SendOutcome::Replied
            }
            Err(e) => {
                let text = self.ui.greeting_error.clone();
                self.fail(topic, &e, text);
                SendOutcome::Failed
            }
        };
        self.set_loading(false);
        Ok(outcome)
    }

    /// Parse a topic identifier and start it.
    pub async fn start_conversation_by_id(&mut self, id: &str) -> Result<SendOutcome> {
        let topic: Topic = id.parse()?;
        self.start_conversation(topic).await
    }

    /// Send `text`, or the composer buffer when `text` is `None`.
    ///
    /// Whitespace-only input is ignored. The user's message is appended
    /// before the request is made.
    pub async fn send_text(&mut self, text: Option<&str>) -> Result<SendOutcome> {
        let topic = self.current.ok_or(CarelineError::NoSession)?;
        let message = match text {
            Some(t) => t.trim().to_string(),
            None => self.composer.trim().to_string(),
        };
        if message.is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        self.append(topic, Message::user_text(message.clone()));
        self.composer.clear();
        self.set_loading(true);

        let backend = Arc::clone(&self.backend);
        let result = match self.ensure_session(topic).await {
            Ok(session) => backend.send_message(&session, topic, &message).await,
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(mut reply) => {
                if let Some(session) = reply.session_id.take() {
                    self.set_session(topic, Some(session));
                }
                self.append(topic, Message::from_reply(reply));
                SendOutcome::Replied
            }
            Err(e) => {
                let text = self.ui.send_error.clone();
                self.fail(topic, &e, text);
                SendOutcome::Failed
            }
        };
        self.set_loading(false);
        Ok(outcome)
    }

    /// Send the `index`-th quick reply of the latest assistant message.
    pub async fn select_quick_reply(&mut self, index: usize) -> Result<SendOutcome> {
        let replies = self.quick_replies();
        let reply = replies
            .get(index)
            .cloned()
            .ok_or(CarelineError::QuickReplyOutOfRange {
                index,
                available: replies.len(),
            })?;
        self.send_text(Some(&reply)).await
    }

    /// Send a recorded clip.
    ///
    /// The user's voice message is appended first. If the backend returns a
    /// transcript it is appended as a user text message before the reply.
    pub async fn send_voice(&mut self, clip: AudioClip) -> Result<SendOutcome> {
        let topic = self.current.ok_or(CarelineError::NoSession)?;

        let label = self.ui.voice_placeholder.clone();
        self.append(topic, Message::user_voice(label, clip.to_ref()));
        self.voice_input_active = false;
        self.set_loading(true);

        let backend = Arc::clone(&self.backend);
        let result = match self.ensure_session(topic).await {
            Ok(session) => backend.send_voice(&session, topic, &clip).await,
            Err(e) => Err(e),
        };
        let outcome = match result {
            Ok(outcome) => {
                if let Some(transcript) = outcome.transcript {
                    self.append(topic, Message::user_text(transcript));
                }
                let message = match outcome.reply {
                    VoiceReply::Chat(mut reply) => {
                        if let Some(session) = reply.session_id.take() {
                            self.set_session(topic, Some(session));
                        }
                        Message::from_reply(reply)
                    }
                    VoiceReply::Audio(audio) => Message::assistant_voice(
                        self.ui.assistant_voice_placeholder.clone(),
                        audio,
                    ),
                };
                self.append(topic, message);
                SendOutcome::Replied
            }
            Err(e) => {
                let text = self.ui.send_error.clone();
                self.fail(topic, &e, text);
                SendOutcome::Failed
            }
        };
        self.set_loading(false);
        Ok(outcome)
    }

    /// Take the clip out of `capture` (stopping it if needed) and send it.
    pub async fn send_recording<R: AudioRecorder + 'static>(
        &mut self,
        capture: &mut VoiceCapture<R>,
    ) -> Result<SendOutcome> {
        if self.current.is_none() {
            return Err(CarelineError::NoSession);
        }
        let clip = capture.take_clip().await?;
        self.send_voice(clip).await
    }

    /// Empty the current topic's history and drop its session.
    ///
    /// Other topics are untouched.
    pub fn clear_history(&mut self) -> Result<()> {
        let topic = self.current.ok_or(CarelineError::NoSession)?;
        self.reset_topic(topic, true);
        Ok(())
    }

    /// Leave the thread view.
    ///
    /// The current topic's session is dropped; its messages are kept only
    /// when `ui.keep_history` is set.
    pub fn return_to_topics(&mut self) {
        if let Some(topic) = self.current.take() {
            let clear = !self.ui.keep_history;
            self.reset_topic(topic, clear);
            self.emit(ChatEvent::TopicChanged {
                topic: None,
                timestamp: Utc::now(),
            });
        }
        self.composer.clear();
        self.voice_input_active = false;
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// A topic can be resumed when it holds a session or anything besides
    /// the greeting apology.
    fn is_resumable(&self, history: &TopicHistory) -> bool {
        history.session.is_some()
            || history
                .messages
                .iter()
                .any(|m| !(m.is_assistant() && m.body == self.ui.greeting_error))
    }

    async fn ensure_session(&mut self, topic: Topic) -> Result<SessionId> {
        if let Some(session) = self.history(topic)?.session.clone() {
            return Ok(session);
        }
        tracing::info!(%topic, "No session yet, opening one");
        let backend = Arc::clone(&self.backend);
        let reply = backend.start(topic).await?;
        let id = reply.session_id.ok_or(CarelineError::NoSession)?;
        self.set_session(topic, Some(id));
        self.history(topic)?
            .session
            .clone()
            .ok_or(CarelineError::NoSession)
    }

    fn set_session(&mut self, topic: Topic, session: Option<String>) {
        let Some(history) = self.histories.get_mut(&topic) else {
            return;
        };
        match session {
            Some(id) if !id.is_empty() => {
                let changed = history.session.as_ref().map(SessionId::as_str) != Some(id.as_str());
                if changed {
                    history.session = Some(SessionId(id.clone()));
                    tracing::info!(%topic, session_id = %id, "Session started");
                    self.emit(ChatEvent::SessionStarted {
                        topic,
                        session_id: id,
                        timestamp: Utc::now(),
                    });
                }
            }
            _ => {
                tracing::warn!(%topic, "Backend reply carried no session id");
            }
        }
    }

    fn append(&mut self, topic: Topic, message: Message) {
        if let Some(history) = self.histories.get_mut(&topic) {
            history.messages.push(message.clone());
            self.emit(ChatEvent::MessageAppended {
                topic,
                message,
                timestamp: Utc::now(),
            });
        }
    }

    fn fail(&mut self, topic: Topic, error: &CarelineError, apology: String) {
        tracing::warn!(%topic, error = %error, "Backend request failed");
        self.append(topic, Message::assistant_text(apology));
        self.emit(ChatEvent::SendFailed {
            topic,
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn reset_topic(&mut self, topic: Topic, clear_messages: bool) {
        if let Some(history) = self.histories.get_mut(&topic) {
            history.session = None;
            if clear_messages {
                history.messages.clear();
                self.emit(ChatEvent::HistoryCleared {
                    topic,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.emit(ChatEvent::LoadingChanged {
                loading,
                timestamp: Utc::now(),
            });
        }
    }

    fn emit(&self, event: ChatEvent) {
        tracing::trace!(event = event.event_name(), "Chat event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careline_client::{MockBackend, MockCall, VoiceOutcome};
    use careline_core::types::{AudioRef, ChatReply, MessageKind, Role, ServiceCard};
    use careline_voice::MockRecorder;

    fn store_with(mock: Arc<MockBackend>) -> ConversationStore {
        ConversationStore::new(mock, UiConfig::default(), &Topic::ALL)
    }

    fn clip() -> AudioClip {
        AudioClip {
            bytes: vec![1, 2, 3, 4],
            mime_type: "audio/wav".into(),
            file_name: "audio.wav".into(),
            duration_secs: 4,
        }
    }

    // ---- start_conversation ----

    #[tokio::test]
    async fn test_start_appends_single_greeting() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));

        let outcome = store.start_conversation(Topic::Service).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(store.current_topic(), Some(Topic::Service));

        let msgs = store.messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::Assistant);
        assert!(msgs[0].body.contains("Hitta äldreomsorg"));
        assert_eq!(store.session_id().map(|s| s.as_str()), Some("mock-session-1"));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_start_carries_quick_replies_and_cards() {
        let mock = Arc::new(MockBackend::new());
        mock.push_reply(ChatReply {
            session_id: Some("s-1".into()),
            message: "Välj".into(),
            quick_replies: vec!["Boende".into(), "Hemtjänst".into()],
            service_cards: vec![ServiceCard {
                name: "Solgården".into(),
                ..ServiceCard::default()
            }],
            ..ChatReply::default()
        });
        let mut store = store_with(mock);
        store.start_conversation(Topic::Apply).await.unwrap();

        assert_eq!(store.quick_replies(), &["Boende", "Hemtjänst"]);
        assert_eq!(store.messages()[0].service_cards.len(), 1);
    }

    #[tokio::test]
    async fn test_start_failure_appends_greeting_apology() {
        let mock = Arc::new(MockBackend::new());
        mock.push_failure("connection refused");
        let mut store = store_with(mock);

        let outcome = store.start_conversation(Topic::General).await.unwrap();
        assert_eq!(outcome, SendOutcome::Failed);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].body, UiConfig::default().greeting_error);
        assert!(store.session_id().is_none());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_start_resumes_non_empty_history() {
        let mock = Arc::new(MockBackend::new());
        let mut store = ConversationStore::new(
            Arc::clone(&mock) as Arc<dyn ChatBackend>,
            UiConfig {
                keep_history: true,
                ..UiConfig::default()
            },
            &Topic::ALL,
        );
        store.start_conversation(Topic::Contact).await.unwrap();
        store.return_to_topics();
        let outcome = store.start_conversation(Topic::Contact).await.unwrap();

        assert_eq!(outcome, SendOutcome::Resumed);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(
            mock.calls(),
            vec![MockCall::Start {
                topic: Topic::Contact
            }]
        );
    }

    #[tokio::test]
    async fn test_start_unknown_topic_rejected() {
        let mock = Arc::new(MockBackend::new());
        let mut store = ConversationStore::new(mock, UiConfig::default(), &[Topic::General]);
        let err = store.start_conversation(Topic::Apply).await.unwrap_err();
        assert!(matches!(err, CarelineError::UnknownTopic(_)));
        assert!(store.current_topic().is_none());

        let err = store.start_conversation_by_id("billing").await.unwrap_err();
        assert!(matches!(err, CarelineError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn test_switching_topics_resets_previous() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::Service).await.unwrap();
        store.start_conversation(Topic::Apply).await.unwrap();

        let service = store.history(Topic::Service).unwrap();
        assert!(service.session.is_none());
        assert!(service.messages.is_empty());

        let outcome = store.start_conversation(Topic::Service).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(mock.calls().len(), 3);
        assert_eq!(store.session_id().map(|s| s.as_str()), Some("mock-session-3"));
        assert!(store.history(Topic::Apply).unwrap().session.is_none());
    }

    #[tokio::test]
    async fn test_switching_topics_keeps_messages_when_configured() {
        let mock = Arc::new(MockBackend::new());
        let mut store = ConversationStore::new(
            Arc::clone(&mock) as Arc<dyn ChatBackend>,
            UiConfig {
                keep_history: true,
                ..UiConfig::default()
            },
            &Topic::ALL,
        );
        store.start_conversation(Topic::Service).await.unwrap();
        store.start_conversation(Topic::Apply).await.unwrap();

        let service = store.history(Topic::Service).unwrap();
        assert!(service.session.is_none());
        assert_eq!(service.messages.len(), 1);

        let outcome = store.start_conversation(Topic::Service).await.unwrap();
        assert_eq!(outcome, SendOutcome::Resumed);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_greeting_is_retried_on_reentry() {
        let mock = Arc::new(MockBackend::new());
        mock.push_failure("connection refused");
        let mut store = ConversationStore::new(
            Arc::clone(&mock) as Arc<dyn ChatBackend>,
            UiConfig {
                keep_history: true,
                ..UiConfig::default()
            },
            &Topic::ALL,
        );
        let first = store.start_conversation(Topic::General).await.unwrap();
        assert_eq!(first, SendOutcome::Failed);
        store.return_to_topics();

        let outcome = store.start_conversation(Topic::General).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        let msgs = store.messages();
        assert_eq!(msgs.len(), 1);
        assert_ne!(msgs[0].body, UiConfig::default().greeting_error);
        assert!(store.session_id().is_some());
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_restarting_current_topic_after_failed_greeting() {
        let mock = Arc::new(MockBackend::new());
        mock.push_failure("down");
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::Contact).await.unwrap();
        let mut rx = store.subscribe();

        let outcome = store.start_conversation(Topic::Contact).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(rx.try_recv().unwrap().event_name(), "history_cleared");
    }

    // ---- send_text ----

    #[tokio::test]
    async fn test_send_empty_or_whitespace_is_ignored() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();

        assert_eq!(store.send_text(Some("")).await.unwrap(), SendOutcome::Ignored);
        assert_eq!(
            store.send_text(Some("   \n\t")).await.unwrap(),
            SendOutcome::Ignored
        );
        store.set_composer("  ");
        assert_eq!(store.send_text(None).await.unwrap(), SendOutcome::Ignored);

        assert_eq!(store.messages().len(), 1);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_send_text_appends_user_then_assistant() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        mock.push_text("hi");

        let outcome = store.send_text(Some("hello")).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);

        let msgs = &store.messages()[1..];
        assert_eq!(msgs.len(), 2);
        assert_eq!((msgs[0].role, msgs[0].body.as_str()), (Role::User, "hello"));
        assert_eq!((msgs[1].role, msgs[1].body.as_str()), (Role::Assistant, "hi"));

        assert_eq!(
            mock.calls()[1],
            MockCall::Message {
                session: "mock-session-1".into(),
                topic: Topic::General,
                text: "hello".into()
            }
        );
    }

    #[tokio::test]
    async fn test_send_text_uses_and_clears_composer() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(mock);
        store.start_conversation(Topic::General).await.unwrap();

        store.set_composer("  var finns hemtjänst?  ");
        store.send_text(None).await.unwrap();
        assert_eq!(store.composer(), "");
        assert_eq!(store.messages()[1].body, "var finns hemtjänst?");
    }

    #[tokio::test]
    async fn test_send_failure_appends_apology_and_keeps_user_message() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        mock.push_failure("timeout");

        let outcome = store.send_text(Some("hello")).await.unwrap();
        assert_eq!(outcome, SendOutcome::Failed);

        let msgs = store.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].body, "hello");
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[2].body, UiConfig::default().send_error);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_send_without_topic_is_error() {
        let mut store = store_with(Arc::new(MockBackend::new()));
        assert!(matches!(
            store.send_text(Some("hej")).await,
            Err(CarelineError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_send_after_failed_greeting_opens_session() {
        let mock = Arc::new(MockBackend::new());
        mock.push_failure("down");
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::Apply).await.unwrap();
        assert!(store.session_id().is_none());

        let outcome = store.send_text(Some("hej")).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(store.session_id().is_some());
        assert_eq!(store.messages().len(), 3);
        assert!(matches!(mock.calls()[1], MockCall::Start { .. }));
        assert!(matches!(mock.calls()[2], MockCall::Message { .. }));
    }

    #[tokio::test]
    async fn test_send_adopts_new_session_id_from_reply() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        mock.push_reply(ChatReply {
            session_id: Some("rotated".into()),
            message: "ok".into(),
            ..ChatReply::default()
        });
        store.send_text(Some("hej")).await.unwrap();
        assert_eq!(store.session_id().map(|s| s.as_str()), Some("rotated"));
    }

    /// Never answers the first text message; everything else goes to the mock.
    struct StallFirstMessage {
        inner: MockBackend,
        stalled: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ChatBackend for StallFirstMessage {
        async fn start(&self, topic: Topic) -> Result<ChatReply> {
            self.inner.start(topic).await
        }

        async fn send_message(
            &self,
            session: &SessionId,
            topic: Topic,
            text: &str,
        ) -> Result<ChatReply> {
            if !self.stalled.swap(true, std::sync::atomic::Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.send_message(session, topic, text).await
        }

        async fn send_voice(
            &self,
            session: &SessionId,
            topic: Topic,
            clip: &AudioClip,
        ) -> Result<VoiceOutcome> {
            self.inner.send_voice(session, topic, clip).await
        }
    }

    #[tokio::test]
    async fn test_abandoned_request_does_not_block_next_send() {
        let backend = Arc::new(StallFirstMessage {
            inner: MockBackend::new(),
            stalled: std::sync::atomic::AtomicBool::new(false),
        });
        let mut store = ConversationStore::new(backend, UiConfig::default(), &Topic::ALL);
        store.start_conversation(Topic::General).await.unwrap();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.send_text(Some("första")),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(store.is_loading());

        let outcome = store.send_text(Some("andra")).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(!store.is_loading());
        let bodies: Vec<&str> = store.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies[1..], ["första", "andra", "Du skrev: andra"]);
    }

    // ---- quick replies ----

    #[tokio::test]
    async fn test_quick_reply_selection_sends_text() {
        let mock = Arc::new(MockBackend::new());
        mock.push_reply(ChatReply {
            message: "Vad vill du veta?".into(),
            quick_replies: vec!["Boende".into(), "Hemtjänst".into()],
            ..ChatReply::default()
        });
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::Service).await.unwrap();

        store.select_quick_reply(1).await.unwrap();
        assert_eq!(store.messages()[1].body, "Hemtjänst");
        // Latest assistant reply has no quick replies.
        assert!(store.quick_replies().is_empty());
    }

    #[tokio::test]
    async fn test_quick_reply_out_of_range() {
        let mut store = store_with(Arc::new(MockBackend::new()));
        store.start_conversation(Topic::Service).await.unwrap();
        match store.select_quick_reply(0).await {
            Err(CarelineError::QuickReplyOutOfRange { index, available }) => {
                assert_eq!(index, 0);
                assert_eq!(available, 0);
            }
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    // ---- voice ----

    #[tokio::test]
    async fn test_send_voice_appends_clip_and_reply() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        store.set_voice_input_active(true);

        let outcome = store.send_voice(clip()).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(!store.voice_input_active());

        let msgs = store.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].kind, MessageKind::Voice);
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].audio.as_ref().map(|a| a.duration_secs), Some(4));
        assert_eq!(msgs[2].role, Role::Assistant);
        assert!(matches!(
            mock.calls()[1],
            MockCall::Voice { byte_len: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_voice_with_transcript_and_audio_reply() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        mock.push_voice(VoiceOutcome {
            transcript: Some("när öppnar ni?".into()),
            reply: VoiceReply::Audio(AudioRef {
                file_name: "reply.mp3".into(),
                mime_type: "audio/mpeg".into(),
                byte_len: 900,
                duration_secs: 0,
            }),
        });

        store.send_voice(clip()).await.unwrap();
        let msgs = store.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[2].body, "när öppnar ni?");
        assert_eq!(msgs[2].kind, MessageKind::Text);
        assert_eq!(msgs[3].kind, MessageKind::Voice);
        assert_eq!(msgs[3].role, Role::Assistant);
        assert_eq!(msgs[3].body, UiConfig::default().assistant_voice_placeholder);
    }

    #[tokio::test]
    async fn test_send_voice_failure_falls_back() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        mock.push_failure("413 payload too large");

        let outcome = store.send_voice(clip()).await.unwrap();
        assert_eq!(outcome, SendOutcome::Failed);
        let msgs = store.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].kind, MessageKind::Voice);
        assert_eq!(msgs[2].body, UiConfig::default().send_error);
    }

    #[tokio::test]
    async fn test_send_recording_takes_clip_from_capture() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::Contact).await.unwrap();

        let mut capture = VoiceCapture::new(MockRecorder::new(), 60);
        capture.start().await.unwrap();
        let outcome = store.send_recording(&mut capture).await.unwrap();

        assert_eq!(outcome, SendOutcome::Replied);
        assert!(!capture.is_active());
        assert_eq!(store.messages()[1].kind, MessageKind::Voice);
    }

    // ---- clearing ----

    #[tokio::test]
    async fn test_clear_history_only_affects_current_topic() {
        let mock = Arc::new(MockBackend::new());
        let mut store = ConversationStore::new(
            mock,
            UiConfig {
                keep_history: true,
                ..UiConfig::default()
            },
            &Topic::ALL,
        );
        store.start_conversation(Topic::Service).await.unwrap();
        store.send_text(Some("hej")).await.unwrap();
        store.return_to_topics();
        store.start_conversation(Topic::Apply).await.unwrap();

        store.clear_history().unwrap();
        assert!(store.messages().is_empty());
        assert!(store.session_id().is_none());
        assert_eq!(store.history(Topic::Service).unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_return_to_topics_resets_session_and_history() {
        let mut store = store_with(Arc::new(MockBackend::new()));
        store.start_conversation(Topic::Service).await.unwrap();
        store.set_composer("halvskrivet");
        store.return_to_topics();

        assert!(store.current_topic().is_none());
        assert!(store.messages().is_empty());
        assert_eq!(store.composer(), "");
        let history = store.history(Topic::Service).unwrap();
        assert!(history.messages.is_empty());
        assert!(history.session.is_none());
    }

    // ---- events ----

    #[tokio::test]
    async fn test_events_follow_optimistic_order() {
        let mock = Arc::new(MockBackend::new());
        let mut store = store_with(Arc::clone(&mock));
        store.start_conversation(Topic::General).await.unwrap();
        let mut rx = store.subscribe();
        mock.push_failure("boom");

        store.send_text(Some("hej")).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.event_name());
        }
        assert_eq!(
            names,
            vec![
                "message_appended",
                "loading_changed",
                "message_appended",
                "send_failed",
                "loading_changed",
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_topics_are_collapsed() {
        let store = ConversationStore::new(
            Arc::new(MockBackend::new()),
            UiConfig::default(),
            &[Topic::General, Topic::General, Topic::Apply],
        );
        assert_eq!(store.topics(), &[Topic::General, Topic::Apply]);
    }
}
