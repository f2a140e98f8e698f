//! Scripted in-memory backend for tests and offline demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use careline_core::error::{CarelineError, Result};
use careline_core::types::{AudioClip, ChatReply, SessionId, Topic};

use crate::backend::ChatBackend;
use crate::voice::VoiceOutcome;

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Start {
        topic: Topic,
    },
    Message {
        session: String,
        topic: Topic,
        text: String,
    },
    Voice {
        session: String,
        topic: Topic,
        byte_len: usize,
    },
}

#[derive(Debug)]
enum Scripted {
    Reply(ChatReply),
    Voice(VoiceOutcome),
    Fail(String),
}

/// Backend that answers from a script, falling back to canned replies.
///
/// Scripted entries are consumed in order by whichever call comes next.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<MockCall>>,
    sessions: AtomicU64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chat reply.
    pub fn push_reply(&self, reply: ChatReply) {
        self.lock_script().push_back(Scripted::Reply(reply));
    }

    /// Queue a reply with just a message body.
    pub fn push_text(&self, message: &str) {
        self.push_reply(ChatReply {
            message: message.to_string(),
            ..ChatReply::default()
        });
    }

    /// Queue a voice outcome.
    pub fn push_voice(&self, outcome: VoiceOutcome) {
        self.lock_script().push_back(Scripted::Voice(outcome));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, reason: &str) {
        self.lock_script()
            .push_back(Scripted::Fail(reason.to_string()));
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("mock mutex poisoned").clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().expect("mock mutex poisoned")
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().expect("mock mutex poisoned").push(call);
    }

    fn next(&self) -> Option<Scripted> {
        self.lock_script().pop_front()
    }

    fn next_session_id(&self) -> String {
        let n = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        format!("mock-session-{}", n)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn start(&self, topic: Topic) -> Result<ChatReply> {
        self.record(MockCall::Start { topic });
        let mut reply = match self.next() {
            Some(Scripted::Reply(reply)) => reply,
            Some(Scripted::Voice(_)) => {
                return Err(CarelineError::Decode(
                    "scripted voice outcome for start".to_string(),
                ))
            }
            Some(Scripted::Fail(reason)) => return Err(CarelineError::Transport(reason)),
            None => ChatReply {
                message: format!("Hej! Välkommen till {}.", topic.label()),
                ..ChatReply::default()
            },
        };
        if reply.session_id.is_none() {
            reply.session_id = Some(self.next_session_id());
        }
        Ok(reply)
    }

    async fn send_message(
        &self,
        session: &SessionId,
        topic: Topic,
        text: &str,
    ) -> Result<ChatReply> {
        self.record(MockCall::Message {
            session: session.0.clone(),
            topic,
            text: text.to_string(),
        });
        match self.next() {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Voice(_)) => Err(CarelineError::Decode(
                "scripted voice outcome for message".to_string(),
            )),
            Some(Scripted::Fail(reason)) => Err(CarelineError::Transport(reason)),
            None => Ok(ChatReply {
                message: format!("Du skrev: {}", text),
                ..ChatReply::default()
            }),
        }
    }

    async fn send_voice(
        &self,
        session: &SessionId,
        topic: Topic,
        clip: &AudioClip,
    ) -> Result<VoiceOutcome> {
        self.record(MockCall::Voice {
            session: session.0.clone(),
            topic,
            byte_len: clip.bytes.len(),
        });
        match self.next() {
            Some(Scripted::Voice(outcome)) => Ok(outcome),
            Some(Scripted::Reply(reply)) => Ok(VoiceOutcome::chat(reply)),
            Some(Scripted::Fail(reason)) => Err(CarelineError::Transport(reason)),
            None => Ok(VoiceOutcome::chat(ChatReply {
                message: "Jag har tagit emot ditt röstmeddelande.".to_string(),
                ..ChatReply::default()
            })),
        }
    }
}
