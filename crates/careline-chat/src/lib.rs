//! Conversation state and screens for the Careline chat widget.
//!
//! [`ConversationStore`] owns per-topic histories and talks to a
//! [`careline_client::ChatBackend`]. The [`thread`] and [`screens`] modules
//! turn that state into something a front end can draw, and [`export`]
//! writes a thread to disk.

pub mod export;
pub mod screens;
pub mod store;
pub mod thread;

pub use export::{export_transcript, ExportFormat};
pub use screens::{header_title, Panel, Screen, TopicEntry, TopicMenu};
pub use store::{ConversationStore, SendOutcome, TopicHistory};
pub use thread::{display_labels, ThreadRow, ThreadView};
