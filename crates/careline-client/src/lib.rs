//! HTTP access to the Careline chat backend.
//!
//! [`ApiClient`] wraps `reqwest`, [`ChatBackend`] is the trait the
//! conversation store is written against, and [`voice`] holds the
//! interchangeable voice upload strategies.

pub mod api;
pub mod backend;
pub mod mock;
pub mod voice;

pub use api::ApiClient;
pub use backend::{ChatBackend, HttpBackend};
pub use mock::{MockBackend, MockCall};
pub use voice::{uploader_for, VoiceOutcome, VoiceReply, VoiceUploader};
