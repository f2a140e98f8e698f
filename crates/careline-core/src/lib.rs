//! Shared domain types, errors, events, and configuration for Careline.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{CarelineConfig, VoiceStrategyKind};
pub use error::{CarelineError, Result};
pub use events::ChatEvent;
pub use types::*;
