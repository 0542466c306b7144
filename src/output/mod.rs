//! Text delivery module
//!
//! Delivers recognized text to the active session via the Wayland
//! clipboard. Delivery is fire-and-forget from the orchestrator's point
//! of view: a failure is reported to the user but never changes session
//! state or re-runs the transcription.

pub mod clipboard;

use crate::error::OutputError;

/// Trait for text delivery implementations
#[async_trait::async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver the recognized text. Exactly one delivery per successful
    /// transcription; callers never retry.
    async fn deliver(&self, text: &str) -> Result<(), OutputError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory for the platform output sink
pub fn create_sink() -> Box<dyn OutputSink> {
    Box::new(clipboard::ClipboardSink::new())
}
