//! Speech-to-text transcription
//!
//! Sends finalized WAV captures to an Azure OpenAI Whisper deployment and
//! classifies the outcomes so the orchestrator can decide what to retry
//! and what to tell the user.

pub mod azure;

pub use azure::AzureSpeechClient;

use crate::audio::CapturePayload;
use crate::error::TranscribeError;
use tokio_util::sync::CancellationToken;

/// Retries after the initial attempt for transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Result of a successful transcription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    /// Recognized text, trimmed
    Text(String),
    /// The service returned a blank transcript (silence, noise)
    Empty,
}

/// Trait for transcription backends
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a capture, retrying transient failures with exponential
    /// backoff. Cancelling the token aborts promptly, including during a
    /// backoff wait, with `TranscribeError::Cancelled`.
    async fn transcribe(
        &self,
        payload: &CapturePayload,
        cancel: CancellationToken,
    ) -> Result<TranscriptionOutcome, TranscribeError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
