//! Azure OpenAI Whisper transcription client
//!
//! Posts WAV captures to an Azure OpenAI deployment's audio transcription
//! endpoint as multipart form data and maps HTTP failures onto the
//! transcription error taxonomy.
//!
//! Transient failures (429, 408, 5xx, network errors) are retried with
//! exponential backoff; everything else fails fast. Cancellation aborts
//! both in-flight requests and backoff waits.

use super::{SpeechToText, TranscriptionOutcome, DEFAULT_MAX_RETRIES};
use crate::audio::CapturePayload;
use crate::error::TranscribeError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Azure OpenAI Whisper client
pub struct AzureSpeechClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    language: Option<String>,
    max_retries: u32,
    base_delay: Duration,
}

impl AzureSpeechClient {
    /// Create a client for the given deployment.
    ///
    /// Fails with `TranscribeError::Config` when the endpoint, deployment,
    /// or API key is blank; the caller surfaces that as a configuration
    /// problem rather than attempting a request that cannot succeed.
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: &str,
        language: Option<String>,
    ) -> Result<Self, TranscribeError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(TranscribeError::Config(
                "Azure endpoint is not configured".to_string(),
            ));
        }
        if deployment.trim().is_empty() {
            return Err(TranscribeError::Config(
                "Whisper deployment name is not configured".to_string(),
            ));
        }
        if api_version.trim().is_empty() {
            return Err(TranscribeError::Config(
                "API version is not configured".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(TranscribeError::Config(
                "API key is not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/openai/deployments/{}/audio/transcriptions?api-version={}",
            endpoint,
            deployment.trim(),
            api_version.trim()
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TranscribeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            api_key: api_key.trim().to_string(),
            language,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// One request attempt, no retries
    pub async fn transcribe_once(
        &self,
        payload: &CapturePayload,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        let file_part = reqwest::multipart::Part::bytes(payload.wav_bytes.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Config(format!("Invalid MIME type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("response_format", "text");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let request = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .multipart(form)
            .send();

        let response = tokio::select! {
            result = request => result.map_err(classify_request_error)?,
            _ = cancel.cancelled() => return Err(TranscribeError::Cancelled),
        };

        let status = response.status().as_u16();
        let body = tokio::select! {
            result = response.text() => result.map_err(classify_request_error)?,
            _ = cancel.cancelled() => return Err(TranscribeError::Cancelled),
        };

        if (200..300).contains(&status) {
            let text = body.trim();
            if text.is_empty() {
                return Ok(TranscriptionOutcome::Empty);
            }
            return Ok(TranscriptionOutcome::Text(text.to_string()));
        }

        Err(classify_status(status, body))
    }
}

#[async_trait::async_trait]
impl SpeechToText for AzureSpeechClient {
    async fn transcribe(
        &self,
        payload: &CapturePayload,
        cancel: CancellationToken,
    ) -> Result<TranscriptionOutcome, TranscribeError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(TranscribeError::Cancelled);
            }

            match self.transcribe_once(payload, &cancel).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    // 1s, 2s, 4s, ... between attempts
                    let delay = self.base_delay * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Transcription attempt {} failed ({}), retrying in {:?}",
                        attempt,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(TranscribeError::Cancelled),
                    }
                }
                other => return other,
            }
        }
    }

    fn name(&self) -> &str {
        "azure-whisper"
    }
}

/// Map an HTTP status outside 2xx onto the error taxonomy
fn classify_status(status: u16, body: String) -> TranscribeError {
    match status {
        401 | 403 => TranscribeError::Auth(status),
        404 => TranscribeError::DeploymentNotFound,
        408 => TranscribeError::Timeout,
        429 => TranscribeError::RateLimited,
        500..=599 => TranscribeError::Server(status),
        _ => TranscribeError::Unexpected { status, body },
    }
}

fn classify_request_error(e: reqwest::Error) -> TranscribeError {
    if e.is_timeout() {
        TranscribeError::Timeout
    } else {
        TranscribeError::Network(e.to_string())
    }
}
