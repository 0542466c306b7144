//! Error types for pushtype
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the pushtype application
#[derive(Error, Debug)]
pub enum PushtypeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] DeviceError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Failed to install keyboard hook: {0}\n  Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    InstallFailed(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Unknown key name: '{0}'. Use evtest to find valid key names.")]
    UnknownKey(String),

    #[error("'{0}' is a modifier key and cannot be the primary hotkey")]
    ModifierAsPrimary(String),

    #[error("Invalid hotkey combo '{0}': expected e.g. \"F8\" or \"Ctrl+Shift+F8\"")]
    InvalidCombo(String),
}

/// Errors related to audio capture, classified by cause.
///
/// `NotFound` against a named device triggers a one-shot fallback
/// to the system default before giving up.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Audio device not found: '{0}'")]
    NotFound(String),

    #[error("Microphone access denied. Check your audio permissions.")]
    PermissionDenied,

    #[error("No audio driver available: {0}")]
    NoDriver(String),

    #[error("Audio capture error: {0}")]
    Other(String),

    #[error("Capture thread did not respond within {0} seconds")]
    StopTimeout(u64),
}

/// Errors from the speech-to-text endpoint.
///
/// The transient classes (`RateLimited`, `Timeout`, `Server`, `Network`)
/// are retried with backoff; everything else propagates immediately.
#[derive(Error, Debug, Clone)]
pub enum TranscribeError {
    #[error("Invalid API credentials or access denied (HTTP {0}). Check your endpoint and key.")]
    Auth(u16),

    #[error("Deployment not found (HTTP 404). Check the deployment name.")]
    DeploymentNotFound,

    #[error("Rate limit exceeded (HTTP 429). Try again later.")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Service error (HTTP {0}). Try again.")]
    Server(u16),

    #[error("Unexpected response (HTTP {status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transcription cancelled")]
    Cancelled,
}

impl TranscribeError {
    /// Whether a retry is worth attempting: 5xx, 408, 429 and transport
    /// failures. Auth and not-found errors are user-actionable, not transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranscribeError::RateLimited
                | TranscribeError::Timeout
                | TranscribeError::Server(_)
                | TranscribeError::Network(_)
        )
    }
}

/// Errors related to text output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("Clipboard delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Result type alias using PushtypeError
pub type Result<T> = std::result::Result<T, PushtypeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TranscribeError::Server(500).is_transient());
        assert!(TranscribeError::Server(503).is_transient());
        assert!(TranscribeError::RateLimited.is_transient());
        assert!(TranscribeError::Timeout.is_transient());
        assert!(TranscribeError::Network("reset".into()).is_transient());

        assert!(!TranscribeError::Auth(401).is_transient());
        assert!(!TranscribeError::Auth(403).is_transient());
        assert!(!TranscribeError::DeploymentNotFound.is_transient());
        assert!(!TranscribeError::Unexpected { status: 400, body: String::new() }.is_transient());
        assert!(!TranscribeError::Cancelled.is_transient());
    }
}
