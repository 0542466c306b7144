//! Session state for the pushtype daemon
//!
//! The push-to-talk workflow is a three-state machine:
//! Idle → Recording → Transcribing → Idle
//!
//! Exactly one instance exists, owned by the orchestrator and mutated only
//! on its event loop. The hotkey and capture components never touch it.

use std::time::Instant;

/// Orchestrator state
#[derive(Debug, Clone, Copy)]
pub enum SessionState {
    /// Waiting for hotkey press
    Idle,

    /// Hotkey held, capturing audio
    Recording {
        /// When the capture started
        started_at: Instant,
    },

    /// Hotkey released, transcription request in flight
    Transcribing,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    pub fn is_transcribing(&self) -> bool {
        matches!(self, SessionState::Transcribing)
    }

    /// Recording duration so far, if currently recording
    pub fn recording_duration(&self) -> Option<std::time::Duration> {
        match self {
            SessionState::Recording { started_at } => Some(started_at.elapsed()),
            _ => None,
        }
    }

    /// Short name written to the state file for external integrations
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Recording { .. } => "recording",
            SessionState::Transcribing => "transcribing",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording { started_at } => {
                write!(f, "Recording ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            SessionState::Transcribing => write!(f, "Transcribing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = SessionState::default();
        assert!(state.is_idle());
        assert_eq!(state.name(), "idle");
    }

    #[test]
    fn test_recording_state() {
        let state = SessionState::Recording {
            started_at: Instant::now(),
        };
        assert!(state.is_recording());
        assert!(!state.is_idle());
        assert!(state.recording_duration().is_some());
        assert_eq!(state.name(), "recording");
    }

    #[test]
    fn test_idle_has_no_duration() {
        assert!(SessionState::Idle.recording_duration().is_none());
        assert!(SessionState::Transcribing.recording_duration().is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", SessionState::Idle), "Idle");
        assert_eq!(format!("{}", SessionState::Transcribing), "Transcribing");
        let state = SessionState::Recording {
            started_at: Instant::now(),
        };
        assert!(format!("{}", state).starts_with("Recording"));
    }
}
