//! Global hotkey detection
//!
//! Provides kernel-level key event detection using evdev, which sees the
//! push-to-talk combo regardless of which application has input focus and
//! works on all Wayland compositors.
//!
//! Detection runs on its own blocking task and hands Pressed/Released
//! events to the orchestrator over a channel; it never calls into the
//! capture or transcription components directly.
//!
//! Requires the user to be in the 'input' group.

pub mod combo;
pub mod detector;
pub mod evdev_listener;

pub use combo::Combo;

use crate::error::HotkeyError;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Events emitted by the hotkey trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The combo transitioned from unmatched to matched
    Pressed,
    /// The combo transitioned from matched to unmatched
    Released,
}

/// Trait for hotkey trigger implementations
#[async_trait::async_trait]
pub trait HotkeyTrigger: Send {
    /// Install the system-wide subscription and return the event channel.
    /// Fails fatally with `HotkeyError::InstallFailed` when the OS refuses.
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Remove the subscription and stop the detection task
    async fn stop(&mut self) -> Result<(), HotkeyError>;

    /// Atomically replace the monitored combo. Any currently-tracked
    /// held state is discarded so no stale event fires against the old
    /// combo. Takes effect on the next key event.
    fn set_target(&self, combo: Combo);

    /// The currently monitored combo
    fn target(&self) -> Combo;
}

/// The active combo shared between the orchestrator (single writer) and
/// the detection loop (single reader, one snapshot per event).
///
/// The generation counter tells the reader that the combo was swapped so
/// it can reset its held-key tracking.
#[derive(Debug, Clone)]
pub struct SharedTarget {
    inner: Arc<RwLock<(Combo, u64)>>,
}

impl SharedTarget {
    pub fn new(combo: Combo) -> Self {
        Self {
            inner: Arc::new(RwLock::new((combo, 0))),
        }
    }

    /// Replace the combo wholesale, bumping the generation
    pub fn replace(&self, combo: Combo) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.0 = combo;
        guard.1 += 1;
    }

    /// Snapshot of (combo, generation)
    pub fn snapshot(&self) -> (Combo, u64) {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Factory for the platform hotkey trigger
pub fn create_trigger(combo: Combo) -> Result<Box<dyn HotkeyTrigger>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevTrigger::new(combo)))
}
