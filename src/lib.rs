//! Pushtype: Push-to-talk voice dictation for Linux
//!
//! This library provides the core functionality for:
//! - Detecting a hotkey combo via evdev (kernel-level, works on all compositors)
//! - Capturing microphone audio via cpal (supports PipeWire, PulseAudio, ALSA)
//! - Transcribing speech through an Azure OpenAI Whisper deployment
//! - Delivering recognized text to the Wayland clipboard
//!
//! # Architecture
//!
//! ```text
//!                  ┌─────────────────────────────────────┐
//!                  │               Daemon                │
//!                  │   idle -> recording -> transcribing │
//!                  └─────────────────────────────────────┘
//!                                   │
//!          ┌────────────────────────┼────────────────────────┐
//!          │                        │                        │
//!          ▼                        ▼                        ▼
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │    Hotkey    │         │   Capture    │         │  Transcribe  │
//! │   (evdev)    │         │    (cpal)    │         │   (reqwest)  │
//! └──────────────┘         └──────────────┘         └──────────────┘
//!          │                        │                        │
//!          │ Pressed/Released       │ 16kHz mono WAV         │ text
//!          ▼                        ▼                        ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ [Press] ─▶ record ─▶ [Release] ─▶ gate (>=500ms) ─▶ transcribe  │
//! │                                        │                        │
//! │                                        ▼                        │
//! │                               clipboard (wl-copy)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

// evdev key types flow through the public Combo type and wl-copy is the
// delivery mechanism, so there is no meaningful build on other platforms
#[cfg(not(target_os = "linux"))]
compile_error!("pushtype supports Linux only (evdev hotkeys, Wayland clipboard)");

pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hotkey;
pub mod notification;
pub mod output;
pub mod secret;
pub mod state;
pub mod transcribe;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{PushtypeError, Result};
