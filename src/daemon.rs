//! Daemon module - main event loop orchestration
//!
//! Coordinates the hotkey trigger, audio capture, transcription, and
//! text delivery components around a three-state session machine
//! (idle -> recording -> transcribing -> idle).
//!
//! The hotkey trigger is the only component that initiates transitions;
//! everything else reacts. Transcription runs on a spawned task holding
//! its own handle to the backend, so a SIGHUP config swap mid-flight
//! never disturbs the request already in progress.

use crate::audio::feedback::{Cue, CuePlayer};
use crate::audio::{CaptureSession, StopOutcome};
use crate::config::{self, AzureConfig, Config, Overrides};
use crate::error::{PushtypeError, Result, TranscribeError};
use crate::hotkey::{Combo, HotkeyEvent, HotkeyTrigger};
use crate::notification::Notifier;
use crate::output::OutputSink;
use crate::secret::SecretStore;
use crate::state::SessionState;
use crate::transcribe::{AzureSpeechClient, SpeechToText, TranscriptionOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type TranscribeResult = std::result::Result<TranscriptionOutcome, TranscribeError>;

/// Write state to file for external integrations (e.g., Waybar)
fn write_state_file(path: &PathBuf, state: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Write PID file so external tooling can signal the daemon
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

fn cleanup_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Build a transcription backend from config plus stored key.
///
/// Returns None when credentials are incomplete; the daemon keeps
/// running and tells the user at release time instead of failing.
fn build_backend(
    azure: &AzureConfig,
    api_key: Option<String>,
) -> Option<Arc<dyn SpeechToText>> {
    let key = match api_key {
        Some(key) => key,
        None => {
            tracing::warn!("No API key configured, transcription disabled");
            return None;
        }
    };

    if azure.endpoint.trim().is_empty() {
        tracing::warn!("No Azure endpoint configured, transcription disabled");
        return None;
    }

    match AzureSpeechClient::new(
        &azure.endpoint,
        &azure.deployment,
        &azure.api_version,
        &key,
        azure.language.clone(),
    ) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!("Failed to build transcription client: {}", e);
            None
        }
    }
}

/// What to tell the user when transcription fails
fn user_message(e: &TranscribeError) -> String {
    match e {
        TranscribeError::Auth(_) => "Invalid API key. Check your credentials.".to_string(),
        TranscribeError::DeploymentNotFound => {
            "Whisper deployment not found. Check your deployment name.".to_string()
        }
        TranscribeError::RateLimited => "Rate limit exceeded. Try again shortly.".to_string(),
        TranscribeError::Timeout => "Transcription timed out. Try again.".to_string(),
        TranscribeError::Server(_) => "Transcription service error. Try again.".to_string(),
        TranscribeError::Network(_) => "Network error. Check your connection.".to_string(),
        TranscribeError::Config(msg) => msg.clone(),
        TranscribeError::Cancelled => "Transcription cancelled.".to_string(),
        TranscribeError::Unexpected { status, .. } => {
            format!("Unexpected response from transcription service (HTTP {})", status)
        }
    }
}

/// Session state machine plus the components it drives.
///
/// Methods are the single place state transitions happen; the event
/// loop in `Daemon::run` only routes events here.
struct Orchestrator {
    state: SessionState,
    capture: Box<dyn CaptureSession>,
    backend: Option<Arc<dyn SpeechToText>>,
    sink: Arc<dyn OutputSink>,
    notifier: Arc<dyn Notifier>,
    cues: Option<CuePlayer>,
    device: Option<String>,
    state_file: Option<PathBuf>,
    done_tx: mpsc::Sender<TranscribeResult>,
    cancel: CancellationToken,
}

impl Orchestrator {
    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(ref path) = self.state_file {
            write_state_file(path, state.name());
        }
    }

    fn play(&self, cue: Cue) {
        if let Some(ref cues) = self.cues {
            cues.play(cue);
        }
    }

    /// Hotkey pressed: begin recording, but only from idle.
    /// A press while transcribing is dropped entirely; there is at most
    /// one capture and one transcription in flight.
    async fn on_pressed(&mut self) {
        if !self.state.is_idle() {
            tracing::debug!("Hotkey pressed while {}, ignoring", self.state);
            return;
        }

        let device = self.device.as_deref();
        match self.capture.start(device).await {
            Ok(()) => {
                tracing::info!("Recording started");
                self.set_state(SessionState::Recording {
                    started_at: std::time::Instant::now(),
                });
                self.play(Cue::Start);
            }
            Err(e) => {
                tracing::error!("Failed to start audio capture: {}", e);
                self.notifier
                    .notify("Recording failed", &e.to_string())
                    .await;
            }
        }
    }

    /// Hotkey released: finalize the capture and hand it to the backend
    async fn on_released(&mut self) {
        if !self.state.is_recording() {
            tracing::trace!("Hotkey released while {}, ignoring", self.state);
            return;
        }

        let duration = self.state.recording_duration().unwrap_or_default();
        tracing::info!("Recording stopped ({:.1}s)", duration.as_secs_f32());

        let payload = match self.capture.stop().await {
            Ok(StopOutcome::Captured(payload)) => payload,
            Ok(StopOutcome::TooShort) | Ok(StopOutcome::Inactive) => {
                // Accidental tap: no chirp, no notification
                tracing::debug!("Capture discarded, returning to idle");
                self.set_state(SessionState::Idle);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to stop audio capture: {}", e);
                self.notifier
                    .notify("Recording failed", &e.to_string())
                    .await;
                self.set_state(SessionState::Idle);
                return;
            }
        };

        self.play(Cue::Stop);

        let Some(backend) = self.backend.clone() else {
            tracing::warn!("Capture ready but no transcription backend configured");
            self.notifier
                .notify(
                    "Transcription unavailable",
                    "Configure your Azure endpoint and API key first.",
                )
                .await;
            self.set_state(SessionState::Idle);
            return;
        };

        tracing::info!(
            "Transcribing {} ms of audio ({} bytes)",
            payload.duration_ms,
            payload.wav_bytes.len()
        );
        self.set_state(SessionState::Transcribing);

        // The task owns its backend handle and payload; a config swap
        // during the flight is invisible to it
        let done_tx = self.done_tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let result = backend.transcribe(&payload, cancel).await;
            let _ = done_tx.send(result).await;
        });
    }

    /// A spawned transcription finished; deliver or report, then idle
    async fn on_transcription_done(&mut self, result: TranscribeResult) {
        if !self.state.is_transcribing() {
            tracing::debug!("Transcription result arrived while {}", self.state);
        }

        match result {
            Ok(TranscriptionOutcome::Text(text)) => {
                tracing::info!("Transcribed: {:?}", text);
                // Delivery failure is reported but never retried
                if let Err(e) = self.sink.deliver(&text).await {
                    tracing::error!("Delivery via {} failed: {}", self.sink.name(), e);
                    self.notifier
                        .notify("Delivery failed", &e.to_string())
                        .await;
                }
            }
            Ok(TranscriptionOutcome::Empty) => {
                tracing::info!("Transcription was empty");
                self.notifier
                    .notify("No speech detected", "The recording contained no speech.")
                    .await;
            }
            Err(TranscribeError::Cancelled) => {
                tracing::debug!("Transcription cancelled");
            }
            Err(e) => {
                tracing::error!("Transcription failed: {}", e);
                self.notifier
                    .notify("Transcription failed", &user_message(&e))
                    .await;
            }
        }

        self.set_state(SessionState::Idle);
    }

    /// Safety limit: discard a recording that ran too long
    async fn enforce_max_duration(&mut self, max: Duration) {
        let Some(duration) = self.state.recording_duration() else {
            return;
        };
        if duration <= max {
            return;
        }

        tracing::warn!(
            "Recording timeout ({:.0}s limit), discarding",
            max.as_secs_f32()
        );
        if let Err(e) = self.capture.stop().await {
            tracing::warn!("Failed to stop timed-out capture: {}", e);
        }
        self.notifier
            .notify(
                "Recording limit reached",
                "The recording ran too long and was discarded.",
            )
            .await;
        self.set_state(SessionState::Idle);
    }
}

/// Main daemon that wires the components together
pub struct Daemon {
    config: Config,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    secret_store: Box<dyn SecretStore>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        overrides: Overrides,
        secret_store: Box<dyn SecretStore>,
    ) -> Self {
        Self {
            config,
            config_path,
            overrides,
            secret_store,
            pid_file_path: None,
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting pushtype daemon");

        self.pid_file_path = write_pid_file();

        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| PushtypeError::Config(format!("Failed to set up SIGHUP handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| PushtypeError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

        Config::ensure_directories()
            .map_err(|e| PushtypeError::Config(format!("Failed to create directories: {}", e)))?;

        // An unparseable combo at startup is fatal; there is nothing to
        // listen for
        let combo = Combo::parse(&self.config.hotkey)?;
        tracing::info!("Hotkey: {} (hold to record, release to transcribe)", combo);

        let mut trigger = crate::hotkey::create_trigger(combo)?;
        let mut hotkey_rx = trigger.start().await?;

        let backend = build_backend(&self.config.azure, self.secret_store.load_key());
        if backend.is_some() {
            tracing::info!("Transcription backend ready: azure-whisper");
        }

        let (done_tx, mut done_rx) = mpsc::channel::<TranscribeResult>(4);

        let device = match self.config.audio.device.as_str() {
            "" | "default" => None,
            name => Some(name.to_string()),
        };

        let mut orchestrator = Orchestrator {
            state: SessionState::Idle,
            capture: crate::audio::create_capture(),
            backend,
            sink: Arc::from(crate::output::create_sink()),
            notifier: Arc::new(crate::notification::DesktopNotifier::new()),
            cues: CuePlayer::new(&self.config.audio.feedback),
            device,
            state_file: self.config.resolve_state_file(),
            done_tx,
            cancel: CancellationToken::new(),
        };

        if let Some(ref path) = orchestrator.state_file {
            tracing::info!("State file: {:?}", path);
        }
        orchestrator.set_state(SessionState::Idle);

        let mut max_duration = Duration::from_secs(self.config.audio.max_duration_secs as u64);

        // Main event loop
        loop {
            tokio::select! {
                Some(event) = hotkey_rx.recv() => {
                    match event {
                        HotkeyEvent::Pressed => orchestrator.on_pressed().await,
                        HotkeyEvent::Released => orchestrator.on_released().await,
                    }
                }

                Some(result) = done_rx.recv() => {
                    orchestrator.on_transcription_done(result).await;
                }

                // Recording safety limit
                _ = tokio::time::sleep(Duration::from_millis(100)),
                        if orchestrator.state.is_recording() => {
                    orchestrator.enforce_max_duration(max_duration).await;
                }

                // SIGHUP: reload configuration, suspending detection for
                // the duration of the swap and resuming unconditionally
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");

                    // A recording caught mid-reload is finished normally
                    if orchestrator.state.is_recording() {
                        orchestrator.on_released().await;
                    }

                    trigger.stop().await?;

                    match config::load_config(self.config_path.as_deref()) {
                        Ok(mut new_config) => {
                            // Flags given at launch stay in force
                            self.overrides.apply(&mut new_config);
                            match Combo::parse(&new_config.hotkey) {
                                Ok(combo) => {
                                    trigger.set_target(combo);
                                    tracing::info!("Hotkey: {}", combo);
                                }
                                Err(e) => {
                                    tracing::error!("Invalid hotkey in config: {}", e);
                                    orchestrator.notifier.notify(
                                        "Invalid hotkey",
                                        "Keeping the previous combo.",
                                    ).await;
                                }
                            }

                            orchestrator.backend = build_backend(
                                &new_config.azure,
                                self.secret_store.load_key(),
                            );
                            orchestrator.device = match new_config.audio.device.as_str() {
                                "" | "default" => None,
                                name => Some(name.to_string()),
                            };
                            orchestrator.cues = CuePlayer::new(&new_config.audio.feedback);
                            orchestrator.state_file = new_config.resolve_state_file();
                            max_duration =
                                Duration::from_secs(new_config.audio.max_duration_secs as u64);
                            self.config = new_config;
                            tracing::info!("Configuration reloaded");
                        }
                        Err(e) => {
                            tracing::error!("Reload failed, keeping previous config: {}", e);
                            orchestrator.notifier.notify(
                                "Reload failed",
                                &e.to_string(),
                            ).await;
                        }
                    }

                    // Detection resumes no matter how the reload went
                    hotkey_rx = trigger.start().await?;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Cleanup: abort any in-flight transcription, release the
        // subscription and the capture device
        orchestrator.cancel.cancel();
        trigger.stop().await?;
        if orchestrator.state.is_recording() {
            let _ = orchestrator.capture.stop().await;
        }

        if let Some(ref path) = orchestrator.state_file {
            cleanup_state_file(path);
        }
        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }

        tracing::info!("Daemon stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CapturePayload, CaptureSession};
    use crate::error::{DeviceError, OutputError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockCapture {
        starts: Arc<AtomicUsize>,
        capturing: bool,
        next_outcome: Arc<Mutex<Option<StopOutcome>>>,
    }

    #[async_trait::async_trait]
    impl CaptureSession for MockCapture {
        async fn start(&mut self, _device: Option<&str>) -> std::result::Result<(), DeviceError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.capturing = true;
            Ok(())
        }

        async fn stop(&mut self) -> std::result::Result<StopOutcome, DeviceError> {
            self.capturing = false;
            Ok(self
                .next_outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or(StopOutcome::Inactive))
        }

        fn is_capturing(&self) -> bool {
            self.capturing
        }
    }

    struct MockBackend {
        calls: Arc<AtomicUsize>,
        response: TranscribeResult,
    }

    #[async_trait::async_trait]
    impl SpeechToText for MockBackend {
        async fn transcribe(
            &self,
            _payload: &CapturePayload,
            _cancel: CancellationToken,
        ) -> TranscribeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct MockSink {
        delivered: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl OutputSink for MockSink {
        async fn deliver(&self, text: &str) -> std::result::Result<(), OutputError> {
            self.delivered.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    struct MockNotifier {
        messages: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, summary: &str, _body: &str) {
            self.messages.lock().unwrap().push(summary.to_string());
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        done_rx: mpsc::Receiver<TranscribeResult>,
        starts: Arc<AtomicUsize>,
        next_outcome: Arc<Mutex<Option<StopOutcome>>>,
        backend_calls: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<String>>>,
        notifications: Arc<Mutex<Vec<String>>>,
    }

    fn harness(backend_response: Option<TranscribeResult>) -> Harness {
        let starts = Arc::new(AtomicUsize::new(0));
        let next_outcome = Arc::new(Mutex::new(None));
        let backend_calls = Arc::new(AtomicUsize::new(0));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let notifications = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel(4);

        let backend: Option<Arc<dyn SpeechToText>> = backend_response.map(|response| {
            Arc::new(MockBackend {
                calls: backend_calls.clone(),
                response,
            }) as Arc<dyn SpeechToText>
        });

        let orchestrator = Orchestrator {
            state: SessionState::Idle,
            capture: Box::new(MockCapture {
                starts: starts.clone(),
                capturing: false,
                next_outcome: next_outcome.clone(),
            }),
            backend,
            sink: Arc::new(MockSink {
                delivered: delivered.clone(),
            }),
            notifier: Arc::new(MockNotifier {
                messages: notifications.clone(),
            }),
            cues: None,
            device: None,
            state_file: None,
            done_tx,
            cancel: CancellationToken::new(),
        };

        Harness {
            orchestrator,
            done_rx,
            starts,
            next_outcome,
            backend_calls,
            delivered,
            notifications,
        }
    }

    fn payload() -> CapturePayload {
        CapturePayload {
            wav_bytes: vec![0u8; 20_000],
            duration_ms: 1200,
        }
    }

    #[tokio::test]
    async fn test_happy_path_delivers_text_once() {
        let mut h = harness(Some(Ok(TranscriptionOutcome::Text("hello world".to_string()))));

        h.orchestrator.on_pressed().await;
        assert!(h.orchestrator.state.is_recording());

        *h.next_outcome.lock().unwrap() = Some(StopOutcome::Captured(payload()));
        h.orchestrator.on_released().await;
        assert!(h.orchestrator.state.is_transcribing());

        let result = h.done_rx.recv().await.unwrap();
        h.orchestrator.on_transcription_done(result).await;

        assert!(h.orchestrator.state.is_idle());
        assert_eq!(h.backend_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.delivered.lock().unwrap(), vec!["hello world".to_string()]);
        assert!(h.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_tap_is_discarded_silently() {
        let mut h = harness(Some(Ok(TranscriptionOutcome::Text("unused".to_string()))));

        h.orchestrator.on_pressed().await;
        *h.next_outcome.lock().unwrap() = Some(StopOutcome::TooShort);
        h.orchestrator.on_released().await;

        assert!(h.orchestrator.state.is_idle());
        assert_eq!(h.backend_calls.load(Ordering::SeqCst), 0);
        assert!(h.delivered.lock().unwrap().is_empty());
        assert!(h.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_press_during_transcription_is_ignored() {
        let mut h = harness(Some(Ok(TranscriptionOutcome::Text("first".to_string()))));

        h.orchestrator.on_pressed().await;
        *h.next_outcome.lock().unwrap() = Some(StopOutcome::Captured(payload()));
        h.orchestrator.on_released().await;
        assert!(h.orchestrator.state.is_transcribing());

        // Second press while the first flight is pending: dropped, not queued
        h.orchestrator.on_pressed().await;
        assert!(h.orchestrator.state.is_transcribing());
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);

        let result = h.done_rx.recv().await.unwrap();
        h.orchestrator.on_transcription_done(result).await;
        assert!(h.orchestrator.state.is_idle());
    }

    #[tokio::test]
    async fn test_press_while_recording_starts_no_second_capture() {
        let mut h = harness(None);
        h.orchestrator.on_pressed().await;
        h.orchestrator.on_pressed().await;
        assert!(h.orchestrator.state.is_recording());
        assert_eq!(h.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_while_idle_is_ignored() {
        let mut h = harness(None);
        h.orchestrator.on_released().await;
        assert!(h.orchestrator.state.is_idle());
        assert!(h.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_backend_notifies_and_idles() {
        let mut h = harness(None);

        h.orchestrator.on_pressed().await;
        *h.next_outcome.lock().unwrap() = Some(StopOutcome::Captured(payload()));
        h.orchestrator.on_released().await;

        assert!(h.orchestrator.state.is_idle());
        assert_eq!(
            *h.notifications.lock().unwrap(),
            vec!["Transcription unavailable".to_string()]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_notifies_and_idles() {
        let mut h = harness(Some(Err(TranscribeError::Auth(401))));

        h.orchestrator.on_pressed().await;
        *h.next_outcome.lock().unwrap() = Some(StopOutcome::Captured(payload()));
        h.orchestrator.on_released().await;

        let result = h.done_rx.recv().await.unwrap();
        h.orchestrator.on_transcription_done(result).await;

        assert!(h.orchestrator.state.is_idle());
        assert_eq!(
            *h.notifications.lock().unwrap(),
            vec!["Transcription failed".to_string()]
        );
        assert!(h.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_transcript_notifies_without_delivery() {
        let mut h = harness(Some(Ok(TranscriptionOutcome::Empty)));

        h.orchestrator.on_pressed().await;
        *h.next_outcome.lock().unwrap() = Some(StopOutcome::Captured(payload()));
        h.orchestrator.on_released().await;

        let result = h.done_rx.recv().await.unwrap();
        h.orchestrator.on_transcription_done(result).await;

        assert!(h.orchestrator.state.is_idle());
        assert!(h.delivered.lock().unwrap().is_empty());
        assert_eq!(
            *h.notifications.lock().unwrap(),
            vec!["No speech detected".to_string()]
        );
    }

    #[test]
    fn test_user_message_covers_auth() {
        assert!(user_message(&TranscribeError::Auth(401)).contains("API key"));
        assert!(user_message(&TranscribeError::DeploymentNotFound).contains("deployment"));
    }
}
