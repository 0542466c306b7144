//! evdev-based hotkey trigger
//!
//! Opens all keyboard devices under /dev/input in non-blocking mode and
//! polls them on a dedicated blocking task. Each raw key event is fed to
//! the pure `ComboDetector`; edge events are forwarded over a channel.
//!
//! The poll loop does no allocation-heavy work and never blocks on I/O,
//! so event handling stays within the latency budget the input subsystem
//! expects. Panics cannot escape: the loop only logs and continues.

use super::detector::{ComboDetector, KeyState};
use super::{Combo, HotkeyEvent, HotkeyTrigger, SharedTarget};
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// evdev-backed implementation of `HotkeyTrigger`
pub struct EvdevTrigger {
    target: SharedTarget,
    /// Signal to stop the poll task; also the "subscription installed" flag
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevTrigger {
    pub fn new(combo: Combo) -> Self {
        Self {
            target: SharedTarget::new(combo),
            stop_signal: None,
        }
    }
}

#[async_trait::async_trait]
impl HotkeyTrigger for EvdevTrigger {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        if self.stop_signal.is_some() {
            return Err(HotkeyError::InstallFailed("already started".to_string()));
        }

        // Device discovery happens here, not in the task, so install
        // failures surface to the caller as fatal-at-startup.
        let device_paths = find_keyboard_devices()?;
        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let target = self.target.clone();
        tokio::task::spawn_blocking(move || {
            poll_loop(device_paths, target, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }

    fn set_target(&self, combo: Combo) {
        self.target.replace(combo);
    }

    fn target(&self) -> Combo {
        self.target.snapshot().0
    }
}

impl Drop for EvdevTrigger {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
    }
}

/// Detection loop running on a blocking task
fn poll_loop(
    device_paths: Vec<PathBuf>,
    target: SharedTarget,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // Open all keyboard devices in non-blocking mode so fetch_events
    // returns immediately when there is nothing to read
    let mut devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("No keyboard devices could be opened");
        return;
    }

    let (combo, mut generation) = target.snapshot();
    let mut detector = ComboDetector::new(combo);

    // Seed live modifier state from the kernel's view of currently held
    // keys; a single key event does not report concurrent modifier state.
    for device in &devices {
        if let Ok(held) = device.get_key_state() {
            for key in held.iter() {
                detector.seed_modifier(key);
            }
        }
    }

    tracing::info!("Listening for {}", combo);

    loop {
        // Check for stop signal (non-blocking)
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Hotkey trigger stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        // Pick up a retargeted combo, resetting held-key tracking so the
        // old combo cannot produce stale events
        let (combo, gen) = target.snapshot();
        if gen != generation {
            generation = gen;
            detector.retarget(combo);
            tracing::info!("Hotkey retargeted to {}", combo);
        }

        for device in &mut devices {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(_) => continue, // EAGAIN or transient read error
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let Some(state) = KeyState::from_event_value(event.value()) else {
                    continue;
                };
                if let Some(edge) = detector.on_key(key, state) {
                    tracing::debug!("Hotkey {:?}", edge);
                    if tx.blocking_send(edge).is_err() {
                        return; // Channel closed, orchestrator gone
                    }
                }
            }
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::InstallFailed(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::InstallFailed(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                // Permission denied is fatal: the hook cannot be installed
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::InstallFailed(path.display().to_string()));
                }
                // Other errors (device busy, etc.) - just skip
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}
