//! cpal-based capture session
//!
//! Uses the cpal crate for audio input, which works with PipeWire,
//! PulseAudio, and ALSA backends.
//!
//! cpal::Stream is not Send, so the stream lives on a dedicated thread
//! for the whole capture; start/stop communicate with it via channels.
//! The stream, thread, and sample buffer are all released before `stop`
//! returns, on every path.

use super::{finalize_samples, CaptureSession, StopOutcome, SAMPLE_RATE};
use crate::error::DeviceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// Commands sent to the capture thread
enum CaptureCommand {
    Stop(oneshot::Sender<Vec<f32>>),
}

/// cpal-backed implementation of `CaptureSession`
pub struct CpalCapture {
    /// Command sender to the capture thread; present while capturing
    cmd_tx: Option<std::sync::mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureSession for CpalCapture {
    async fn start(&mut self, device: Option<&str>) -> Result<(), DeviceError> {
        if self.cmd_tx.is_some() {
            // Already capturing; exactly one underlying handle stays live
            tracing::debug!("start() while capturing, ignoring");
            return Ok(());
        }

        let host = cpal::default_host();

        // Resolve the requested device, falling back to the system default
        // exactly once when a named device is missing
        let device = match resolve_device(&host, device) {
            Ok(device) => device,
            Err(DeviceError::NotFound(name)) if device.is_some() => {
                tracing::warn!(
                    "Audio device '{}' not found, falling back to system default",
                    name
                );
                resolve_device(&host, None)?
            }
            Err(e) => return Err(e),
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| classify_message(&e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), DeviceError>>();

        let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
        let samples_clone = samples.clone();

        let thread_handle = thread::spawn(move || {
            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::error!("Audio stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(
                    &device,
                    &stream_config,
                    samples_clone.clone(),
                    source_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::I16 => build_stream::<i16>(
                    &device,
                    &stream_config,
                    samples_clone.clone(),
                    source_rate,
                    source_channels,
                    err_fn,
                ),
                cpal::SampleFormat::U16 => build_stream::<u16>(
                    &device,
                    &stream_config,
                    samples_clone.clone(),
                    source_rate,
                    source_channels,
                    err_fn,
                ),
                format => Err(DeviceError::Other(format!(
                    "Unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result.and_then(|s| {
                s.play()
                    .map_err(|e| classify_message(&e.to_string()))
                    .map(|_| s)
            }) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::debug!("Audio capture thread started");

            // Block until stopped; dropping the stream releases the device
            if let Ok(CaptureCommand::Stop(reply_tx)) = cmd_rx.recv() {
                drop(stream);
                let collected = {
                    let guard = samples_clone.lock().unwrap_or_else(|e| e.into_inner());
                    guard.clone()
                };
                let _ = reply_tx.send(collected);
            }

            tracing::debug!("Audio capture thread stopped");
        });

        // Wait for the stream to come up so acquisition failures surface
        // here rather than getting lost on the capture thread
        match ready_rx.await {
            Ok(Ok(())) => {
                self.cmd_tx = Some(cmd_tx);
                self.thread_handle = Some(thread_handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(DeviceError::Other("capture thread exited early".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<StopOutcome, DeviceError> {
        let Some(cmd_tx) = self.cmd_tx.take() else {
            return Ok(StopOutcome::Inactive);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let samples = if cmd_tx.send(CaptureCommand::Stop(reply_tx)).is_ok() {
            // Synchronize with the capture thread: any in-flight buffer
            // write completes before it replies
            match tokio::time::timeout(std::time::Duration::from_secs(2), reply_rx).await {
                Ok(Ok(samples)) => samples,
                Ok(Err(_)) => {
                    self.join_thread();
                    return Err(DeviceError::Other("capture thread hung up".to_string()));
                }
                Err(_) => {
                    self.join_thread();
                    return Err(DeviceError::StopTimeout(2));
                }
            }
        } else {
            Vec::new()
        };

        self.join_thread();

        tracing::debug!(
            "Audio capture stopped: {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        finalize_samples(&samples)
    }

    fn is_capturing(&self) -> bool {
        self.cmd_tx.is_some()
    }
}

impl CpalCapture {
    fn join_thread(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        // Releases device and thread even if stop() was never called
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let (reply_tx, _reply_rx) = oneshot::channel();
            let _ = cmd_tx.send(CaptureCommand::Stop(reply_tx));
        }
        self.join_thread();
    }
}

/// Resolve a named input device, or the system default for `None`
fn resolve_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    match name {
        None | Some("default") => host
            .default_input_device()
            .ok_or_else(|| DeviceError::NoDriver("no default input device".to_string())),
        Some(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| classify_message(&e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::NotFound(name.to_string()))
        }
    }
}

/// Classify a backend error message into the device error taxonomy.
/// cpal surfaces most platform failures as backend-specific strings.
fn classify_message(message: &str) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
        DeviceError::PermissionDenied
    } else if lower.contains("not found") || lower.contains("no such") || lower.contains("unavailable") {
        DeviceError::NotFound(message.to_string())
    } else if lower.contains("no host") || lower.contains("driver") || lower.contains("backend") {
        DeviceError::NoDriver(message.to_string())
    } else {
        DeviceError::Other(message.to_string())
    }
}

/// Build an input stream for a specific sample type, mixing to mono and
/// resampling to the target rate inside the data callback
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    source_rate: u32,
    source_channels: usize,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != SAMPLE_RATE {
                    resample(&mono, source_rate, SAMPLE_RATE)
                } else {
                    mono
                };

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| classify_message(&e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let result = resample(&[1.0, 2.0], 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }

    #[test]
    fn test_classify_message() {
        assert!(matches!(
            classify_message("Permission denied by policy"),
            DeviceError::PermissionDenied
        ));
        assert!(matches!(
            classify_message("device not found"),
            DeviceError::NotFound(_)
        ));
        assert!(matches!(
            classify_message("no host backend available"),
            DeviceError::NoDriver(_)
        ));
        assert!(matches!(
            classify_message("something else entirely"),
            DeviceError::Other(_)
        ));
    }

    #[test]
    fn test_stop_without_start_is_inactive() {
        let mut capture = CpalCapture::new();
        assert!(!capture.is_capturing());
        let outcome = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(capture.stop())
            .unwrap();
        assert!(matches!(outcome, StopOutcome::Inactive));
    }
}
