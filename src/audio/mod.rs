//! Audio capture module
//!
//! Captures microphone audio via cpal (PipeWire, PulseAudio, ALSA) at a
//! fixed target format and finalizes it into a WAV container suitable for
//! the transcription endpoint.

pub mod cpal_capture;
pub mod feedback;

use crate::error::DeviceError;
use std::io::Cursor;

/// Fixed capture format expected by the speech-to-text endpoint
pub const SAMPLE_RATE: u32 = 16_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const CHANNELS: u16 = 1;

/// Captures shorter than this are treated as accidental taps and discarded
pub const MIN_DURATION_MS: u64 = 500;

/// Size of a WAV file containing a header and no samples
const WAV_HEADER_LEN: usize = 44;

/// A finalized capture: complete WAV container plus elapsed duration.
///
/// Exists only between a successful stop and its consumption by the
/// transcription client; the orchestrator owns it for that window.
#[derive(Debug, Clone)]
pub struct CapturePayload {
    /// 16 kHz, 16-bit, mono WAV bytes
    pub wav_bytes: Vec<u8>,
    pub duration_ms: u64,
}

/// Result of stopping a capture session
#[derive(Debug)]
pub enum StopOutcome {
    /// Capture finalized into a payload
    Captured(CapturePayload),
    /// Below the minimum duration threshold; payload discarded
    TooShort,
    /// No capture was in progress
    Inactive,
}

impl StopOutcome {
    pub fn into_payload(self) -> Option<CapturePayload> {
        match self {
            StopOutcome::Captured(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Trait for audio capture implementations
#[async_trait::async_trait]
pub trait CaptureSession: Send {
    /// Begin streaming audio from the given device, or the system default
    /// when `None`. Returns immediately; capture proceeds asynchronously.
    /// Calling this while already capturing is a no-op.
    async fn start(&mut self, device: Option<&str>) -> Result<(), DeviceError>;

    /// Finalize the in-progress buffer into a payload, applying the
    /// minimum-duration gate. A no-op returning `Inactive` when not
    /// capturing. All native resources are released before this returns.
    async fn stop(&mut self) -> Result<StopOutcome, DeviceError>;

    /// Whether a capture is currently in progress
    fn is_capturing(&self) -> bool;
}

/// Factory for the platform capture session
pub fn create_capture() -> Box<dyn CaptureSession> {
    Box::new(cpal_capture::CpalCapture::new())
}

/// Finalize accumulated mono samples into a `StopOutcome`.
///
/// Applies the minimum-duration gate and treats a header-only container
/// the same as a discard. Pure so the gating rules are testable without
/// a capture device.
pub fn finalize_samples(samples: &[f32]) -> Result<StopOutcome, DeviceError> {
    let duration_ms = samples.len() as u64 * 1000 / SAMPLE_RATE as u64;

    if duration_ms < MIN_DURATION_MS {
        tracing::debug!("Capture too short ({} ms), discarding", duration_ms);
        return Ok(StopOutcome::TooShort);
    }

    let wav_bytes = encode_wav(samples)?;
    if wav_bytes.len() <= WAV_HEADER_LEN {
        tracing::debug!("Capture produced a header-only container, discarding");
        return Ok(StopOutcome::TooShort);
    }

    tracing::debug!(
        "Capture finalized: {} bytes, {} ms",
        wav_bytes.len(),
        duration_ms
    );
    Ok(StopOutcome::Captured(CapturePayload {
        wav_bytes,
        duration_ms,
    }))
}

/// Encode f32 samples into the fixed 16 kHz / 16-bit / mono WAV container
fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, DeviceError> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| DeviceError::Other(format!("Failed to create WAV writer: {}", e)))?;

    // Convert f32 [-1.0, 1.0] to i16
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| DeviceError::Other(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| DeviceError::Other(format!("Failed to finalize WAV: {}", e)))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples_for_ms(ms: u64) -> Vec<f32> {
        let n = (SAMPLE_RATE as u64 * ms / 1000) as usize;
        (0..n)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_short_capture_is_discarded() {
        let outcome = finalize_samples(&samples_for_ms(400)).unwrap();
        assert!(matches!(outcome, StopOutcome::TooShort));
        assert!(outcome.into_payload().is_none());
    }

    #[test]
    fn test_long_capture_yields_payload() {
        let outcome = finalize_samples(&samples_for_ms(600)).unwrap();
        let payload = outcome.into_payload().expect("expected a payload");
        assert_eq!(payload.duration_ms, 600);
        // 600ms at 16kHz, 16-bit mono = 9600 samples * 2 bytes + 44 header
        assert_eq!(payload.wav_bytes.len(), WAV_HEADER_LEN + 9600 * 2);
    }

    #[test]
    fn test_wav_container_is_well_formed() {
        let payload = finalize_samples(&samples_for_ms(1000))
            .unwrap()
            .into_payload()
            .unwrap();
        assert_eq!(&payload.wav_bytes[0..4], b"RIFF");
        assert_eq!(&payload.wav_bytes[8..12], b"WAVE");
    }

    #[test]
    fn test_empty_capture_is_discarded() {
        let outcome = finalize_samples(&[]).unwrap();
        assert!(matches!(outcome, StopOutcome::TooShort));
    }

    #[test]
    fn test_gate_boundary() {
        // Exactly at the threshold passes; one sample under rounds down
        let at = samples_for_ms(MIN_DURATION_MS);
        assert!(matches!(
            finalize_samples(&at).unwrap(),
            StopOutcome::Captured(_)
        ));

        let under = &at[..at.len() - 16]; // 1ms short
        assert!(matches!(
            finalize_samples(under).unwrap(),
            StopOutcome::TooShort
        ));
    }

    #[test]
    fn test_samples_are_clamped() {
        let loud: Vec<f32> = vec![2.0; SAMPLE_RATE as usize];
        let payload = finalize_samples(&loud).unwrap().into_payload().unwrap();
        // First sample after the header must be i16::MAX, little-endian
        let first = i16::from_le_bytes([payload.wav_bytes[44], payload.wav_bytes[45]]);
        assert_eq!(first, i16::MAX);
    }
}
