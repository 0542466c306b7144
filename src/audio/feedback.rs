//! Audio cues for capture start/stop
//!
//! Plays a short walkie-talkie style chirp when recording begins and a
//! falling counterpart when it ends. Cues are generated programmatically
//! so the binary ships no audio assets.
//!
//! Cue playback is strictly best-effort: a missing output device or a
//! decode failure is logged and otherwise ignored, and nothing here ever
//! feeds back into the capture or transcription path.

use crate::config::FeedbackConfig;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;

/// Cue event types
#[derive(Debug, Clone, Copy)]
pub enum Cue {
    /// Recording started (rising chirp)
    Start,
    /// Recording stopped (falling chirp)
    Stop,
}

/// Plays capture cues on the default output device
pub struct CuePlayer {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    volume: f32,
    start_chirp: Vec<u8>,
    stop_chirp: Vec<u8>,
}

impl CuePlayer {
    /// Open the default output device. Returns `None` when cues are
    /// disabled or no output device is available; callers carry on
    /// without feedback either way.
    pub fn new(config: &FeedbackConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let (stream, stream_handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Audio cues disabled, no output device: {}", e);
                return None;
            }
        };

        Some(Self {
            _stream: stream,
            stream_handle,
            volume: config.volume,
            // Rising 440Hz -> 880Hz on start, mirrored on stop
            start_chirp: generate_two_tone_wav(440.0, 880.0, 150, 20),
            stop_chirp: generate_two_tone_wav(880.0, 440.0, 150, 20),
        })
    }

    /// Play a cue without blocking the caller
    pub fn play(&self, cue: Cue) {
        let data = match cue {
            Cue::Start => &self.start_chirp,
            Cue::Stop => &self.stop_chirp,
        };

        if let Err(e) = self.play_wav(data) {
            tracing::warn!("Failed to play cue: {}", e);
        }
    }

    fn play_wav(&self, data: &[u8]) -> Result<(), String> {
        let cursor = Cursor::new(data.to_vec());
        let source = Decoder::new(cursor).map_err(|e| format!("Failed to decode cue: {}", e))?;
        let source = source.amplify(self.volume);

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| format!("Failed to create audio sink: {}", e))?;

        sink.append(source);
        sink.detach(); // Let it play in the background

        Ok(())
    }
}

/// Generate a two-tone chirp (rising or falling) as a WAV file
fn generate_two_tone_wav(freq1: f32, freq2: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    let sample_rate = 44100u32;
    let num_samples = (sample_rate * duration_ms / 1000) as usize;
    let fade_samples = (sample_rate * fade_ms / 1000) as usize;
    let half_samples = num_samples / 2;

    let mut samples: Vec<i16> = Vec::with_capacity(num_samples);

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let freq = if i < half_samples { freq1 } else { freq2 };
        let mut amplitude = (2.0 * std::f32::consts::PI * freq * t).sin();

        // Fade in/out envelope to avoid clicks at the edges
        if i < fade_samples {
            amplitude *= i as f32 / fade_samples as f32;
        } else if i >= num_samples - fade_samples {
            amplitude *= (num_samples - i) as f32 / fade_samples as f32;
        }

        samples.push((amplitude * 16000.0) as i16);
    }

    encode_pcm_wav(&samples, sample_rate)
}

/// Encode samples as a mono 16-bit PCM WAV container
fn encode_pcm_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut wav = Vec::new();

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    let file_size = (36 + samples.len() * 2) as u32;
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_chirp() {
        let wav = generate_two_tone_wav(440.0, 880.0, 100, 10);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 100ms at 44.1kHz mono 16-bit plus the 44-byte header
        assert_eq!(wav.len(), 44 + 4410 * 2);
    }

    #[test]
    fn test_disabled_config_yields_no_player() {
        let config = FeedbackConfig {
            enabled: false,
            volume: 1.0,
        };
        assert!(CuePlayer::new(&config).is_none());
    }
}
