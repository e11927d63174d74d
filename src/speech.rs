//! Audio challenge decoding and the speech-recognition capability.

use std::io::Cursor;

use async_trait::async_trait;
use log::debug;
use rodio::{Decoder, Source};

use crate::errors::Error;

/// Decoded mono audio, ready for a [`SpeechTranscriber`].
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioClip {
    /// Decode compressed audio bytes (mp3 or wav) into a mono clip.
    ///
    /// Multi-channel input is downmixed by averaging interleaved frames.
    /// Undecodable bytes are a solve failure, not an automation fault; the
    /// audio flow treats this as a retryable round.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let decoder = Decoder::new(Cursor::new(bytes.to_vec())).map_err(|err| {
            debug!("audio challenge bytes failed to decode: {err}");
            Error::SolveFailed
        })?;

        let sample_rate = decoder.sample_rate();
        let channels = decoder.channels().max(1) as usize;

        let samples = if channels == 1 {
            decoder.collect()
        } else {
            let mut mono = Vec::new();
            let mut frame = Vec::with_capacity(channels);
            for sample in decoder {
                frame.push(sample as i32);
                if frame.len() == channels {
                    let sum: i32 = frame.iter().sum();
                    mono.push((sum / channels as i32) as i16);
                    frame.clear();
                }
            }
            mono
        };

        if samples.is_empty() {
            debug!("audio challenge stream decoded to no samples");
            return Err(Error::SolveFailed);
        }

        Ok(Self { sample_rate, samples })
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Speech-to-text capability for audio challenges.
///
/// `Ok(None)` means the recognizer produced no usable transcript; the caller
/// fetches a fresh challenge and tries again. `Err` is reserved for faults
/// that retrying cannot fix.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribe `clip`, with `language` as a BCP 47 recognition hint.
    async fn transcribe(&self, clip: &AudioClip, language: &str)
        -> Result<Option<String>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal valid 16-bit PCM WAV container around the given frames.
    fn wav_bytes(sample_rate: u32, channels: u16, frames: &[i16]) -> Vec<u8> {
        let data_len = (frames.len() * 2) as u32;
        let byte_rate = sample_rate * channels as u32 * 2;
        let block_align = channels * 2;

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for frame in frames {
            out.extend_from_slice(&frame.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_mono_wav() {
        let bytes = wav_bytes(8000, 1, &[0, 100, -100, 200]);
        let clip = AudioClip::decode(&bytes).expect("decodes");
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.samples.len(), 4);
    }

    #[test]
    fn reports_the_clip_duration() {
        let bytes = wav_bytes(8000, 1, &[0; 4000]);
        let clip = AudioClip::decode(&bytes).expect("decodes");
        assert_eq!(clip.duration_secs(), 0.5);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let bytes = wav_bytes(8000, 2, &[100, 300, -200, 0]);
        let clip = AudioClip::decode(&bytes).expect("decodes");
        assert_eq!(clip.samples, vec![200, -100]);
    }

    #[test]
    fn garbage_bytes_are_a_solve_failure() {
        let err = AudioClip::decode(b"not audio at all").unwrap_err();
        assert!(matches!(err, Error::SolveFailed));
    }
}
