use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Audio payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// 16-bit little-endian PCM
    Pcm16,
    /// Opus frames
    Opus,
}

/// Format tag carried by every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Payload encoding
    pub encoding: AudioEncoding,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Pcm16,
            sample_rate: 16000, // 16kHz, what the ASR backends expect
            channels: 1,        // Mono
        }
    }
}

/// One immutable buffer of utterance audio.
///
/// Produced by the caller and moved into the session queue, which owns it
/// exclusively until the pump consumes it.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio bytes in `format.encoding`
    pub data: Vec<u8>,

    /// Encoding, sample rate and channel count of `data`
    pub format: AudioFormat,

    /// Monotonic per-session sequence number
    pub sequence: u64,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>, format: AudioFormat, sequence: u64) -> Self {
        Self {
            data,
            format,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of this chunk, when derivable from the format.
    pub fn duration(&self) -> Option<Duration> {
        match self.format.encoding {
            AudioEncoding::Pcm16 => {
                let bytes_per_second =
                    u64::from(self.format.sample_rate) * u64::from(self.format.channels) * 2;
                if bytes_per_second == 0 {
                    return None;
                }
                Some(Duration::from_micros(
                    self.data.len() as u64 * 1_000_000 / bytes_per_second,
                ))
            }
            // Opus frame length is not derivable from the byte count.
            AudioEncoding::Opus => None,
        }
    }
}
