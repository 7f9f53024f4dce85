use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::transcript::TranscriptEvent;

/// First frame on a websocket connection: tells the backend what audio to
/// expect and asks for interim results.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartMessage {
    pub event: String, // "start"
    pub request_id: String,
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub interim_results: bool,
}

impl StartMessage {
    pub fn new(request_id: String, format: &AudioFormat) -> Self {
        Self {
            event: "start".to_string(),
            request_id,
            encoding: match format.encoding {
                crate::audio::AudioEncoding::Pcm16 => "pcm16".to_string(),
                crate::audio::AudioEncoding::Opus => "opus".to_string(),
            },
            sample_rate: format.sample_rate,
            channels: format.channels,
            interim_results: true,
        }
    }
}

/// End-of-audio control frame on the websocket transport.
#[derive(Debug, Serialize, Deserialize)]
pub struct StopMessage {
    pub event: String, // "stop"
}

impl StopMessage {
    pub fn new() -> Self {
        Self {
            event: "stop".to_string(),
        }
    }
}

impl Default for StopMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Transcript frame received on the websocket transport.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireTranscript {
    pub text: String,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub confidence: Option<f32>,
}

impl From<WireTranscript> for TranscriptEvent {
    fn from(wire: WireTranscript) -> Self {
        TranscriptEvent {
            text: wire.text,
            is_final: wire.is_final,
            confidence: wire.confidence,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Audio frame message published on the relay transport
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u64,
    pub pcm: String, // Base64-encoded audio bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received on the relay transport
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    pub confidence: Option<f32>,
}

impl From<TranscriptMessage> for TranscriptEvent {
    fn from(msg: TranscriptMessage) -> Self {
        TranscriptEvent {
            text: msg.text,
            is_final: !msg.partial,
            confidence: msg.confidence,
            timestamp: chrono::Utc::now(),
        }
    }
}
