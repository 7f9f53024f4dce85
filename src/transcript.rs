use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recognition result observed from the backend.
///
/// A later partial supersedes an earlier one for the same session; a final
/// event is terminal and later events for that session are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Recognized text
    pub text: String,

    /// Whether this is the terminal, non-revisable result
    pub is_final: bool,

    /// Confidence score (0.0 to 1.0), if the backend reports one
    pub confidence: Option<f32>,

    /// When this event was observed
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: None,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome category reported by `finalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStatus {
    /// A final event was observed; the transcript is authoritative.
    Ok,
    /// Delivery was abandoned (restart ceiling, or the backend closed the
    /// results stream during drain); the transcript is the best partial.
    Degraded,
    /// The drain or caller deadline elapsed; the best partial was promoted.
    Timeout,
    /// The session ended without a usable pump outcome.
    Error,
}

/// What `finalize` hands back to the caller and the `ResultSink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResult {
    /// Final text if available, else the last partial, else empty
    pub transcript: String,

    /// How the transcript was obtained
    pub status: FinalizeStatus,
}

impl FinalizeResult {
    pub fn new(transcript: impl Into<String>, status: FinalizeStatus) -> Self {
        Self {
            transcript: transcript.into(),
            status,
        }
    }
}
