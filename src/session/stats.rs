use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Point-in-time snapshot of one session's counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Chunks accepted from the producer
    pub chunks_received: u64,

    /// Chunks delivered to the adapter
    pub chunks_sent: u64,

    /// Audio bytes delivered to the adapter
    pub bytes_sent: u64,

    /// Accumulated duration of accepted audio, in milliseconds
    pub audio_duration_ms: u64,

    /// Chunks still buffered in the queue
    pub chunks_queued: usize,

    /// Reconnects performed so far
    pub restarts: u32,
}
