//! Streaming session management
//!
//! One `StreamingSession` per utterance: an `AudioFrameQueue` on the producer
//! side, one `BackendAdapter` connection on the backend side, and a pump task
//! that drives the state machine between them (batch send, results polling,
//! bounded drain, reconnect-on-failure).

mod session;
mod state;
mod stats;

pub use session::StreamingSession;
pub use state::SessionState;
pub use stats::SessionStats;
