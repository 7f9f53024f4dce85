use thiserror::Error;

/// Error taxonomy for the streaming engine.
///
/// Misuse errors (`DuplicateSession`, `UnknownSession`) surface synchronously
/// to the caller. Transport errors (`Connection`, `StreamClosed`, `Timeout`)
/// are caught inside the pump task and drive the restart policy;
/// `BackendProtocol` failures are logged and skipped so one malformed event
/// cannot sacrifice an otherwise successful utterance.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The adapter could not open a connection to the backend.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The adapter connection dropped mid-send or was already closed.
    #[error("stream closed: {0}")]
    StreamClosed(String),

    /// A dial or drain exceeded its configured bound.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A session with this id is already active.
    #[error("session {0} already active")]
    DuplicateSession(String),

    /// No active session with this id.
    #[error("unknown session {0}")]
    UnknownSession(String),

    /// The backend sent an event the adapter could not interpret.
    #[error("backend protocol error: {0}")]
    BackendProtocol(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
