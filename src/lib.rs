pub mod adapter;
pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod transcript;

pub use adapter::{
    AdapterFactory, BackendAdapter, BlockingTranscriber, NatsRelayAdapter, OneShotAdapter,
    OneShotFactory, ProviderFactory, WebSocketAdapter,
};
pub use audio::{AudioChunk, AudioEncoding, AudioFormat, AudioFrameQueue};
pub use config::{BackendConfig, Config, EngineConfig};
pub use error::EngineError;
pub use session::{SessionState, SessionStats, StreamingSession};
pub use supervisor::{LogSink, ResultSink, SessionSupervisor};
pub use transcript::{FinalizeResult, FinalizeStatus, TranscriptEvent};
