//! Backend adapters
//!
//! A `BackendAdapter` translates the uniform session protocol into one remote
//! speech-recognition service's wire calls. Wire format, auth and framing are
//! fully encapsulated here; the engine only sees the four-method capability
//! set plus `name()` for logging.

pub mod messages;
pub mod oneshot;
pub mod relay;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioChunk;
use crate::config::Config;
use crate::error::EngineError;
use crate::transcript::TranscriptEvent;

pub use oneshot::{BlockingTranscriber, OneShotAdapter, OneShotFactory};
pub use relay::NatsRelayAdapter;
pub use websocket::WebSocketAdapter;

/// One backend connection for one utterance.
///
/// `send` and the results receiver returned by `open` are independent
/// directions and are usable concurrently. `close` signals end-of-audio and
/// flushes; a final event may still arrive on the results receiver afterwards.
/// Hard teardown is dropping the adapter.
#[async_trait]
pub trait BackendAdapter: Send {
    /// Adapter name for logging
    fn name(&self) -> &str;

    /// Establish the connection and return the results direction.
    ///
    /// The receiver yields transcript events lazily until the backend closes
    /// the stream. The receiver ending without a final event is a recoverable
    /// condition, distinct from an explicit final event. Called again after a
    /// transport failure to obtain a fresh connection.
    async fn open(&mut self) -> Result<mpsc::Receiver<TranscriptEvent>, EngineError>;

    /// Ship one chunk of utterance audio.
    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), EngineError>;

    /// Signal that no more audio will arrive and flush buffered frames.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Creates one adapter per session; the supervisor holds one factory for the
/// lifetime of the process.
pub trait AdapterFactory: Send + Sync {
    /// Provider name for logging
    fn provider(&self) -> &str;

    /// Build a fresh adapter bound to `session_id`.
    fn create(&self, session_id: &str) -> Result<Box<dyn BackendAdapter>, EngineError>;
}

/// Config-driven factory for the built-in network adapters.
pub struct ProviderFactory {
    config: Config,
}

impl ProviderFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl AdapterFactory for ProviderFactory {
    fn provider(&self) -> &str {
        &self.config.engine.provider_name
    }

    fn create(&self, session_id: &str) -> Result<Box<dyn BackendAdapter>, EngineError> {
        match self.config.engine.provider_name.as_str() {
            "websocket" => Ok(Box::new(WebSocketAdapter::new(
                self.config.backend.websocket_url.clone(),
                self.config.backend.audio,
                self.config.engine.dial_timeout(),
            ))),
            "relay" => Ok(Box::new(NatsRelayAdapter::new(
                self.config.backend.nats_url.clone(),
                session_id.to_string(),
                self.config.engine.dial_timeout(),
            ))),
            other => Err(EngineError::Connection(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}
