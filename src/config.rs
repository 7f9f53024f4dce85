use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioFormat;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Knobs for the session engine itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Which adapter variant to use ("websocket", "relay")
    pub provider_name: String,

    /// Bound on opening an adapter connection
    pub dial_timeout_ms: u64,

    /// Bound on waiting for a final event after the queue is drained
    pub drain_timeout_ms: u64,

    /// Automatic reconnects allowed while chunks are still arriving
    pub max_restarts: u32,

    /// Pump idle-wait between polls when the queue is empty
    pub idle_poll_interval_ms: u64,

    /// Base delay between reconnect attempts (scaled linearly per attempt)
    pub restart_backoff_ms: u64,

    /// Max chunks drained from the queue per pump iteration
    pub send_batch: usize,

    /// Queue depth that triggers the backend-falling-behind warning
    pub queue_high_water: usize,

    /// Absolute lifetime for sessions whose caller never finalizes
    pub session_ttl_secs: u64,

    /// How often the supervisor scans for expired sessions
    pub gc_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_name: "websocket".to_string(),
            dial_timeout_ms: 3000,
            drain_timeout_ms: 2000,
            max_restarts: 3,
            idle_poll_interval_ms: 20,
            restart_backoff_ms: 200,
            send_batch: 8,
            queue_high_water: 512,
            session_ttl_secs: 120,
            gc_interval_secs: 15,
        }
    }
}

impl EngineConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

/// Backend endpoints and the audio format advertised to them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// WebSocket endpoint for the persistent-socket adapter
    pub websocket_url: String,

    /// NATS server URL for the relay adapter
    pub nats_url: String,

    /// Format the backend is told to expect
    pub audio: AudioFormat,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            websocket_url: "ws://localhost:8765/asr".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            audio: AudioFormat::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
