use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{AudioFrameMessage, TranscriptMessage};
use super::BackendAdapter;
use crate::audio::AudioChunk;
use crate::error::EngineError;
use crate::transcript::TranscriptEvent;

/// Bidirectional message-streaming adapter over NATS subjects.
///
/// Audio frames go out on `asr.audio.<session>`, transcript events come back
/// on `asr.text.<session>`. The two directions are independent subjects, so
/// send and results are fully concurrent.
pub struct NatsRelayAdapter {
    url: String,
    session_id: String,
    dial_timeout: Duration,
    client: Option<async_nats::Client>,
    reader_task: Option<JoinHandle<()>>,
}

impl NatsRelayAdapter {
    pub fn new(url: String, session_id: String, dial_timeout: Duration) -> Self {
        Self {
            url,
            session_id,
            dial_timeout,
            client: None,
            reader_task: None,
        }
    }

    fn audio_subject(&self) -> String {
        format!("asr.audio.{}", self.session_id)
    }

    fn text_subject(&self) -> String {
        format!("asr.text.{}", self.session_id)
    }
}

#[async_trait]
impl BackendAdapter for NatsRelayAdapter {
    fn name(&self) -> &str {
        "relay"
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TranscriptEvent>, EngineError> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        info!("Connecting to NATS at {}", self.url);

        let client = tokio::time::timeout(self.dial_timeout, async_nats::connect(&self.url))
            .await
            .map_err(|_| {
                EngineError::Timeout(format!(
                    "dial timeout after {}ms: {}",
                    self.dial_timeout.as_millis(),
                    self.url
                ))
            })?
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let mut subscriber = client
            .subscribe(self.text_subject())
            .await
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let session_id = self.session_id.clone();

        let reader = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => {
                        if transcript.session_id != session_id {
                            continue;
                        }
                        if tx.send(TranscriptEvent::from(transcript)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("skipping malformed transcript message: {e}");
                    }
                }
            }
            debug!("transcript subscription ended");
        });

        self.client = Some(client);
        self.reader_task = Some(reader);

        info!("Relay connected, subscribed to asr.text.{}", self.session_id);

        Ok(rx)
    }

    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), EngineError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| EngineError::StreamClosed("relay not open".to_string()))?;

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence: chunk.sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(&chunk.data),
            sample_rate: chunk.format.sample_rate,
            channels: chunk.format.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: false,
        };

        let payload =
            serde_json::to_vec(&message).map_err(|e| EngineError::BackendProtocol(e.to_string()))?;

        client
            .publish(self.audio_subject(), payload.into())
            .await
            .map_err(|e| EngineError::StreamClosed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if let Some(client) = self.client.as_ref() {
            // Empty final frame tells the recognizer no more audio is coming.
            let message = AudioFrameMessage {
                session_id: self.session_id.clone(),
                sequence: 0,
                pcm: String::new(),
                sample_rate: 0,
                channels: 0,
                timestamp: chrono::Utc::now().to_rfc3339(),
                final_frame: true,
            };

            let payload = serde_json::to_vec(&message)
                .map_err(|e| EngineError::BackendProtocol(e.to_string()))?;

            client
                .publish(self.audio_subject(), payload.into())
                .await
                .map_err(|e| EngineError::StreamClosed(e.to_string()))?;

            client
                .flush()
                .await
                .map_err(|e| EngineError::StreamClosed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for NatsRelayAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
