use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{StartMessage, StopMessage, WireTranscript};
use super::BackendAdapter;
use crate::audio::{AudioChunk, AudioFormat};
use crate::error::EngineError;
use crate::transcript::TranscriptEvent;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Persistent-socket streaming adapter.
///
/// Dials a websocket endpoint, announces the audio format in a JSON start
/// frame, ships audio as binary frames and parses JSON transcript frames on a
/// reader task. Malformed backend events are logged and skipped so one bad
/// frame cannot sacrifice the utterance.
pub struct WebSocketAdapter {
    url: String,
    format: AudioFormat,
    dial_timeout: Duration,
    sink: Option<WsSink>,
    reader_task: Option<JoinHandle<()>>,
}

impl WebSocketAdapter {
    pub fn new(url: String, format: AudioFormat, dial_timeout: Duration) -> Self {
        Self {
            url,
            format,
            dial_timeout,
            sink: None,
            reader_task: None,
        }
    }
}

#[async_trait]
impl BackendAdapter for WebSocketAdapter {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TranscriptEvent>, EngineError> {
        // A reader from a previous connection is stale once we redial.
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.sink = None;

        info!("Connecting to ASR backend at {}", self.url);

        let (ws, _) = tokio::time::timeout(self.dial_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                EngineError::Timeout(format!(
                    "dial timeout after {}ms: {}",
                    self.dial_timeout.as_millis(),
                    self.url
                ))
            })?
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();

        let start = StartMessage::new(uuid::Uuid::new_v4().to_string(), &self.format);
        let payload = serde_json::to_string(&start)
            .map_err(|e| EngineError::BackendProtocol(e.to_string()))?;
        sink.send(Message::Text(payload))
            .await
            .map_err(|e| EngineError::Connection(format!("start frame rejected: {e}")))?;

        let (tx, rx) = mpsc::channel(64);

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(raw)) => match serde_json::from_str::<WireTranscript>(&raw) {
                        Ok(wire) => {
                            if tx.send(TranscriptEvent::from(wire)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("skipping malformed backend event: {e}");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("backend closed the websocket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("websocket read ended: {e}");
                        break;
                    }
                }
            }
        });

        self.sink = Some(sink);
        self.reader_task = Some(reader);

        info!("ASR websocket connected");

        Ok(rx)
    }

    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), EngineError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| EngineError::StreamClosed("websocket not open".to_string()))?;

        sink.send(Message::Binary(chunk.data.clone()))
            .await
            .map_err(|e| EngineError::StreamClosed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if let Some(sink) = self.sink.as_mut() {
            let payload = serde_json::to_string(&StopMessage::new())
                .map_err(|e| EngineError::BackendProtocol(e.to_string()))?;

            // End-of-audio; the reader stays up to collect the final event.
            sink.send(Message::Text(payload))
                .await
                .map_err(|e| EngineError::StreamClosed(e.to_string()))?;
            sink.flush()
                .await
                .map_err(|e| EngineError::StreamClosed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WebSocketAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
