use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{AdapterFactory, BackendAdapter};
use crate::audio::{AudioChunk, AudioFormat};
use crate::error::EngineError;
use crate::transcript::TranscriptEvent;

/// A recognizer with a blocking, whole-utterance native call.
///
/// Runs on a dedicated blocking worker, never on the scheduler that serves
/// other sessions.
pub trait BlockingTranscriber: Send + Sync {
    fn transcribe(&self, audio: &[u8], format: &AudioFormat) -> Result<String, EngineError>;
}

/// Buffer-whole-utterance adapter for backends with no incremental API.
///
/// `send` only accumulates bytes; `close` hands the assembled utterance to
/// the blocking recognizer via `spawn_blocking` and emits a single terminal
/// final event on the results channel.
pub struct OneShotAdapter {
    transcriber: Arc<dyn BlockingTranscriber>,
    buffer: Vec<u8>,
    format: Option<AudioFormat>,
    events_tx: Option<mpsc::Sender<TranscriptEvent>>,
}

impl OneShotAdapter {
    pub fn new(transcriber: Arc<dyn BlockingTranscriber>) -> Self {
        Self {
            transcriber,
            buffer: Vec::new(),
            format: None,
            events_tx: None,
        }
    }
}

#[async_trait]
impl BackendAdapter for OneShotAdapter {
    fn name(&self) -> &str {
        "oneshot"
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TranscriptEvent>, EngineError> {
        // Results carry exactly one terminal event, produced at close.
        let (tx, rx) = mpsc::channel(4);
        self.events_tx = Some(tx);
        self.buffer.clear();
        Ok(rx)
    }

    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), EngineError> {
        if self.events_tx.is_none() {
            return Err(EngineError::StreamClosed("adapter not open".to_string()));
        }
        if self.format.is_none() {
            self.format = Some(chunk.format);
        }
        self.buffer.extend_from_slice(&chunk.data);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        let tx = match self.events_tx.take() {
            Some(tx) => tx,
            None => return Ok(()),
        };

        let audio = std::mem::take(&mut self.buffer);
        if audio.is_empty() {
            debug!("one-shot close with no buffered audio");
            return Ok(());
        }

        let format = self.format.unwrap_or_default();
        let transcriber = Arc::clone(&self.transcriber);

        info!(bytes = audio.len(), "running one-shot recognition");

        let text = tokio::task::spawn_blocking(move || transcriber.transcribe(&audio, &format))
            .await
            .map_err(|e| EngineError::BackendProtocol(format!("recognizer worker died: {e}")))??;

        let _ = tx.send(TranscriptEvent::final_result(text)).await;
        Ok(())
    }
}

/// Factory for embedders that supply their own blocking recognizer.
pub struct OneShotFactory {
    transcriber: Arc<dyn BlockingTranscriber>,
}

impl OneShotFactory {
    pub fn new(transcriber: Arc<dyn BlockingTranscriber>) -> Self {
        Self { transcriber }
    }
}

impl AdapterFactory for OneShotFactory {
    fn provider(&self) -> &str {
        "oneshot"
    }

    fn create(&self, _session_id: &str) -> Result<Box<dyn BackendAdapter>, EngineError> {
        Ok(Box::new(OneShotAdapter::new(Arc::clone(&self.transcriber))))
    }
}
