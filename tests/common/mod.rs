#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vox_stream::{
    AdapterFactory, AudioChunk, AudioFormat, BackendAdapter, EngineConfig, EngineError,
    FinalizeStatus, ResultSink, TranscriptEvent,
};

/// What the scripted backend should do for a test.
#[derive(Default)]
pub struct MockScript {
    /// How long every `open` takes before the connection is up
    pub dial_delay: Duration,
    /// (delay, event) pairs emitted after every successful open
    pub events_after_open: Vec<(Duration, TranscriptEvent)>,
    /// Final event emitted when `close` (end-of-audio) is called
    pub final_on_close: Option<TranscriptEvent>,
    /// Zero-based send indices (across the adapter's lifetime) that fail
    pub fail_sends_at: Vec<usize>,
    /// Every send fails with StreamClosed
    pub fail_all_sends: bool,
    /// `close` hangs well past any drain deadline
    pub hang_on_close: bool,
    /// Drop the results channel once the scripted events are emitted,
    /// simulating a backend that declares the stream over
    pub end_results_after_open: bool,
}

/// Observations shared between the mock and the test for assertions.
#[derive(Default)]
pub struct MockLog {
    /// (connection number, chunk sequence) per successful send
    pub sent: Mutex<Vec<(usize, u64)>>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockLog {
    pub fn sent_sequences(&self) -> Vec<u64> {
        self.sent.lock().unwrap().iter().map(|(_, seq)| *seq).collect()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

pub struct MockAdapter {
    script: Arc<MockScript>,
    log: Arc<MockLog>,
    send_index: usize,
    events_tx: Option<mpsc::Sender<TranscriptEvent>>,
    emit_task: Option<JoinHandle<()>>,
}

impl MockAdapter {
    pub fn new(script: Arc<MockScript>, log: Arc<MockLog>) -> Self {
        Self {
            script,
            log,
            send_index: 0,
            events_tx: None,
            emit_task: None,
        }
    }
}

#[async_trait]
impl BackendAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<TranscriptEvent>, EngineError> {
        if let Some(task) = self.emit_task.take() {
            task.abort();
        }

        if !self.script.dial_delay.is_zero() {
            tokio::time::sleep(self.script.dial_delay).await;
        }

        self.log.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);

        let events: Vec<(Duration, TranscriptEvent)> = self.script.events_after_open.clone();
        let emit_tx = tx.clone();
        self.emit_task = Some(tokio::spawn(async move {
            for (delay, event) in events {
                tokio::time::sleep(delay).await;
                if emit_tx.send(event).await.is_err() {
                    return;
                }
            }
        }));

        // Keeping a sender here keeps the results direction open after the
        // scripted events; dropping it lets the stream end.
        self.events_tx = if self.script.end_results_after_open {
            None
        } else {
            Some(tx)
        };

        Ok(rx)
    }

    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), EngineError> {
        let index = self.send_index;
        self.send_index += 1;

        if self.script.fail_all_sends || self.script.fail_sends_at.contains(&index) {
            return Err(EngineError::StreamClosed("scripted send failure".to_string()));
        }

        let connection = self.log.opens.load(Ordering::SeqCst);
        self.log.sent.lock().unwrap().push((connection, chunk.sequence));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);

        if self.script.hang_on_close {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        if let (Some(tx), Some(event)) = (self.events_tx.as_ref(), self.script.final_on_close.clone())
        {
            let _ = tx.send(event).await;
        }

        Ok(())
    }
}

pub struct MockFactory {
    pub script: Arc<MockScript>,
    pub log: Arc<MockLog>,
}

impl MockFactory {
    pub fn new(script: MockScript) -> (Self, Arc<MockLog>) {
        let log = Arc::new(MockLog::default());
        (
            Self {
                script: Arc::new(script),
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl AdapterFactory for MockFactory {
    fn provider(&self) -> &str {
        "mock"
    }

    fn create(&self, _session_id: &str) -> Result<Box<dyn BackendAdapter>, EngineError> {
        Ok(Box::new(MockAdapter::new(
            Arc::clone(&self.script),
            Arc::clone(&self.log),
        )))
    }
}

/// Sink that records every delivery for exactly-once assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub calls: Mutex<Vec<(String, String, FinalizeStatus)>>,
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn on_transcript(&self, session_id: &str, transcript: &str, status: FinalizeStatus) {
        self.calls.lock().unwrap().push((
            session_id.to_string(),
            transcript.to_string(),
            status,
        ));
    }
}

/// Engine knobs tightened for fast deterministic tests.
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        drain_timeout_ms: 500,
        idle_poll_interval_ms: 5,
        restart_backoff_ms: 20,
        max_restarts: 3,
        ..Default::default()
    }
}

pub fn chunk(sequence: u64, bytes: usize) -> AudioChunk {
    AudioChunk::new(vec![0u8; bytes], AudioFormat::default(), sequence)
}

pub fn partial_after(ms: u64, text: &str) -> (Duration, TranscriptEvent) {
    (Duration::from_millis(ms), TranscriptEvent::partial(text))
}

pub fn final_after(ms: u64, text: &str) -> (Duration, TranscriptEvent) {
    (Duration::from_millis(ms), TranscriptEvent::final_result(text))
}
