use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::SessionState;
use super::stats::SessionStats;
use crate::adapter::BackendAdapter;
use crate::audio::{AudioChunk, AudioFrameQueue};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::transcript::{FinalizeResult, FinalizeStatus, TranscriptEvent};

/// Last-known transcript observations. Written only by the pump task.
#[derive(Default)]
struct TranscriptSnapshot {
    latest_partial: Option<TranscriptEvent>,
    final_event: Option<TranscriptEvent>,
}

/// State shared between the public session handle and its pump task.
///
/// The pump is the only writer of the snapshot, counters and result; the
/// public API enqueues chunks, raises the finalize flag and reads snapshots.
/// The queue is the sole object crossing the producer/consumer boundary.
struct SessionShared {
    session_id: String,
    queue: AudioFrameQueue,
    created_at: DateTime<Utc>,
    opened: Instant,
    finalize_requested: AtomicBool,
    wake: Notify,
    snapshot: Mutex<TranscriptSnapshot>,
    result: Mutex<Option<FinalizeResult>>,
    sequence: AtomicU64,
    chunks_received: AtomicU64,
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
    audio_micros: AtomicU64,
    restarts: AtomicU32,
}

impl SessionShared {
    fn final_seen(&self) -> bool {
        self.snapshot.lock().unwrap().final_event.is_some()
    }

    fn best_text(&self) -> String {
        let snap = self.snapshot.lock().unwrap();
        snap.final_event
            .as_ref()
            .or(snap.latest_partial.as_ref())
            .map(|ev| ev.text.clone())
            .unwrap_or_default()
    }
}

/// One utterance's streaming session: an audio queue, one adapter connection
/// and the pump task driving the state machine.
pub struct StreamingSession {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<SessionState>,
    pump_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    /// IDLE → STREAMING: dial the adapter and start the pump.
    pub async fn open(
        session_id: String,
        config: EngineConfig,
        mut adapter: Box<dyn BackendAdapter>,
    ) -> Result<Self, EngineError> {
        info!(%session_id, adapter = adapter.name(), "opening streaming session");

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let results = adapter.open().await?;

        let shared = Arc::new(SessionShared {
            session_id,
            queue: AudioFrameQueue::new(config.queue_high_water),
            created_at: Utc::now(),
            opened: Instant::now(),
            finalize_requested: AtomicBool::new(false),
            wake: Notify::new(),
            snapshot: Mutex::new(TranscriptSnapshot::default()),
            result: Mutex::new(None),
            sequence: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            audio_micros: AtomicU64::new(0),
            restarts: AtomicU32::new(0),
        });

        // Dial succeeded; the pump owns the state from here.
        let _ = state_tx.send(SessionState::Streaming);

        let pump = Pump {
            shared: Arc::clone(&shared),
            config,
            adapter,
            results,
            state_tx,
            restart_count: 0,
            drain_deadline: None,
            degraded: false,
            results_ended: false,
            audio_finished: false,
        };

        let handle = tokio::spawn(pump.run());

        Ok(Self {
            shared,
            state_rx,
            pump_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    /// Time since the session was opened, for TTL garbage collection.
    pub fn age(&self) -> std::time::Duration {
        self.shared.opened.elapsed()
    }

    /// Next monotonic sequence number for callers pushing raw bytes.
    pub fn next_sequence(&self) -> u64 {
        self.shared.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Chunks accepted so far; the sink only hears about sessions with audio.
    pub fn received_chunks(&self) -> u64 {
        self.shared.chunks_received.load(Ordering::Relaxed)
    }

    /// Enqueue a chunk without blocking.
    ///
    /// Accepted while STREAMING, and while ERROR so a degraded session keeps
    /// buffering for diagnostics. Rejected once finalize stopped new pushes.
    pub fn push_chunk(&self, chunk: AudioChunk) -> Result<(), EngineError> {
        match self.state() {
            SessionState::Streaming | SessionState::Error => {
                if let Some(duration) = chunk.duration() {
                    self.shared
                        .audio_micros
                        .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
                }
                self.shared.queue.push(chunk);
                self.shared.chunks_received.fetch_add(1, Ordering::Relaxed);
                self.shared.wake.notify_one();
                Ok(())
            }
            state => Err(EngineError::StreamClosed(format!(
                "session {} not accepting audio in state {:?}",
                self.shared.session_id, state
            ))),
        }
    }

    /// STREAMING → DRAINING: stop accepting pushes, flush what is queued and
    /// wait (bounded by the drain timeout) for a final event. Always returns
    /// a result; callers inspect `status`.
    pub async fn finalize(&self) -> FinalizeResult {
        self.shared.finalize_requested.store(true, Ordering::Release);
        self.shared.wake.notify_one();

        // `is_ok` drops the watch::Ref before the receiver goes away.
        let mut state_rx = self.state_rx.clone();
        let finalized = state_rx
            .wait_for(|state| *state == SessionState::Finalized)
            .await
            .is_ok();

        if finalized {
            self.shared
                .result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| {
                    FinalizeResult::new(self.shared.best_text(), FinalizeStatus::Error)
                })
        } else {
            // Pump task died without reporting; fall back to the snapshot.
            FinalizeResult::new(self.shared.best_text(), FinalizeStatus::Error)
        }
    }

    /// Abort the pump and report the best-known transcript with TIMEOUT.
    ///
    /// Used by the supervisor when the caller's finalize deadline expires and
    /// the adapter never closed cleanly.
    pub fn force_close(&self) -> FinalizeResult {
        if let Some(handle) = self.pump_handle.lock().unwrap().take() {
            handle.abort();
        }

        if let Some(result) = self.shared.result.lock().unwrap().clone() {
            return result;
        }

        warn!(
            session_id = %self.shared.session_id,
            "force-closing session, promoting last partial"
        );
        FinalizeResult::new(self.shared.best_text(), FinalizeStatus::Timeout)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.shared.session_id.clone(),
            state: self.state(),
            created_at: self.shared.created_at,
            chunks_received: self.shared.chunks_received.load(Ordering::Relaxed),
            chunks_sent: self.shared.chunks_sent.load(Ordering::Relaxed),
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
            audio_duration_ms: self.shared.audio_micros.load(Ordering::Relaxed) / 1000,
            chunks_queued: self.shared.queue.len(),
            restarts: self.shared.restarts.load(Ordering::Relaxed),
        }
    }
}

/// The single task allowed to touch the adapter and write session state.
struct Pump {
    shared: Arc<SessionShared>,
    config: EngineConfig,
    adapter: Box<dyn BackendAdapter>,
    results: mpsc::Receiver<TranscriptEvent>,
    state_tx: watch::Sender<SessionState>,
    restart_count: u32,
    drain_deadline: Option<Instant>,
    degraded: bool,
    results_ended: bool,
    audio_finished: bool,
}

enum FinalWait {
    Final,
    StreamEnded,
    DeadlineHit,
}

impl Pump {
    async fn run(mut self) {
        let result = self.pump_loop().await;

        info!(
            session_id = %self.shared.session_id,
            status = ?result.status,
            chunks_sent = self.shared.chunks_sent.load(Ordering::Relaxed),
            restarts = self.restart_count,
            "session pump finished"
        );

        *self.shared.result.lock().unwrap() = Some(result);
        let _ = self.state_tx.send(SessionState::Finalized);
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    async fn pump_loop(&mut self) -> FinalizeResult {
        loop {
            self.poll_events();

            // Finalize request promotes the session into DRAINING; the drain
            // deadline bounds everything that follows.
            if self.drain_deadline.is_none()
                && self.shared.finalize_requested.load(Ordering::Acquire)
            {
                self.drain_deadline = Some(Instant::now() + self.config.drain_timeout());
                if !self.degraded {
                    self.set_state(SessionState::Draining);
                }
                debug!(session_id = %self.shared.session_id, "draining");
            }

            if self.shared.final_seen()
                && self.drain_deadline.is_some()
                && self.shared.queue.is_empty()
            {
                return self.outcome(FinalizeStatus::Ok);
            }

            if self.degraded {
                // Past the restart ceiling: keep buffering for diagnostics,
                // stop attempting delivery, finalize as degraded.
                if self.drain_deadline.is_some() {
                    return self.outcome(FinalizeStatus::Degraded);
                }
                Self::idle_wait(Arc::clone(&self.shared), self.config.idle_poll_interval())
                    .await;
                continue;
            }

            // The backend declared the stream over while local audio may
            // still be arriving; reconnect rather than lose the utterance.
            if self.results_ended && !self.shared.final_seen() && self.drain_deadline.is_none() {
                warn!(
                    session_id = %self.shared.session_id,
                    "backend closed the results stream early"
                );
                if !self.restart().await {
                    self.degraded = true;
                }
                continue;
            }

            let mut batch: VecDeque<AudioChunk> =
                self.shared.queue.pop_batch(self.config.send_batch).into();

            if batch.is_empty() {
                match self.drain_deadline {
                    None => {
                        Self::idle_wait(
                            Arc::clone(&self.shared),
                            self.config.idle_poll_interval(),
                        )
                        .await
                    }
                    Some(deadline) => {
                        self.finish_audio(deadline).await;
                        match self.await_final(deadline).await {
                            FinalWait::Final => return self.outcome(FinalizeStatus::Ok),
                            FinalWait::StreamEnded => {
                                return self.outcome(FinalizeStatus::Degraded)
                            }
                            FinalWait::DeadlineHit => {
                                return self.outcome(FinalizeStatus::Timeout)
                            }
                        }
                    }
                }
                continue;
            }

            while let Some(chunk) = batch.pop_front() {
                match self.adapter.send(&chunk).await {
                    Ok(()) => {
                        self.shared.chunks_sent.fetch_add(1, Ordering::Relaxed);
                        self.shared
                            .bytes_sent
                            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(
                            session_id = %self.shared.session_id,
                            sequence = chunk.sequence,
                            "send failed: {err}"
                        );

                        // The failed chunk never left; audio that already
                        // went out is not replayed on the new connection.
                        batch.push_front(chunk);
                        self.shared.queue.requeue_front(batch.into());

                        if !self.restart().await {
                            self.degraded = true;
                        }
                        break;
                    }
                }
            }
        }
    }

    /// Signal end-of-audio to the adapter exactly once, bounded by the drain
    /// deadline even if the adapter never closes cleanly.
    async fn finish_audio(&mut self, deadline: Instant) {
        if self.audio_finished {
            return;
        }
        self.audio_finished = true;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, self.adapter.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(session_id = %self.shared.session_id, "adapter close failed: {err}");
            }
            Err(_) => {
                warn!(session_id = %self.shared.session_id, "adapter close timed out");
            }
        }
    }

    /// Wait for a final event until the drain deadline.
    async fn await_final(&mut self, deadline: Instant) -> FinalWait {
        loop {
            if self.shared.final_seen() {
                return FinalWait::Final;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return FinalWait::DeadlineHit;
            }

            match tokio::time::timeout(remaining, self.results.recv()).await {
                Err(_) => return FinalWait::DeadlineHit,
                // No final is coming; the best partial gets promoted.
                Ok(None) => return FinalWait::StreamEnded,
                Ok(Some(event)) => {
                    let is_final = event.is_final;
                    self.observe(event);
                    if is_final {
                        return FinalWait::Final;
                    }
                }
            }
        }
    }

    /// ERROR → STREAMING: reconnect with linear backoff, up to the ceiling.
    /// Returns false when delivery must be abandoned.
    async fn restart(&mut self) -> bool {
        self.set_state(SessionState::Error);

        loop {
            if self.restart_count >= self.config.max_restarts {
                warn!(
                    session_id = %self.shared.session_id,
                    max_restarts = self.config.max_restarts,
                    "restart ceiling reached, abandoning delivery"
                );
                return false;
            }

            if let Some(deadline) = self.drain_deadline {
                if Instant::now() >= deadline {
                    return false;
                }
            }

            self.restart_count += 1;
            self.shared
                .restarts
                .store(self.restart_count, Ordering::Relaxed);

            let backoff = self.config.restart_backoff() * self.restart_count;
            info!(
                session_id = %self.shared.session_id,
                attempt = self.restart_count,
                backoff_ms = backoff.as_millis() as u64,
                "reconnecting to backend"
            );
            tokio::time::sleep(backoff).await;

            match self.adapter.open().await {
                Ok(results) => {
                    self.results = results;
                    self.results_ended = false;
                    self.set_state(if self.drain_deadline.is_some() {
                        SessionState::Draining
                    } else {
                        SessionState::Streaming
                    });
                    info!(
                        session_id = %self.shared.session_id,
                        "reconnected, streaming newly buffered audio only"
                    );
                    return true;
                }
                Err(err) => {
                    warn!(
                        session_id = %self.shared.session_id,
                        attempt = self.restart_count,
                        "reconnect failed: {err}"
                    );
                }
            }
        }
    }

    /// Non-blocking poll of the results direction.
    fn poll_events(&mut self) {
        loop {
            match self.results.try_recv() {
                Ok(event) => self.observe(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.results_ended = true;
                    break;
                }
            }
        }
    }

    fn observe(&mut self, event: TranscriptEvent) {
        let mut snap = self.shared.snapshot.lock().unwrap();

        // A final event is terminal; anything after it is ignored.
        if snap.final_event.is_some() {
            debug!(
                session_id = %self.shared.session_id,
                "ignoring event after final"
            );
            return;
        }

        if event.is_final {
            info!(session_id = %self.shared.session_id, text = %event.text, "final transcript");
            snap.final_event = Some(event);
        } else {
            debug!(session_id = %self.shared.session_id, text = %event.text, "partial transcript");
            snap.latest_partial = Some(event);
        }
    }

    // Re-poll on a short interval; wake early when the producer pushes or
    // finalize is requested. Associated fn: a `&Pump` borrow held across the
    // await would require `Sync` from the boxed adapter.
    async fn idle_wait(shared: Arc<SessionShared>, interval: Duration) {
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    fn outcome(&self, status: FinalizeStatus) -> FinalizeResult {
        FinalizeResult::new(self.shared.best_text(), status)
    }
}
