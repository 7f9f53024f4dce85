use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::AdapterFactory;
use crate::audio::{AudioChunk, AudioFormat};
use crate::config::Config;
use crate::error::EngineError;
use crate::session::{SessionStats, StreamingSession};
use crate::transcript::{FinalizeResult, FinalizeStatus};

/// Small grace period on top of a cooperative finalize deadline, covering the
/// pump's last iteration before the supervisor force-closes.
const FINALIZE_GRACE: Duration = Duration::from_millis(500);

/// Downstream collaborator receiving finalized transcripts.
///
/// Called exactly once per session that received at least one audio chunk.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn on_transcript(&self, session_id: &str, transcript: &str, status: FinalizeStatus);
}

/// Map slot for one session id. The id is reserved as `Dialing` before the
/// adapter connect so duplicate creates are refused without holding the map
/// lock across the dial.
enum SessionSlot {
    Dialing,
    Active(Arc<StreamingSession>),
}

/// Sink that just logs, for the service binary and smoke runs.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn on_transcript(&self, session_id: &str, transcript: &str, status: FinalizeStatus) {
        info!(%session_id, ?status, %transcript, "transcript delivered");
    }
}

/// Owns the `session_id → StreamingSession` map: creation and teardown,
/// misuse errors, bounded finalize with force-close, and TTL garbage
/// collection for callers that never finalize.
///
/// Constructed once per process and passed by reference to all call sites;
/// there is no ambient singleton.
pub struct SessionSupervisor {
    config: Config,
    factory: Arc<dyn AdapterFactory>,
    sink: Arc<dyn ResultSink>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    gc_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionSupervisor {
    pub fn new(
        config: Config,
        factory: Arc<dyn AdapterFactory>,
        sink: Arc<dyn ResultSink>,
    ) -> Arc<Self> {
        info!(provider = factory.provider(), "session supervisor created");

        Arc::new(Self {
            config,
            factory,
            sink,
            sessions: Mutex::new(HashMap::new()),
            gc_handle: StdMutex::new(None),
        })
    }

    /// Start the TTL garbage-collection task. Holds only a weak reference so
    /// dropping the supervisor stops the task.
    pub fn start_gc(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.engine.gc_interval();
        let ttl = self.config.engine.session_ttl();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately

            loop {
                ticker.tick().await;
                let supervisor = match weak.upgrade() {
                    Some(s) => s,
                    None => break,
                };
                supervisor.collect_expired(ttl).await;
            }
        });

        *self.gc_handle.lock().unwrap() = Some(handle);
    }

    /// Open a session for one utterance. Fails with `DuplicateSession` if the
    /// id is already active or still dialing.
    ///
    /// The map lock is released during the adapter dial so pushes and
    /// finalizes for other sessions never queue behind a slow backend.
    pub async fn create_session(&self, session_id: &str) -> Result<(), EngineError> {
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(session_id) {
                return Err(EngineError::DuplicateSession(session_id.to_string()));
            }
            sessions.insert(session_id.to_string(), SessionSlot::Dialing);
        }

        let opened = match self.factory.create(session_id) {
            Ok(adapter) => {
                StreamingSession::open(session_id.to_string(), self.config.engine.clone(), adapter)
                    .await
            }
            Err(err) => Err(err),
        };

        let mut sessions = self.sessions.lock().await;
        match opened {
            Ok(session) => {
                if !matches!(sessions.get(session_id), Some(SessionSlot::Dialing)) {
                    // The reservation was torn down mid-dial (shutdown).
                    let _ = session.force_close();
                    return Err(EngineError::StreamClosed(format!(
                        "session {session_id} closed during dial"
                    )));
                }
                sessions.insert(session_id.to_string(), SessionSlot::Active(Arc::new(session)));
                info!(%session_id, "session created");
                Ok(())
            }
            Err(err) => {
                if matches!(sessions.get(session_id), Some(SessionSlot::Dialing)) {
                    sessions.remove(session_id);
                }
                Err(err)
            }
        }
    }

    /// Enqueue a caller-built chunk. Fails with `UnknownSession` if absent.
    pub async fn push_chunk(&self, session_id: &str, chunk: AudioChunk) -> Result<(), EngineError> {
        let session = self.get(session_id).await?;
        session.push_chunk(chunk)
    }

    /// Cooperatively drain and finalize, bounded by `timeout`. On timeout the
    /// pump is force-closed and the result reports TIMEOUT with the last
    /// partial; the call itself always returns within timeout plus a small
    /// grace period.
    pub async fn finalize_session(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> Result<FinalizeResult, EngineError> {
        // Claim the record first: a second finalize (or a racing GC pass)
        // sees UnknownSession, which keeps sink delivery exactly-once.
        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.remove(session_id) {
                Some(SessionSlot::Active(session)) => session,
                // Still dialing; leave the reservation in place.
                Some(slot) => {
                    sessions.insert(session_id.to_string(), slot);
                    return Err(EngineError::UnknownSession(session_id.to_string()));
                }
                None => return Err(EngineError::UnknownSession(session_id.to_string())),
            }
        };

        let result = match tokio::time::timeout(timeout, session.finalize()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%session_id, "finalize deadline expired, force-closing");
                session.force_close()
            }
        };

        if session.received_chunks() > 0 {
            self.sink
                .on_transcript(session_id, &result.transcript, result.status)
                .await;
        }

        info!(%session_id, status = ?result.status, "session finalized");
        Ok(result)
    }

    /// Shutdown path: force-close every session and deliver what is known.
    pub async fn force_close_all(&self) {
        let drained: Vec<(String, SessionSlot)> =
            self.sessions.lock().await.drain().collect();

        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "force-closing all sessions");

        for (session_id, slot) in drained {
            if let SessionSlot::Active(session) = slot {
                let result = session.force_close();
                if session.received_chunks() > 0 {
                    self.sink
                        .on_transcript(&session_id, &result.transcript, result.status)
                        .await;
                }
            }
        }
    }

    pub async fn session_stats(&self, session_id: &str) -> Result<SessionStats, EngineError> {
        Ok(self.get(session_id).await?.stats())
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    // --- VAD-facing facade ----------------------------------------------

    /// VAD detected the start of an utterance.
    pub async fn start_of_speech(&self, session_id: &str) -> Result<(), EngineError> {
        self.create_session(session_id).await
    }

    /// One chunk of utterance audio; content is never interpreted, only
    /// moved. The sequence number is assigned here.
    pub async fn audio_chunk(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        format: AudioFormat,
    ) -> Result<(), EngineError> {
        let session = self.get(session_id).await?;
        let chunk = AudioChunk::new(bytes, format, session.next_sequence());
        session.push_chunk(chunk)
    }

    /// VAD detected the end of the utterance: drain and finalize, bounded by
    /// the configured drain timeout plus grace.
    pub async fn end_of_speech(&self, session_id: &str) -> Result<FinalizeResult, EngineError> {
        self.finalize_session(
            session_id,
            self.config.engine.drain_timeout() + FINALIZE_GRACE,
        )
        .await
    }

    // ---------------------------------------------------------------------

    async fn get(&self, session_id: &str) -> Result<Arc<StreamingSession>, EngineError> {
        match self.sessions.lock().await.get(session_id) {
            Some(SessionSlot::Active(session)) => Ok(Arc::clone(session)),
            _ => Err(EngineError::UnknownSession(session_id.to_string())),
        }
    }

    /// Finalize sessions a caller left open past the absolute TTL.
    async fn collect_expired(&self, ttl: Duration) {
        let expired: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter_map(|(id, slot)| match slot {
                    SessionSlot::Active(session) if session.age() > ttl => Some(id.clone()),
                    _ => None,
                })
                .collect()
        };

        for session_id in expired {
            warn!(%session_id, "session exceeded ttl, garbage collecting");
            match self
                .finalize_session(
                    &session_id,
                    self.config.engine.drain_timeout() + FINALIZE_GRACE,
                )
                .await
            {
                Ok(result) => {
                    info!(%session_id, status = ?result.status, "expired session collected")
                }
                // Already finalized by a racing caller.
                Err(EngineError::UnknownSession(_)) => {}
                Err(err) => warn!(%session_id, "gc finalize failed: {err}"),
            }
        }
    }
}

impl Drop for SessionSupervisor {
    fn drop(&mut self) {
        if let Some(handle) = self.gc_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
