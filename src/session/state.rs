use serde::{Deserialize, Serialize};

/// Lifecycle of one utterance session.
///
/// `Idle → Streaming → Draining → Finalized`, with `Error` reachable from
/// `Streaming`/`Draining` on transport failure. `Error → Streaming` happens on
/// a successful reconnect; past the restart ceiling the session stays in
/// `Error` and keeps buffering chunks for diagnostics without delivering them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but not yet connected
    Idle,
    /// Adapter connected, pump running, accepting pushes
    Streaming,
    /// Finalize requested; flushing what is already queued
    Draining,
    /// Pump finished, result available
    Finalized,
    /// Transport down (reconnecting, or degraded past the ceiling)
    Error,
}
