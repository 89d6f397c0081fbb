//! Pipeline Status and Reporting
//!
//! Every run owns a fresh status machine. Transitions are fanned out to
//! passive reporters which can never affect control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Validating,
    CheckingCache,
    Collecting,
    Analyzing,
    Recommending,
    Completed,
    Failed(String),
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            PipelineStatus::Idle => 0,
            PipelineStatus::Validating => 1,
            PipelineStatus::CheckingCache => 2,
            PipelineStatus::Collecting => 3,
            PipelineStatus::Analyzing => 4,
            PipelineStatus::Recommending => 5,
            PipelineStatus::Completed | PipelineStatus::Failed(_) => 6,
        }
    }

    /// Happy-path moves go strictly forward; `Failed` is reachable from any
    /// non-terminal state; terminal states never move again.
    pub fn can_transition_to(&self, next: &PipelineStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            PipelineStatus::Idle => false,
            PipelineStatus::Failed(_) => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// Human-readable stage label
    pub fn label(&self) -> String {
        match self {
            PipelineStatus::Idle => "Idle".to_string(),
            PipelineStatus::Validating => "Validating input".to_string(),
            PipelineStatus::CheckingCache => "Checking for a cached recommendation".to_string(),
            PipelineStatus::Collecting => "Collecting rain volume and temperature history".to_string(),
            PipelineStatus::Analyzing => "Analyzing rain volume and temperature data".to_string(),
            PipelineStatus::Recommending => "Requesting the travel recommendation".to_string(),
            PipelineStatus::Completed => "Completed".to_string(),
            PipelineStatus::Failed(reason) => format!("Failed: {}", reason),
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// One published transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Passive sink for status transitions.
///
/// Implementations must not block and must swallow their own failures.
pub trait StatusReporter: Send + Sync {
    fn on_transition(&self, event: &StatusEvent);
}

/// Broadcasts events to every live subscriber
pub struct BroadcastReporter {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastReporter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl StatusReporter for BroadcastReporter {
    fn on_transition(&self, event: &StatusEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
    }
}

/// Logs every transition
#[derive(Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn on_transition(&self, event: &StatusEvent) {
        match &event.status {
            PipelineStatus::Failed(reason) => {
                warn!(run_id = %event.run_id, reason = %reason, "{}", event.message)
            }
            status => info!(run_id = %event.run_id, status = ?status, "{}", event.message),
        }
    }
}

/// Forwards events into a bounded channel, dropping them when it is full
pub struct ChannelReporter {
    tx: mpsc::Sender<StatusEvent>,
}

impl ChannelReporter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelReporter {
    fn on_transition(&self, event: &StatusEvent) {
        let _ = self.tx.try_send(event.clone());
    }
}

/// Status machine for a single run
pub(crate) struct RunStatus {
    run_id: Uuid,
    current: PipelineStatus,
    reporters: Arc<Vec<Arc<dyn StatusReporter>>>,
    watch: Arc<tokio::sync::watch::Sender<PipelineStatus>>,
}

impl RunStatus {
    pub(crate) fn start(
        reporters: Arc<Vec<Arc<dyn StatusReporter>>>,
        watch: Arc<tokio::sync::watch::Sender<PipelineStatus>>,
    ) -> Self {
        watch.send_replace(PipelineStatus::Idle);
        Self {
            run_id: Uuid::new_v4(),
            current: PipelineStatus::Idle,
            reporters,
            watch,
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn current(&self) -> &PipelineStatus {
        &self.current
    }

    /// Moves to `next` and notifies reporters. Illegal moves are ignored.
    pub(crate) fn advance(&mut self, next: PipelineStatus, message: impl Into<String>) {
        if !self.current.can_transition_to(&next) {
            warn!(run_id = %self.run_id, from = ?self.current, to = ?next, "Ignoring illegal status transition");
            return;
        }
        self.current = next.clone();
        self.watch.send_replace(next.clone());

        let event = StatusEvent {
            run_id: self.run_id,
            status: next,
            message: message.into(),
            at: Utc::now(),
        };
        for reporter in self.reporters.iter() {
            reporter.on_transition(&event);
        }
    }

    pub(crate) fn fail(&mut self, reason: &str, message: impl Into<String>) {
        self.advance(PipelineStatus::Failed(reason.to_string()), message);
    }
}

impl Drop for RunStatus {
    /// A run whose future is dropped mid-stage still ends in a terminal state.
    fn drop(&mut self) {
        if !self.current.is_terminal() {
            let message = format!("Run abandoned while {}", self.current.label().to_lowercase());
            self.fail("cancelled", message);
        }
    }
}
