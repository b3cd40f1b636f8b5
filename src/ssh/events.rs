//! Worker progress events and the sink they are delivered through.
//!
//! A single `EventSink` trait is the only seam between the executor and
//! its consumer (the application controller, or a test harness) —
//! "dynamic duck typing over output sinks" resolved as one small trait
//! instead of an observer registry.

use crate::host::HostId;
use crate::phase::BuildPhase;

/// One observation from a host's worker, always tagged with the host it
/// came from so a single channel can multiplex every in-flight build.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Connecting { host: HostId },
    Preparing { host: HostId },
    Line { host: HostId, line: String },
    PhaseChanged { host: HostId, phase: BuildPhase },
    Completed { host: HostId },
    Failed { host: HostId, kind: &'static str, message: String, exit_code: Option<i32> },
}

impl WorkerEvent {
    pub fn host(&self) -> &HostId {
        match self {
            WorkerEvent::Connecting { host }
            | WorkerEvent::Preparing { host }
            | WorkerEvent::Line { host, .. }
            | WorkerEvent::PhaseChanged { host, .. }
            | WorkerEvent::Completed { host }
            | WorkerEvent::Failed { host, .. } => host,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerEvent::Completed { .. } | WorkerEvent::Failed { .. })
    }
}

/// Destination for worker events. Implemented by the live
/// `tokio::sync::mpsc::Sender<WorkerEvent>` and by test mocks that
/// collect events in memory without any real SSH traffic.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: WorkerEvent);
}

#[async_trait::async_trait]
impl EventSink for tokio::sync::mpsc::Sender<WorkerEvent> {
    async fn send(&self, event: WorkerEvent) {
        // The channel is bounded; a full channel naturally backpressures
        // the worker rather than dropping output, per the executor's
        // backpressure contract. A closed receiver means the controller
        // has already shut down, so a dropped event here is harmless.
        let _ = tokio::sync::mpsc::Sender::send(self, event).await;
    }
}
