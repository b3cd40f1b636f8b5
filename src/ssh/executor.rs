//! Bounded-concurrency pool that drives a build across many hosts.
//!
//! Admission follows the teacher's `manager.rs` shape — one spawned task
//! per active connection — generalized from "one worker per cached
//! connection" to "one worker per admitted host, bounded by a
//! semaphore" instead of an LRU connection cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::host::HostId;
use crate::ssh::events::{EventSink, WorkerEvent};
use crate::ssh::transport::RusshTransport;
use crate::ssh::worker::{CancellationToken, WorkerLimits, run_worker};

/// Final outcome of one host's worker, collected by `wait()`.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub host: HostId,
    pub succeeded: bool,
    pub kind: Option<&'static str>,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
}

/// Admits up to `max_concurrent` hosts at a time, spawns one worker task
/// per admitted host, and forwards every event to `event_sink`.
pub struct ParallelExecutor {
    handles: Vec<JoinHandle<HostOutcome>>,
    cancel: CancellationToken,
}

impl ParallelExecutor {
    /// Begins execution for every host in `hosts`, returning immediately;
    /// progress is observed via `event_sink`. `max_concurrent` is
    /// clamped to at least 1.
    pub fn start(
        hosts: Vec<HostId>,
        tarball_path: PathBuf,
        max_concurrent: usize,
        connect_timeout: Duration,
        install_prefix: String,
        event_sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut handles = Vec::with_capacity(hosts.len());

        for host in hosts {
            let semaphore = Arc::clone(&semaphore);
            let sink = Arc::clone(&event_sink);
            let cancel = cancel.clone();
            let tarball_path = tarball_path.clone();
            let install_prefix = install_prefix.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return HostOutcome {
                            host,
                            succeeded: false,
                            kind: Some("internal"),
                            message: Some("admission semaphore closed".to_string()),
                            exit_code: None,
                        };
                    }
                };

                if cancel.is_cancelled() {
                    let event = WorkerEvent::Failed {
                        host: host.clone(),
                        kind: "cancelled",
                        message: "cancelled before admission".to_string(),
                        exit_code: None,
                    };
                    sink.send(event).await;
                    return HostOutcome {
                        host,
                        succeeded: false,
                        kind: Some("cancelled"),
                        message: None,
                        exit_code: None,
                    };
                }

                let (outcome_tx, mut outcome_rx) = tokio::sync::mpsc::channel(1);
                let relay_sink: Arc<dyn EventSink> =
                    Arc::new(OutcomeRelay { inner: Arc::clone(&sink), outcome_tx });

                let transport = RusshTransport::new(
                    host.user().to_string(),
                    host.hostname().to_string(),
                    22,
                    connect_timeout,
                );

                let limits = WorkerLimits { install_prefix, ..WorkerLimits::default() };
                run_worker(host.clone(), tarball_path, transport, limits, relay_sink, cancel).await;

                outcome_rx.recv().await.unwrap_or(HostOutcome {
                    host,
                    succeeded: false,
                    kind: Some("internal"),
                    message: Some("worker produced no terminal event".to_string()),
                    exit_code: None,
                })
            });
            handles.push(handle);
        }

        Self { handles, cancel }
    }

    /// Requests cooperative shutdown of every worker. Idempotent.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Blocks until every worker has reached a terminal event.
    pub async fn wait(self) -> Vec<HostOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(_) => {
                    // A worker task panicked; this shouldn't happen since
                    // run_worker never propagates an error, but is
                    // reported rather than silently dropped.
                    log::error!("a worker task panicked before producing an outcome");
                }
            }
        }
        outcomes
    }
}

/// Forwards every event to the real sink while also watching for the
/// terminal event, from which it derives the `HostOutcome` `wait()`
/// needs without duplicating the worker's own state tracking.
struct OutcomeRelay {
    inner: Arc<dyn EventSink>,
    outcome_tx: tokio::sync::mpsc::Sender<HostOutcome>,
}

#[async_trait::async_trait]
impl EventSink for OutcomeRelay {
    async fn send(&self, event: WorkerEvent) {
        if event.is_terminal() {
            let outcome = match &event {
                WorkerEvent::Completed { host } => HostOutcome {
                    host: host.clone(),
                    succeeded: true,
                    kind: None,
                    message: None,
                    exit_code: Some(0),
                },
                WorkerEvent::Failed { host, kind, message, exit_code } => HostOutcome {
                    host: host.clone(),
                    succeeded: false,
                    kind: Some(kind),
                    message: Some(message.clone()),
                    exit_code: *exit_code,
                },
                _ => unreachable!("is_terminal() only matches Completed/Failed"),
            };
            let _ = self.outcome_tx.send(outcome).await;
        }
        self.inner.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<WorkerEvent>>,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: WorkerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn cancel_before_admission_produces_cancelled_outcome() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = ParallelExecutor::start(
            vec![HostId::parse("u@a").unwrap()],
            PathBuf::from("t.tgz"),
            1,
            Duration::from_secs(1),
            "/usr/local".to_string(),
            sink.clone(),
            cancel,
        );
        let outcomes = executor.wait().await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].succeeded);
        assert_eq!(outcomes[0].kind, Some("cancelled"));
    }

    #[tokio::test]
    async fn max_concurrent_is_clamped_to_at_least_one() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = ParallelExecutor::start(
            vec![HostId::parse("u@a").unwrap(), HostId::parse("u@b").unwrap()],
            PathBuf::from("t.tgz"),
            0,
            Duration::from_secs(1),
            "/usr/local".to_string(),
            sink,
            cancel,
        );
        let outcomes = executor.wait().await;
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn cancel_all_is_idempotent() {
        let cancel = CancellationToken::new();
        let executor = ParallelExecutor { handles: Vec::new(), cancel };
        executor.cancel_all();
        executor.cancel_all();
        assert!(executor.cancel.is_cancelled());
    }
}
