//! Per-host worker: connects over SSH, uploads the tarball and build
//! agent, runs the agent, and pumps its combined output back through an
//! [`EventSink`].
//!
//! The SSH specifics live behind the [`AgentTransport`] trait so the
//! state machine itself — connecting, preparing, pumping, cleanup,
//! cancellation — can be exercised in tests without a real network or
//! `sshd`, the same "duck typing over output sinks" idea applied to the
//! input side.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::ForgeError;
use crate::host::HostId;
use crate::phase::{DEFAULT_INSTALL_PREFIX, PhaseDetector};
use crate::ssh::events::{EventSink, WorkerEvent};

/// Hand-rolled cooperative cancellation flag. `tokio_util`'s
/// `CancellationToken` isn't in the dependency set this crate carries
/// forward, so this is the small primitive that plays its role:
/// an `AtomicBool` for the flag and a `Notify` so waiters don't poll.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<std::sync::atomic::AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Idempotent: cancelling twice has the same effect as once.
    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One line read from the agent's combined stdout+stderr stream, or the
/// final exit status once the stream has closed.
pub enum AgentOutput {
    Line(String),
    Exit(i32),
}

/// The SSH-shaped operations a worker needs, abstracted so tests can
/// substitute a scripted fake agent instead of a real connection.
#[async_trait::async_trait]
pub trait AgentTransport: Send {
    /// Opens the SSH transport. One retry with a 2s backoff on a
    /// transient failure is the transport's responsibility.
    async fn connect(&mut self) -> Result<(), ForgeError>;

    /// Creates the remote working directory and uploads the tarball and
    /// agent script into it via SFTP.
    async fn prepare(&mut self, tarball_path: &std::path::Path) -> Result<(), ForgeError>;

    /// Invokes the agent and returns the next item from its combined
    /// output stream, or the exit status once the stream is closed.
    /// Returns `Ok(None)` when the stream has nothing more to offer
    /// after the exit status has already been delivered.
    async fn next_output(&mut self) -> Result<Option<AgentOutput>, ForgeError>;

    /// Best-effort removal of the remote working directory. Failures are
    /// logged, never propagated.
    async fn cleanup(&mut self);
}

/// Tunables for a single worker run.
#[derive(Debug, Clone)]
pub struct WorkerLimits {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub exec_timeout: Duration,
    pub cleanup_timeout: Duration,
    /// Forwarded to the host's [`PhaseDetector`] to recognize Install-phase
    /// lines that name a path instead of saying "make install" outright.
    pub install_prefix: String,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            exec_timeout: Duration::from_secs(2 * 60 * 60),
            cleanup_timeout: Duration::from_secs(5),
            install_prefix: DEFAULT_INSTALL_PREFIX.to_string(),
        }
    }
}

/// Runs the full worker protocol for one host: connect, prepare, pump
/// output, observe exit status, cleanup. Every outcome (success, any
/// failure kind, or cancellation) ends in exactly one terminal event on
/// `sink`, never a propagated error.
pub async fn run_worker(
    host: HostId,
    tarball_path: std::path::PathBuf,
    mut transport: impl AgentTransport,
    limits: WorkerLimits,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    let outcome = timeout(limits.exec_timeout, drive_worker(&host, &tarball_path, &mut transport, &limits, sink.as_ref(), &cancel)).await;

    let terminal_event = match outcome {
        Ok(Ok(())) => None, // drive_worker already emitted the terminal event.
        Ok(Err(event)) => Some(event),
        Err(_) => Some(WorkerEvent::Failed {
            host: host.clone(),
            kind: "execute",
            message: "build exceeded the overall time ceiling".to_string(),
            exit_code: None,
        }),
    };

    if let Some(event) = terminal_event {
        sink.send(event).await;
    }

    let cleanup = timeout(limits.cleanup_timeout, transport.cleanup());
    let _ = cleanup.await;
}

/// Drives one host through the full protocol. On success the terminal
/// event has already been sent; on failure the caller sends the
/// returned event (this indirection lets the outer `timeout` in
/// `run_worker` substitute its own `Failed(execute)` event instead).
async fn drive_worker(
    host: &HostId,
    tarball_path: &std::path::Path,
    transport: &mut impl AgentTransport,
    limits: &WorkerLimits,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<(), WorkerEvent> {
    sink.send(WorkerEvent::Connecting { host: host.clone() }).await;
    if cancel.is_cancelled() {
        return Err(cancelled(host));
    }

    connect_with_retry(transport, limits.connect_timeout, host).await?;

    sink.send(WorkerEvent::Preparing { host: host.clone() }).await;
    if cancel.is_cancelled() {
        return Err(cancelled(host));
    }
    transport.prepare(tarball_path).await.map_err(|err| failed(host, "transfer", err))?;

    let mut detector = PhaseDetector::with_install_prefix(limits.install_prefix.clone());
    let mut trailing: Vec<String> = Vec::new();
    const TRAILING_KEEP: usize = 20;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(host));
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(host)),
            next = timeout(limits.idle_timeout, transport.next_output()) => next,
        };

        let item = match next {
            Ok(Ok(Some(item))) => item,
            Ok(Ok(None)) => break,
            Ok(Err(err)) => return Err(failed(host, "execute", err)),
            Err(_) => {
                return Err(WorkerEvent::Failed {
                    host: host.clone(),
                    kind: "stalled",
                    message: "no output for longer than the idle timeout".to_string(),
                    exit_code: None,
                });
            }
        };

        match item {
            AgentOutput::Line(line) => {
                trailing.push(line.clone());
                if trailing.len() > TRAILING_KEEP {
                    trailing.remove(0);
                }
                if let Some(phase) = detector.feed(&line) {
                    sink.send(WorkerEvent::PhaseChanged { host: host.clone(), phase }).await;
                }
                sink.send(WorkerEvent::Line { host: host.clone(), line }).await;
            }
            AgentOutput::Exit(status) => {
                if status == 0 {
                    sink.send(WorkerEvent::Completed { host: host.clone() }).await;
                } else {
                    sink.send(WorkerEvent::Failed {
                        host: host.clone(),
                        kind: "execute",
                        message: trailing.join("\n"),
                        exit_code: Some(status),
                    })
                    .await;
                }
                return Ok(());
            }
        }
    }

    // Stream closed without an explicit exit status: treat as a failure
    // so no host silently stays non-terminal.
    Err(WorkerEvent::Failed {
        host: host.clone(),
        kind: "execute",
        message: trailing.join("\n"),
        exit_code: None,
    })
}

async fn connect_with_retry(
    transport: &mut impl AgentTransport,
    connect_timeout: Duration,
    host: &HostId,
) -> Result<(), WorkerEvent> {
    match timeout(connect_timeout, transport.connect()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(_)) | Err(_) => {}
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    timeout(connect_timeout, transport.connect())
        .await
        .map_err(|_| WorkerEvent::Failed {
            host: host.clone(),
            kind: "connect",
            message: "connection timed out".to_string(),
            exit_code: None,
        })?
        .map_err(|err| failed(host, "connect", err))
}

fn failed(host: &HostId, kind: &'static str, err: ForgeError) -> WorkerEvent {
    WorkerEvent::Failed { host: host.clone(), kind, message: err.to_string(), exit_code: None }
}

fn cancelled(host: &HostId) -> WorkerEvent {
    WorkerEvent::Failed {
        host: host.clone(),
        kind: "cancelled",
        message: "cancelled by user".to_string(),
        exit_code: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// A scripted fake agent transport: connects immediately, "uploads"
    /// instantly, and yields a predetermined sequence of output lines
    /// followed by an exit status.
    struct FakeTransport {
        script: VecDeque<AgentOutput>,
        connect_fails_first: bool,
        connect_attempts: Mutex<u32>,
        sleep_before_each_line: Option<Duration>,
    }

    impl FakeTransport {
        fn new(lines: Vec<&str>, exit_status: i32) -> Self {
            let mut script: VecDeque<AgentOutput> =
                lines.into_iter().map(|l| AgentOutput::Line(l.to_string())).collect();
            script.push_back(AgentOutput::Exit(exit_status));
            Self {
                script,
                connect_fails_first: false,
                connect_attempts: Mutex::new(0),
                sleep_before_each_line: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl AgentTransport for FakeTransport {
        async fn connect(&mut self) -> Result<(), ForgeError> {
            let mut attempts = self.connect_attempts.lock().unwrap();
            *attempts += 1;
            if self.connect_fails_first && *attempts == 1 {
                return Err(ForgeError::Connect("refused".to_string()));
            }
            Ok(())
        }

        async fn prepare(&mut self, _tarball_path: &std::path::Path) -> Result<(), ForgeError> {
            Ok(())
        }

        async fn next_output(&mut self) -> Result<Option<AgentOutput>, ForgeError> {
            if let Some(delay) = self.sleep_before_each_line {
                tokio::time::sleep(delay).await;
            }
            Ok(self.script.pop_front())
        }

        async fn cleanup(&mut self) {}
    }

    #[tokio::test]
    async fn happy_path_emits_completed() {
        let (tx, mut rx) = mpsc::channel(32);
        let host = HostId::parse("u@a").unwrap();
        let transport = FakeTransport::new(vec!["configure: checking for gcc", "BUILD OK"], 0);
        run_worker(
            host.clone(),
            std::path::PathBuf::from("t.tgz"),
            transport,
            WorkerLimits::default(),
            Arc::new(tx),
            CancellationToken::new(),
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.last(), Some(WorkerEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn nonzero_exit_emits_failed_execute() {
        let (tx, mut rx) = mpsc::channel(32);
        let host = HostId::parse("u@a").unwrap();
        let transport = FakeTransport::new(vec!["make[1]: Entering directory", "BUILD FAILED"], 1);
        run_worker(
            host,
            std::path::PathBuf::from("t.tgz"),
            transport,
            WorkerLimits::default(),
            Arc::new(tx),
            CancellationToken::new(),
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        match events.last() {
            Some(WorkerEvent::Failed { kind, exit_code, .. }) => {
                assert_eq!(*kind, "execute");
                assert_eq!(*exit_code, Some(1));
            }
            other => panic!("expected a failed(execute) event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn install_prefix_line_fires_phase_changed_without_the_word_install() {
        let (tx, mut rx) = mpsc::channel(32);
        let host = HostId::parse("u@a").unwrap();
        let transport = FakeTransport::new(
            vec!["make[1]: Entering directory", "/opt/build/lib/libfoo.so -> libfoo.so.1", "BUILD OK"],
            0,
        );
        let mut limits = WorkerLimits::default();
        limits.install_prefix = "/opt/build".to_string();
        run_worker(host.clone(), std::path::PathBuf::from("t.tgz"), transport, limits, Arc::new(tx), CancellationToken::new())
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().any(|e| matches!(e, WorkerEvent::PhaseChanged { phase, .. } if *phase == crate::phase::BuildPhase::Install)));
    }

    #[tokio::test]
    async fn connect_retries_once_on_transient_failure() {
        let (tx, mut rx) = mpsc::channel(32);
        let host = HostId::parse("u@a").unwrap();
        let mut transport = FakeTransport::new(vec!["BUILD OK"], 0);
        transport.connect_fails_first = true;
        run_worker(
            host,
            std::path::PathBuf::from("t.tgz"),
            transport,
            WorkerLimits::default(),
            Arc::new(tx),
            CancellationToken::new(),
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.last(), Some(WorkerEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn cancellation_yields_failed_cancelled() {
        let (tx, mut rx) = mpsc::channel(32);
        let host = HostId::parse("u@a").unwrap();
        let mut transport = FakeTransport::new(vec!["make[1]: Entering directory"], 0);
        transport.sleep_before_each_line = Some(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        run_worker(
            host,
            std::path::PathBuf::from("t.tgz"),
            transport,
            WorkerLimits::default(),
            Arc::new(tx),
            cancel,
        )
        .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        match events.last() {
            Some(WorkerEvent::Failed { kind, .. }) => assert_eq!(*kind, "cancelled"),
            other => panic!("expected a failed(cancelled) event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn double_cancellation_is_a_no_op() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }
}
