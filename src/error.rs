//! Error types and severities for build orchestration.
//!
//! This module defines every error that can occur while parsing
//! configuration, connecting to hosts, transferring files, running the
//! build agent, rendering the terminal UI, and persisting the timing
//! cache.

use thiserror::Error;

/// Errors that can occur anywhere in a redland-forge run.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Bad CLI arguments or host-file contents.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `user@host` entry could not be parsed.
    #[error("could not resolve host entry: {0}")]
    Resolve(String),

    /// SSH authentication or network failure.
    #[error("connect failed: {0}")]
    Connect(String),

    /// SFTP upload/remote-directory failure.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The build agent exited with a nonzero status.
    #[error("build agent exited with status {status}: {trailing}")]
    Execute { status: i32, trailing: String },

    /// No output was observed on the agent stream for longer than the idle
    /// timeout.
    #[error("build stalled: no output for more than the idle timeout")]
    Stalled,

    /// The operation was aborted by a cancellation request.
    #[error("cancelled")]
    Cancelled,

    /// Terminal I/O failure.
    #[error("render error: {0}")]
    Render(String),

    /// Timing cache could not be loaded or saved.
    #[error("cache I/O error: {0}")]
    CacheIo(String),

    /// An error in this crate's own bookkeeping, not an external failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// An error from the russh transport.
    #[error("ssh transport error: {0}")]
    Russh(#[from] russh::Error),

    /// An error from the async-ssh2-tokio client.
    #[error("ssh client error: {0}")]
    Ssh2(#[from] async_ssh2_tokio::Error),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How severely an error should be treated by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the entire run.
    Critical,
    /// Fail the affected host; other hosts continue.
    High,
    /// Warn and degrade a feature (e.g. disable the cache for this run).
    Medium,
    /// Log only.
    Low,
}

impl ForgeError {
    /// Returns the error kind name (matching the kinds enumerated in
    /// SPEC_FULL §7: "config", "resolve", "connect", ...).
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Config(_) => "config",
            ForgeError::Resolve(_) => "resolve",
            ForgeError::Connect(_) => "connect",
            ForgeError::Transfer(_) => "transfer",
            ForgeError::Execute { .. } => "execute",
            ForgeError::Stalled => "stalled",
            ForgeError::Cancelled => "cancelled",
            ForgeError::Render(_) => "render",
            ForgeError::CacheIo(_) => "cache_io",
            ForgeError::Internal(_) => "internal",
            ForgeError::Russh(_) => "connect",
            ForgeError::Ssh2(_) => "connect",
            ForgeError::Io(_) => "internal",
        }
    }

    /// Returns the severity this error should be treated with.
    pub fn severity(&self) -> Severity {
        match self {
            ForgeError::Config(_) => Severity::Critical,
            ForgeError::Resolve(_) => Severity::High,
            ForgeError::Connect(_) | ForgeError::Russh(_) | ForgeError::Ssh2(_) => Severity::High,
            ForgeError::Transfer(_) => Severity::High,
            ForgeError::Execute { .. } => Severity::High,
            ForgeError::Stalled => Severity::High,
            ForgeError::Cancelled => Severity::High,
            ForgeError::Render(_) => Severity::Medium,
            ForgeError::CacheIo(_) => Severity::Medium,
            ForgeError::Internal(_) => Severity::Critical,
            ForgeError::Io(_) => Severity::High,
        }
    }
}
