//! # redland-forge
//!
//! `redland-forge` is a Rust library for driving identical autoconf-style
//! builds (`configure → make → make check → make install`) of a source
//! tarball across a set of remote hosts reached over SSH, with live
//! per-host progress rendered to a terminal dashboard.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redland_forge::config::AppConfig;
//! use redland_forge::tui::app::ApplicationController;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_args(std::env::args())?;
//!     let controller = ApplicationController::new(config)?;
//!     let exit_code = controller.run().await?;
//!     std::process::exit(exit_code);
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`ssh::executor::ParallelExecutor`] - admits hosts into a bounded pool
//!   of concurrent SSH workers and streams progress events.
//! - [`phase::PhaseDetector`] - classifies build-agent output lines into
//!   [`phase::BuildPhase`] transitions.
//! - [`cache::TimingCache`] - persists historical per-host build durations
//!   used to estimate remaining time.
//! - [`tui::app::ApplicationController`] - owns the render/input event loop.
//! - [`config`] - CLI parsing and run configuration.
//! - [`error::ForgeError`] - error types shared across the crate.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod output_buffer;
pub mod phase;
pub mod ssh;
pub mod stats;
pub mod summary;
pub mod text;
pub mod tui;
