//! Command-line parsing and the assembled run configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cache::{DEFAULT_CACHE_KEEP_BUILDS, DEFAULT_CACHE_RETENTION_DAYS, default_cache_path};
use crate::error::ForgeError;
use crate::host::HostId;
use crate::phase::DEFAULT_INSTALL_PREFIX;
use crate::text::ColorMode;

const DEFAULT_AUTO_EXIT_DELAY_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Parallel autoconf-style builds over SSH with a live terminal dashboard.
#[derive(Debug, Parser)]
#[command(name = "redland-forge", version, about)]
pub struct Cli {
    /// Path to the source tarball uploaded to every host.
    pub tarball: PathBuf,

    /// `user@hostname` entries, space- or comma-separated.
    pub hosts: Vec<String>,

    /// File with one `user@host` entry per line; `#` starts a comment.
    #[arg(short = 'f', long = "hosts-file")]
    pub hosts_file: Option<PathBuf>,

    /// Maximum number of hosts built concurrently. Defaults to a value
    /// derived from the terminal height at startup.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Seconds to wait after every host reaches a terminal state before
    /// exiting automatically.
    #[arg(long, default_value_t = DEFAULT_AUTO_EXIT_DELAY_SECS)]
    pub auto_exit_delay: u64,

    /// Disables automatic exit; the dashboard stays open until `q`.
    #[arg(long)]
    pub no_auto_exit: bool,

    /// Path to the timing cache file.
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Days a cache entry is retained before being dropped.
    #[arg(long, default_value_t = DEFAULT_CACHE_RETENTION_DAYS)]
    pub cache_retention: u64,

    /// Number of recent builds kept per host in the cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_KEEP_BUILDS)]
    pub cache_keep_builds: usize,

    /// Disables the timing cache entirely (also suppresses ETA display).
    #[arg(long)]
    pub no_cache: bool,

    /// Disables the live dashboard; only the final summary is printed.
    #[arg(long)]
    pub no_progress: bool,

    /// Color mode for the dashboard and summary.
    #[arg(long, default_value = "auto")]
    pub color: ColorMode,

    /// Enables verbose logging to stderr.
    #[arg(long)]
    pub debug: bool,

    /// Install prefix used to recognize the Install phase (e.g. lines
    /// naming a path under it) when the agent's output doesn't say
    /// "make install" or "installing " explicitly.
    #[arg(long, default_value = DEFAULT_INSTALL_PREFIX)]
    pub install_prefix: String,
}

/// Fully resolved run configuration, assembled from `Cli` plus
/// environment-derived defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tarball: PathBuf,
    pub hosts: Vec<HostId>,
    pub max_concurrent: usize,
    pub auto_exit_delay: Duration,
    pub auto_exit_enabled: bool,
    pub cache_file: PathBuf,
    pub cache_retention_days: u64,
    pub cache_keep_builds: usize,
    pub cache_enabled: bool,
    pub show_progress: bool,
    pub color: ColorMode,
    pub debug: bool,
    pub connect_timeout: Duration,
    pub demo_host_prefixes: Vec<String>,
    pub install_prefix: String,
}

impl AppConfig {
    /// Parses `argv` into a validated `AppConfig`. Bad arguments or an
    /// unparseable host entry return `ForgeError::Config`/`Resolve`,
    /// mapped by the caller to exit code 2.
    pub fn from_args<I, T>(argv: I) -> Result<Self, ForgeError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(argv).map_err(|err| ForgeError::Config(err.to_string()))?;
        Self::from_cli(cli)
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ForgeError> {
        let mut entries: Vec<String> = Vec::new();
        for host in &cli.hosts {
            entries.extend(host.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
        }
        if let Some(path) = &cli.hosts_file {
            entries.extend(read_hosts_file(path)?);
        }
        if entries.is_empty() {
            return Err(ForgeError::Config(
                "no hosts given: pass user@host arguments or --hosts-file".to_string(),
            ));
        }

        let hosts = entries.iter().map(|entry| HostId::parse(entry)).collect::<Result<Vec<_>, _>>()?;

        let max_concurrent = cli.max_concurrent.unwrap_or_else(default_max_concurrent).max(1);

        Ok(Self {
            tarball: cli.tarball,
            hosts,
            max_concurrent,
            auto_exit_delay: Duration::from_secs(cli.auto_exit_delay),
            auto_exit_enabled: !cli.no_auto_exit,
            cache_file: cli.cache_file.unwrap_or_else(default_cache_path),
            cache_retention_days: cli.cache_retention,
            cache_keep_builds: cli.cache_keep_builds,
            cache_enabled: !cli.no_cache,
            show_progress: !cli.no_progress,
            color: cli.color,
            debug: cli.debug,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            demo_host_prefixes: vec!["test-".to_string(), "demo-".to_string()],
            install_prefix: cli.install_prefix,
        })
    }
}

/// Reads `user@host` entries from a file, one per line, `#` starting a
/// comment. Blank lines are skipped.
fn read_hosts_file(path: &std::path::Path) -> Result<Vec<String>, ForgeError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| ForgeError::Config(format!("could not read hosts file {}: {err}", path.display())))?;
    Ok(contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect())
}

/// Derives a default `max_concurrent` from the terminal height, floor 1,
/// used when `--max-concurrent` is not given.
fn default_max_concurrent() -> usize {
    match crossterm::terminal::size() {
        Ok((_, rows)) => ((rows / crate::tui::layout::MIN_TILE_HEIGHT).max(1)) as usize,
        Err(_) => 1,
    }
}
