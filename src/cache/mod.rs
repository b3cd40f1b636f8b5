//! Persistent per-host build-timing cache used to estimate remaining
//! time for in-flight builds.
//!
//! Mirrors the teacher's graceful-degrade idiom: a cache that cannot be
//! read or written never aborts the run, it just falls back to an empty
//! state and logs a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ForgeError;
use crate::phase::BuildPhase;

const CURRENT_VERSION: &str = "1.0";
const DEFAULT_RETENTION_DAYS: u64 = 30;
const DEFAULT_KEEP_BUILDS: usize = 5;
const DEMO_HOST_TTL_SECS: u64 = 60 * 60;

/// One completed build's per-phase durations, persisted in the recent
/// ring for a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    pub timestamp: u64,
    pub configure_time: f64,
    pub make_time: f64,
    pub check_time: f64,
    pub install_time: f64,
    pub total_time: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AverageTimes {
    pub configure: f64,
    pub make: f64,
    pub check: f64,
    pub install: f64,
    pub total: f64,
}

impl Default for AverageTimes {
    fn default() -> Self {
        Self { configure: 0.0, make: 0.0, check: 0.0, install: 0.0, total: 0.0 }
    }
}

/// Cached history for a single `user@hostname`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub last_updated: u64,
    pub total_builds: u64,
    pub average_times: AverageTimes,
    pub recent_builds: Vec<TimingRecord>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            last_updated: unix_now(),
            total_builds: 0,
            average_times: AverageTimes::default(),
            recent_builds: Vec::new(),
        }
    }

    /// Updates incremental averages and appends to the recent ring,
    /// evicting the oldest record beyond `keep_builds`.
    fn record(&mut self, record: TimingRecord, keep_builds: usize) {
        self.total_builds += 1;
        let n = self.total_builds as f64;
        self.average_times.configure = incremental_mean(self.average_times.configure, record.configure_time, n);
        self.average_times.make = incremental_mean(self.average_times.make, record.make_time, n);
        self.average_times.check = incremental_mean(self.average_times.check, record.check_time, n);
        self.average_times.install = incremental_mean(self.average_times.install, record.install_time, n);
        self.average_times.total = incremental_mean(self.average_times.total, record.total_time, n);
        self.last_updated = record.timestamp;
        self.recent_builds.push(record);
        while self.recent_builds.len() > keep_builds {
            self.recent_builds.remove(0);
        }
    }
}

/// `newAvg = oldAvg * (n-1)/n + sample/n`.
fn incremental_mean(old_avg: f64, sample: f64, n: f64) -> f64 {
    old_avg * (n - 1.0) / n + sample / n
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// On-disk cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: String,
    cache_retention_days: u64,
    hosts: HashMap<String, CacheEntry>,
}

/// Historical build-timing cache, keyed by `user@hostname`.
#[derive(Debug, Clone)]
pub struct TimingCache {
    retention_days: u64,
    keep_builds: usize,
    demo_host_prefixes: Vec<String>,
    hosts: HashMap<String, CacheEntry>,
}

impl TimingCache {
    /// Loads the cache from `path`. Any failure to read or parse (missing
    /// file, invalid JSON, unrecognized `version`) is non-fatal: an empty
    /// cache is returned and a warning is logged.
    pub fn load(path: &Path, retention_days: u64, keep_builds: usize, demo_host_prefixes: Vec<String>) -> Self {
        let mut cache = Self { retention_days, keep_builds, demo_host_prefixes, hosts: HashMap::new() };
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("could not read timing cache at {}: {err}", path.display());
                }
                return cache;
            }
        };
        match serde_json::from_str::<CacheDocument>(&contents) {
            Ok(doc) if doc.version == CURRENT_VERSION => {
                cache.hosts = doc.hosts;
            }
            Ok(doc) => {
                log::warn!("timing cache version '{}' is not supported, starting fresh", doc.version);
            }
            Err(err) => {
                log::warn!("timing cache at {} is corrupt ({err}), starting fresh", path.display());
            }
        }
        cache.cleanup();
        cache
    }

    /// Writes the cache atomically: a temp file in the same directory,
    /// then a rename over the target path.
    pub fn save(&mut self, path: &Path) -> Result<(), ForgeError> {
        self.cleanup();
        let doc = CacheDocument {
            version: CURRENT_VERSION.to_string(),
            cache_retention_days: self.retention_days,
            hosts: self.hosts.clone(),
        };
        let serialized = serde_json::to_string_pretty(&doc)
            .map_err(|err| ForgeError::CacheIo(format!("could not serialize cache: {err}")))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|err| ForgeError::CacheIo(err.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|err| ForgeError::CacheIo(format!("could not create temp file: {err}")))?;
        use std::io::Write;
        tmp.write_all(serialized.as_bytes())
            .map_err(|err| ForgeError::CacheIo(format!("could not write temp file: {err}")))?;
        tmp.flush().map_err(|err| ForgeError::CacheIo(err.to_string()))?;
        tmp.persist(path)
            .map_err(|err| ForgeError::CacheIo(format!("could not rename temp file into place: {err}")))?;
        Ok(())
    }

    /// Records the outcome of a completed build for `host_key`.
    pub fn record(
        &mut self,
        host_key: &str,
        configure_time: f64,
        make_time: f64,
        check_time: f64,
        install_time: f64,
        total_time: f64,
        success: bool,
    ) {
        let entry = self.hosts.entry(host_key.to_string()).or_insert_with(CacheEntry::new);
        entry.record(
            TimingRecord {
                timestamp: unix_now(),
                configure_time,
                make_time,
                check_time,
                install_time,
                total_time,
                success,
            },
            self.keep_builds,
        );
    }

    /// Estimates remaining time for a host currently in `current_phase`
    /// with `elapsed_in_phase` seconds already spent there. Returns
    /// `None` when no cache entry exists, per the "ETA unavailable"
    /// behavior.
    pub fn estimate(&self, host_key: &str, current_phase: BuildPhase, elapsed_in_phase: f64) -> Option<f64> {
        let entry = self.hosts.get(host_key)?;
        if entry.total_builds == 0 {
            return None;
        }
        let avgs = &entry.average_times;
        let phase_order = [
            BuildPhase::Configure,
            BuildPhase::Make,
            BuildPhase::Check,
            BuildPhase::Install,
        ];
        let phase_avg = |phase: BuildPhase| -> f64 {
            match phase {
                BuildPhase::Configure => avgs.configure,
                BuildPhase::Make => avgs.make,
                BuildPhase::Check => avgs.check,
                BuildPhase::Install => avgs.install,
                _ => 0.0,
            }
        };
        let mut total = 0.0;
        let mut reached_current = false;
        for phase in phase_order {
            if phase == current_phase {
                reached_current = true;
                let avg = phase_avg(phase);
                if avg > 0.0 {
                    total += avg * (1.0 - elapsed_in_phase / avg).max(0.0);
                }
                continue;
            }
            if reached_current {
                total += phase_avg(phase);
            }
        }
        if !reached_current {
            // current_phase is before Configure (e.g. Connecting) or a
            // terminal phase; fall back to the full historical total.
            return Some(avgs.total);
        }
        Some(total)
    }

    /// Drops entries older than the retention policy, with a separate
    /// short TTL for demo/test hosts. Idempotent.
    pub fn cleanup(&mut self) {
        let now = unix_now();
        let retention_secs = self.retention_days.saturating_mul(24 * 60 * 60);
        let prefixes = self.demo_host_prefixes.clone();
        self.hosts.retain(|key, entry| {
            let age = now.saturating_sub(entry.last_updated);
            let is_demo = prefixes.iter().any(|prefix| {
                key.split_once('@').map(|(_, host)| host).unwrap_or(key).starts_with(prefix.as_str())
            });
            if is_demo {
                age <= DEMO_HOST_TTL_SECS
            } else {
                age <= retention_secs
            }
        });
    }

    pub fn entry(&self, host_key: &str) -> Option<&CacheEntry> {
        self.hosts.get(host_key)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Default cache file location: OS user-config-dir / `redland-forge/timing-cache.json`.
pub fn default_cache_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("redland-forge")
        .join("timing-cache.json")
}

pub const DEFAULT_CACHE_RETENTION_DAYS: u64 = DEFAULT_RETENTION_DAYS;
pub const DEFAULT_CACHE_KEEP_BUILDS: usize = DEFAULT_KEEP_BUILDS;

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_prefixes() -> Vec<String> {
        vec!["test-".to_string(), "demo-".to_string()]
    }

    #[test]
    fn record_updates_incremental_average() {
        let mut cache = TimingCache::load(Path::new("/nonexistent/path"), 30, 5, demo_prefixes());
        cache.record("u@a", 1.0, 2.0, 1.0, 1.0, 5.0, true);
        cache.record("u@a", 3.0, 4.0, 1.0, 1.0, 9.0, true);
        let entry = cache.entry("u@a").unwrap();
        assert_eq!(entry.total_builds, 2);
        assert!((entry.average_times.total - 7.0).abs() < 1e-9);
    }

    #[test]
    fn keep_builds_caps_recent_ring() {
        let mut cache = TimingCache::load(Path::new("/nonexistent/path"), 30, 2, demo_prefixes());
        for i in 0..5 {
            cache.record("u@a", 1.0, 1.0, 1.0, 1.0, i as f64, true);
        }
        assert_eq!(cache.entry("u@a").unwrap().recent_builds.len(), 2);
    }

    #[test]
    fn estimate_none_without_history() {
        let cache = TimingCache::load(Path::new("/nonexistent/path"), 30, 5, demo_prefixes());
        assert!(cache.estimate("u@a", BuildPhase::Make, 1.0).is_none());
    }

    #[test]
    fn estimate_discounts_elapsed_time_in_current_phase() {
        let mut cache = TimingCache::load(Path::new("/nonexistent/path"), 30, 5, demo_prefixes());
        cache.record("u@a", 10.0, 20.0, 5.0, 5.0, 40.0, true);
        let full = cache.estimate("u@a", BuildPhase::Make, 0.0).unwrap();
        let half_done = cache.estimate("u@a", BuildPhase::Make, 10.0).unwrap();
        assert!(half_done < full);
        assert!(half_done >= 0.0);
    }

    #[test]
    fn save_then_load_round_trips_modulo_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing-cache.json");
        let mut cache = TimingCache::load(&path, 30, 5, demo_prefixes());
        cache.record("u@a", 1.0, 1.0, 1.0, 1.0, 4.0, true);
        cache.save(&path).unwrap();

        let reloaded = TimingCache::load(&path, 30, 5, demo_prefixes());
        assert_eq!(reloaded.entry("u@a").unwrap().total_builds, 1);
    }

    #[test]
    fn cleanup_drops_demo_hosts_sooner_than_regular_hosts() {
        let mut cache = TimingCache::load(Path::new("/nonexistent/path"), 30, 5, demo_prefixes());
        cache.record("ci@test-build01", 1.0, 1.0, 1.0, 1.0, 4.0, true);
        cache.hosts.get_mut("ci@test-build01").unwrap().last_updated =
            unix_now().saturating_sub(DEMO_HOST_TTL_SECS + 10);
        cache.cleanup();
        assert!(cache.entry("ci@test-build01").is_none());
    }

    #[test]
    fn unknown_version_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing-cache.json");
        std::fs::write(&path, r#"{"version":"99.0","cache_retention_days":30,"hosts":{}}"#).unwrap();
        let cache = TimingCache::load(&path, 30, 5, demo_prefixes());
        assert!(cache.is_empty());
    }
}
