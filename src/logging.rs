//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{PrintError, Result};

const LOG_FILE_PREFIX: &str = "pos-receipts";
const DEFAULT_FILTER: &str = "info,pos_receipts=debug";
const MAX_LOG_FILES: usize = 10;

/// `RUST_LOG` when set and valid, otherwise the crate default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. The host must keep the returned guard alive;
/// dropping it flushes and stops the file writer.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PrintError::Logging(e.to_string()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_dir = %log_dir.display(),
        "Receipt printing logging initialized"
    );
    Ok(guard)
}

/// Keep only the newest [`MAX_LOG_FILES`] log files in `log_dir`.
pub fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            if !path.is_file() || !name.starts_with(LOG_FILE_PREFIX) {
                return None;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((path, modified))
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    #[serial]
    fn env_filter_honours_rust_log() {
        std::env::set_var("RUST_LOG", "warn");
        assert_eq!(env_filter().to_string(), "warn");
        std::env::remove_var("RUST_LOG");
        assert_eq!(
            env_filter().to_string(),
            EnvFilter::new(DEFAULT_FILTER).to_string()
        );
    }

    #[test]
    #[serial]
    fn invalid_rust_log_falls_back_to_default() {
        std::env::set_var("RUST_LOG", "pos_receipts=notalevel");
        assert_eq!(
            env_filter().to_string(),
            EnvFilter::new(DEFAULT_FILTER).to_string()
        );
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    fn prune_keeps_newest_log_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3_600);
        for i in 0..(MAX_LOG_FILES + 3) {
            let path = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-01-{:02}", i + 1));
            let file = fs::File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i as u64 * 60)).unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        prune_old_logs(dir.path());

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), MAX_LOG_FILES + 1);
        assert!(remaining.contains(&"unrelated.txt".to_string()));
        assert!(!remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-01-01")));
        assert!(remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-01-13")));
    }

    #[test]
    fn prune_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        prune_old_logs(&dir.path().join("nope"));
    }

    #[test]
    #[serial]
    fn init_logging_creates_directory_and_rejects_second_install() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let guard = init_logging(&log_dir).unwrap();
        assert!(log_dir.is_dir());

        let second = init_logging(&log_dir);
        assert!(matches!(second, Err(PrintError::Logging(_))));
        drop(guard);
    }
}
