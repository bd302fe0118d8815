//! Print dispatch configuration.
//!
//! Resolved from the `print` category of `local_settings`. Every key is
//! optional and parsed leniently; anything missing or unreadable falls back to
//! the built-in default.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::db;
use crate::print::{Platform, PlatformPredicate};
use crate::printers::{BrowserPrintBackend, CommandPrintBackend, PrintBackend};

pub const PRINT_CATEGORY: &str = "print";

const DEFAULT_LOAD_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_HARD_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CLEANUP_FALLBACK_MS: u64 = 5_000;
const MAX_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Browser,
    Command { program: String, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub spool_dir: PathBuf,
    pub load_timeout: Duration,
    pub hard_timeout: Duration,
    pub cleanup_fallback: Duration,
    pub backend: BackendChoice,
    /// Forces a flow regardless of the detected platform.
    pub platform_override: Option<Platform>,
    /// When off, mobile devices print directly without the preview modal.
    pub mobile_preview: bool,
}

impl DispatchConfig {
    pub fn defaults(data_dir: &Path) -> Self {
        Self {
            spool_dir: data_dir.join("print-spool"),
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
            hard_timeout: Duration::from_millis(DEFAULT_HARD_TIMEOUT_MS),
            cleanup_fallback: Duration::from_millis(DEFAULT_CLEANUP_FALLBACK_MS),
            backend: BackendChoice::Browser,
            platform_override: None,
            mobile_preview: true,
        }
    }

    /// Read the `print` settings, falling back per key.
    pub fn load(conn: &Connection, data_dir: &Path) -> Self {
        let mut config = Self::defaults(data_dir);
        let get = |key: &str| db::get_setting(conn, PRINT_CATEGORY, key);

        if let Some(dir) = get("spool_dir").as_deref().and_then(non_blank) {
            config.spool_dir = PathBuf::from(dir);
        }
        config.load_timeout = millis_setting(get("load_timeout_ms"), config.load_timeout);
        config.hard_timeout = millis_setting(get("hard_timeout_ms"), config.hard_timeout);
        config.cleanup_fallback =
            millis_setting(get("cleanup_fallback_ms"), config.cleanup_fallback);

        match get("backend").as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            None => {}
            Some(ref b) if b.is_empty() || b == "browser" => {}
            Some(ref b) if b == "command" => {
                let program = get("command_program")
                    .as_deref()
                    .and_then(non_blank)
                    .map(str::to_string);
                let args = get("command_args")
                    .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                match program {
                    Some(program) => config.backend = BackendChoice::Command { program, args },
                    None => match CommandPrintBackend::system_default() {
                        Some(cmd) => {
                            config.backend = BackendChoice::Command {
                                program: cmd.program,
                                args,
                            }
                        }
                        None => warn!("Command backend selected without a program, using browser"),
                    },
                }
            }
            Some(other) => warn!(backend = %other, "Unknown print backend setting, using browser"),
        }

        config.platform_override = get("platform")
            .as_deref()
            .and_then(Platform::from_setting);
        if let Some(flag) = get("mobile_preview").as_deref() {
            match parse_bool(flag) {
                Some(value) => config.mobile_preview = value,
                None => warn!(value = %flag, "Unreadable mobile_preview setting, keeping default"),
            }
        }

        info!(
            spool_dir = %config.spool_dir.display(),
            backend = ?config.backend,
            platform = ?config.platform_override,
            "Print configuration loaded"
        );
        config
    }

    pub fn build_backend(&self) -> Arc<dyn PrintBackend> {
        match &self.backend {
            BackendChoice::Browser => Arc::new(BrowserPrintBackend),
            BackendChoice::Command { program, args } => {
                Arc::new(CommandPrintBackend::new(program.clone(), args.clone()))
            }
        }
    }

    /// Predicate for the dispatcher: the override when set, otherwise the
    /// classification of `user_agent` (desktop when there is none).
    pub fn platform_predicate(&self, user_agent: Option<&str>) -> PlatformPredicate {
        let platform = self.platform_override.unwrap_or_else(|| {
            user_agent
                .map(Platform::from_user_agent)
                .unwrap_or(Platform::Desktop)
        });
        Arc::new(move || platform)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn millis_setting(raw: Option<String>, fallback: Duration) -> Duration {
    let Some(raw) = raw else {
        return fallback;
    };
    match raw.trim().parse::<f64>() {
        Ok(ms) if ms.is_finite() && ms > 0.0 => {
            Duration::from_millis((ms.round() as u64).min(MAX_TIMEOUT_MS))
        }
        _ => {
            warn!(value = %raw, "Ignoring unreadable timeout setting");
            fallback
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
