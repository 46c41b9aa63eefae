//! # config
//!
//! Engine configuration, loaded from environment variables with typed
//! defaults — the same idiom as the teacher's `UwbHubConfig::default()`:
//! `std::env::var("...").ok().and_then(|v| v.parse().ok()).unwrap_or(default)`.
//! An optional TOML file may be layered under the environment (env wins).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audits::AuditKind;

/// `fast` | `smart` | `fuzz` — governs insertion-point and payload-variant
/// breadth (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Fast,
    Smart,
    Fuzz,
}

impl Default for ScanMode {
    fn default() -> Self {
        ScanMode::Smart
    }
}

/// Per-audit concurrency and timeout defaults (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyLimits {
    pub alert_audit: usize,
    pub forbidden_bypass: usize,
    pub log4shell: usize,
    pub host_header: usize,
    pub sni: usize,
    pub http_methods: usize,
    pub jsonp: usize,
    pub history_level: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            alert_audit: env_usize("SUKYAN_CONCURRENCY_ALERT", 3),
            forbidden_bypass: env_usize("SUKYAN_CONCURRENCY_FORBIDDEN_BYPASS", 5),
            log4shell: env_usize("SUKYAN_CONCURRENCY_LOG4SHELL", 10),
            host_header: env_usize("SUKYAN_CONCURRENCY_HOST_HEADER", 10),
            sni: env_usize("SUKYAN_CONCURRENCY_SNI", 10),
            http_methods: env_usize("SUKYAN_CONCURRENCY_HTTP_METHODS", 5),
            jsonp: env_usize("SUKYAN_CONCURRENCY_JSONP", 5),
            history_level: env_usize("SUKYAN_CONCURRENCY_HISTORY", 10),
        }
    }
}

/// Per-audit and per-operation timeouts (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutLimits {
    pub navigation: Duration,
    pub dom_xss_overall: Duration,
    pub cswsh_per_origin: Duration,
    pub dialog_fast_path: Duration,
    pub dialog_slow_path: Duration,
}

impl Default for TimeoutLimits {
    fn default() -> Self {
        let navigation = Duration::from_secs(env_u64("SUKYAN_TIMEOUT_NAVIGATION_SECS", 30));
        Self {
            navigation,
            dom_xss_overall: Duration::from_secs(env_u64("SUKYAN_TIMEOUT_DOM_XSS_SECS", 120)),
            cswsh_per_origin: Duration::from_secs(env_u64("SUKYAN_TIMEOUT_CSWSH_SECS", 30)),
            dialog_fast_path: Duration::from_millis(env_u64("SUKYAN_TIMEOUT_DIALOG_FAST_MS", 500)),
            dialog_slow_path: Duration::from_secs(env_u64("SUKYAN_TIMEOUT_DIALOG_SLOW_SECS", 3)),
        }
    }
}

/// Top-level engine configuration: scan mode, concurrency, timeouts, and
/// the CLI-surface toggles of spec §6 (`--experimental-audits`,
/// `--server-side`, `--client-side`, `--insertion-points`, `--fingerprints`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scan_mode: ScanMode,
    pub concurrency: ConcurrencyLimits,
    pub timeouts: TimeoutLimits,
    pub experimental_audits: bool,
    pub server_side: bool,
    pub client_side: bool,
    pub insertion_point_filter: Option<Vec<String>>,
    pub fingerprint_filter: Option<Vec<String>>,
    pub depth_limit_min_reportable: usize,
    pub tls_accept_invalid_certs: bool,
    pub attacker_origin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::default(),
            concurrency: ConcurrencyLimits::default(),
            timeouts: TimeoutLimits::default(),
            experimental_audits: env_bool("SUKYAN_EXPERIMENTAL_AUDITS", false),
            server_side: env_bool("SUKYAN_SERVER_SIDE", true),
            client_side: env_bool("SUKYAN_CLIENT_SIDE", true),
            insertion_point_filter: None,
            fingerprint_filter: None,
            depth_limit_min_reportable: env_usize("SUKYAN_DEPTH_LIMIT_MIN", 8),
            tls_accept_invalid_certs: env_bool("SUKYAN_TLS_ACCEPT_INVALID_CERTS", true),
            attacker_origin: std::env::var("SUKYAN_ATTACKER_ORIGIN")
                .unwrap_or_else(|_| "https://cswsh-test.attacker.invalid".to_string()),
        }
    }
}

impl EngineConfig {
    /// Layers a TOML file's values under environment-derived defaults —
    /// env vars always win, matching the teacher's env-first idiom.
    pub fn load_with_file(path: Option<&std::path::Path>) -> Self {
        let mut cfg = Self::default();
        if let Some(path) = path {
            if let Ok(text) = std::fs::read_to_string(path) {
                if let Ok(file_cfg) = toml::from_str::<EngineConfig>(&text) {
                    cfg = file_cfg;
                }
            }
        }
        cfg
    }

    /// Whether `kind` should run at all given the scan-mode and
    /// experimental-audit toggles.
    pub fn audit_enabled(&self, kind: AuditKind) -> bool {
        if kind.is_experimental() && !self.experimental_audits {
            return false;
        }
        if let Some(filter) = &self.fingerprint_filter {
            if !filter.iter().any(|f| f.eq_ignore_ascii_case(kind.as_str())) {
                return false;
            }
        }
        true
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
