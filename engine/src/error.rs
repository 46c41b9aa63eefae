//! # error
//!
//! The closed error taxonomy recognized by the core (spec §7). Errors are
//! local: no audit error propagates to another audit, and only a
//! cancelled scope exits early. This enum is what every fallible
//! operation inside an audit module resolves to before the orchestrator
//! decides whether to log-and-skip or propagate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// TCP/TLS/HTTP failure. Recorded, never fatal to the audit.
    #[error("transport error: {0}")]
    Transport(String),

    /// Deadline elapsed. Surfaces as a synthesized zero-status history
    /// (`History::timeout`); audits treat this as "no verdict", not a
    /// failure to propagate.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The enclosing scope was cancelled. Audits exit promptly without
    /// side effects beyond work already committed.
    #[error("cancelled")]
    Cancelled,

    /// Malformed response, schema, or JSON. The specific sub-audit (or
    /// sub-probe) is skipped, not the whole module.
    #[error("parse error: {0}")]
    Parse(String),

    /// A precondition the audit requires was not met (e.g.
    /// ForbiddenBypassScan invoked on a non-401/403 baseline). Logged and
    /// returned without issuing — not a bug.
    #[error("policy precondition not met: {0}")]
    Policy(String),

    /// Bug or invariant violation. Logged at error level; the audit is
    /// skipped, the scan continues.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout(std::time::Duration::from_secs(0))
        } else {
            EngineError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
