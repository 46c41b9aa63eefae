//! # oob
//!
//! The OOB Correlator (spec §4.4): manages interaction domains, lets
//! audits register a probe, and matches later incoming callbacks by
//! full-id. Unmatched `OOBTest`s remain pending indefinitely and are not
//! errors (spec §4.4).

use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use sukyan_types::{
    HistoryId, IssueCode, OOBMatchState, OOBPayload, OOBTest, ScanId, TaskId, WorkspaceId,
};

use crate::issues::{IssueSink, NewIssue};

const INTERACTION_DOMAIN_SUFFIX: &str = "oob.sukyan.invalid";

/// Registers OOB probes and correlates incoming canary callbacks against
/// them. Mirrors the teacher's `Arc<RwLock<_>>` shared-state idiom
/// (`state.rs`/`handlers.rs`) rather than a bespoke lock-free structure —
/// OOB registration/matching is comparatively low-frequency compared to
/// the per-request dedup path, so a single `RwLock<Vec<_>>` is the right
/// match for the access pattern.
#[derive(Clone)]
pub struct OOBCorrelator {
    tests: Arc<RwLock<Vec<OOBTest>>>,
}

impl OOBCorrelator {
    pub fn new() -> Self {
        Self { tests: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Mints a fresh (domain, full-id) pair. Every call returns a
    /// distinct pair — spec §3's invariant that "payload reuse is
    /// forbidden across different OOBTest registrations; each OOB probe
    /// holds a fresh interaction domain" is enforced by never returning
    /// the same value twice, not by the caller's discipline.
    pub fn get_url(&self) -> OOBPayload {
        let full_id = random_hex_id();
        let interaction_domain = format!("{full_id}.{INTERACTION_DOMAIN_SUFFIX}");
        OOBPayload { interaction_domain, full_id }
    }

    /// Registers a probe an audit just fired. Must be called with a
    /// payload obtained from `get_url`, after the probe request has been
    /// sent (so `originating_history` is known).
    pub async fn register(&self, test: OOBTest) {
        self.tests.write().await.push(test);
    }

    pub async fn pending_count(&self) -> usize {
        self.tests.read().await.iter().filter(|t| t.is_pending()).count()
    }

    /// Called by the external canary ingester when a DNS or HTTP callback
    /// arrives. Matches by full-id; on match, emits an Issue through
    /// `sink` with confidence 100 (HTTP contact observed) or 95 (DNS
    /// only), per spec §4.4.
    pub async fn correlate(
        &self,
        full_id: &str,
        contact_history: HistoryId,
        contact_only: bool,
        sink: &dyn IssueSink,
    ) {
        let mut tests = self.tests.write().await;
        let Some(test) = tests.iter_mut().find(|t| t.full_id == full_id && t.is_pending()) else {
            return;
        };

        // Spec §3 invariant: "once matched, its history-id is set and may
        // never be cleared" — checked above via `is_pending`, so this
        // write only ever happens once per test.
        test.state = OOBMatchState::Matched { history_id: contact_history, contact_only };

        let confidence = if contact_only { 95 } else { 100 };
        info!(full_id, confidence, "OOB callback correlated");

        sink.create(NewIssue {
            code: test.code,
            title: oob_title(test.code),
            detail: format!(
                "Out-of-band interaction observed for payload injected at {} (target {})",
                test.insertion_point_summary.as_deref().unwrap_or("<unknown>"),
                test.target_url
            ),
            confidence,
            primary_history: test.originating_history,
            auxiliary_histories: vec![contact_history],
            payload: None,
            insertion_point_summary: test.insertion_point_summary.clone(),
            workspace_id: test.workspace_id,
            task_id: test.task_id,
            scan_id: test.scan_id,
            scan_job_id: None,
        })
        .await;
    }
}

impl Default for OOBCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

fn oob_title(code: IssueCode) -> String {
    match code {
        IssueCode::Log4Shell => "Log4Shell (CVE-2021-44228) remote JNDI lookup".to_string(),
        IssueCode::HostHeaderInjection => "Host header injection confirmed via out-of-band interaction".to_string(),
        IssueCode::SniInjection => "TLS SNI injection confirmed via out-of-band interaction".to_string(),
        IssueCode::React2ShellRce => "React Server Components deserialization RCE confirmed".to_string(),
        other => format!("Out-of-band interaction confirmed ({other:?})"),
    }
}

fn random_hex_id() -> String {
    let mut rng = rand::thread_rng();
    (0..32).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
}

/// Helper for building an `OOBTest` registration with the boilerplate
/// identifier plumbing filled in.
pub fn new_oob_test(
    code: IssueCode,
    oob: &OOBPayload,
    target_url: impl Into<String>,
    insertion_point_summary: Option<String>,
    payload_value: impl Into<String>,
    originating_history: HistoryId,
    workspace_id: WorkspaceId,
    task_id: Option<TaskId>,
    scan_id: Option<ScanId>,
) -> OOBTest {
    OOBTest {
        code,
        interaction_domain: oob.interaction_domain.clone(),
        full_id: oob.full_id.clone(),
        target_url: target_url.into(),
        insertion_point_summary,
        payload_value: payload_value.into(),
        originating_history,
        workspace_id,
        task_id,
        scan_id,
        state: OOBMatchState::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::InMemoryIssueSink;

    #[tokio::test]
    async fn get_url_always_mints_fresh_domains() {
        let correlator = OOBCorrelator::new();
        let a = correlator.get_url();
        let b = correlator.get_url();
        assert_ne!(a.full_id, b.full_id);
        assert_ne!(a.interaction_domain, b.interaction_domain);
    }

    #[tokio::test]
    async fn correlate_matches_by_full_id_and_sets_history_once() {
        let correlator = OOBCorrelator::new();
        let sink = InMemoryIssueSink::new();
        let oob = correlator.get_url();
        let test = new_oob_test(
            IssueCode::Log4Shell,
            &oob,
            "https://t.example",
            Some("header:X-Api-Version".to_string()),
            "${jndi:ldap://x}",
            HistoryId(1),
            WorkspaceId::new(),
            None,
            None,
        );
        correlator.register(test).await;
        assert_eq!(correlator.pending_count().await, 1);

        correlator.correlate(&oob.full_id, HistoryId(2), false, &sink).await;
        assert_eq!(correlator.pending_count().await, 0);
        assert_eq!(sink.all().await.len(), 1);
        assert_eq!(sink.all().await[0].confidence.value(), 100);

        // A second callback for the same full-id must not create a
        // second issue or re-match.
        correlator.correlate(&oob.full_id, HistoryId(3), false, &sink).await;
        assert_eq!(sink.all().await.len(), 1);
    }

    #[tokio::test]
    async fn unmatched_tests_stay_pending_without_error() {
        let correlator = OOBCorrelator::new();
        let oob = correlator.get_url();
        let test = new_oob_test(
            IssueCode::HostHeaderInjection,
            &oob,
            "https://t.example",
            None,
            "x",
            HistoryId(1),
            WorkspaceId::new(),
            None,
            None,
        );
        correlator.register(test).await;
        assert_eq!(correlator.pending_count().await, 1);
    }
}
