//! # orchestrator
//!
//! The Audit Orchestrator (spec §2, §4): given a history item and
//! options, decides which audits apply, runs them with the concurrency
//! and cancellation discipline of spec §5, and propagates
//! workspace/task/scan identifiers through to every audit's findings.
//!
//! One cancellable scope is held per scan (`Orchestrator::scan`); a
//! child token is derived per history item and per audit module, handed
//! down into each audit's own per-worker suspension points — the same
//! parent-holds-a-handle-to-child-state idiom the teacher uses for
//! shared `Arc<RwLock<_>>` state, applied here to cancellation instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sukyan_types::{History, InsertionPoint, InsertionPointType};

use crate::audits::graphql::{BatchingAudit, DepthLimitAudit, DirectivesAudit, FieldSuggestionsAudit, IntrospectionAudit, SensitiveFieldsAudit};
use crate::audits::{
    alert::AlertAudit, cspp::CsppAudit, cswsh::CswshScan, dom_xss::DomXssAudit, forbidden_bypass::ForbiddenBypassScan,
    host_header::HostHeaderAudit, http_methods::HttpMethodsAudit, jsonp::JsonpCallbackScan, log4shell::Log4ShellAudit,
    mass_assignment::MassAssignmentAudit, open_redirect::OpenRedirectAudit, react2shell::React2ShellAudit, sni::SniAudit,
};
use crate::audits::{sentinel_point, Audit, AuditContext, AuditKind};
use crate::browser::BrowserPool;
use crate::config::{EngineConfig, ScanMode};
use crate::dedup::DedupSet;
use crate::error::EngineError;
use crate::http::{execute::Request, ExecuteOptions, HistoryCreationOptions, HttpExecutor};
use crate::insertion_points::{analyze_dynamicity_and_reflection, extract_points};
use crate::issues::IssueSink;
use crate::oob::OOBCorrelator;

/// Tallies the cancellation invariant from spec §8: `count(completed) +
/// count(aborted) = count(scheduled)`. One `ScanCounters` per scan.
#[derive(Default)]
pub struct ScanCounters {
    pub scheduled: AtomicUsize,
    pub completed: AtomicUsize,
    pub aborted: AtomicUsize,
}

impl ScanCounters {
    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.scheduled.load(Ordering::Relaxed),
            self.completed.load(Ordering::Relaxed),
            self.aborted.load(Ordering::Relaxed),
        )
    }
}

/// Builds the closed registry of audit implementations (spec §4.2, §B).
fn build_registry() -> Vec<Arc<dyn Audit>> {
    vec![
        Arc::new(AlertAudit),
        Arc::new(DomXssAudit),
        Arc::new(CsppAudit),
        Arc::new(ForbiddenBypassScan),
        Arc::new(Log4ShellAudit),
        Arc::new(HostHeaderAudit),
        Arc::new(SniAudit),
        Arc::new(JsonpCallbackScan),
        Arc::new(CswshScan),
        Arc::new(React2ShellAudit),
        Arc::new(OpenRedirectAudit),
        Arc::new(HttpMethodsAudit),
        Arc::new(MassAssignmentAudit),
        Arc::new(IntrospectionAudit),
        Arc::new(BatchingAudit),
        Arc::new(DepthLimitAudit),
        Arc::new(FieldSuggestionsAudit),
        Arc::new(DirectivesAudit),
        Arc::new(SensitiveFieldsAudit),
    ]
}

/// The concurrent, cancellable orchestrator. One instance is expected to
/// live for the duration of one scan (spec §5: "one scope per scan").
pub struct Orchestrator {
    http: HttpExecutor,
    browser: Option<Arc<BrowserPool>>,
    sink: Arc<dyn IssueSink>,
    oob: OOBCorrelator,
    config: EngineConfig,
    audits: Vec<Arc<dyn Audit>>,
    /// Per-audit dedup sets (spec §4.6/§5: "no cross-audit sharing").
    /// `Arc`-wrapped so a spawned task can own a handle without
    /// borrowing from `self` across an `.await`.
    dedup: HashMap<AuditKind, Arc<DedupSet>>,
    counters: Arc<ScanCounters>,
}

impl Orchestrator {
    pub fn new(http: HttpExecutor, browser: Option<Arc<BrowserPool>>, sink: Arc<dyn IssueSink>, oob: OOBCorrelator, config: EngineConfig) -> Self {
        let audits = build_registry();
        debug_assert_eq!(audits.len(), AuditKind::all().len(), "every AuditKind must have a registered Audit impl");

        let mut dedup = HashMap::new();
        for kind in AuditKind::all() {
            dedup.insert(*kind, Arc::new(DedupSet::new()));
        }

        Self { http, browser, sink, oob, config, audits, dedup, counters: Arc::new(ScanCounters::default()) }
    }

    pub fn counters(&self) -> Arc<ScanCounters> {
        self.counters.clone()
    }

    /// Per-audit-kind concurrency override from `ConcurrencyLimits`,
    /// falling back to the audit's own `default_concurrency` (spec §5
    /// defaults table).
    fn concurrency_for(&self, audit: &dyn Audit) -> usize {
        match audit.kind() {
            AuditKind::Alert => self.config.concurrency.alert_audit,
            AuditKind::ForbiddenBypass => self.config.concurrency.forbidden_bypass,
            AuditKind::Log4Shell => self.config.concurrency.log4shell,
            AuditKind::HostHeader => self.config.concurrency.host_header,
            AuditKind::Sni => self.config.concurrency.sni,
            AuditKind::HttpMethods => self.config.concurrency.http_methods,
            AuditKind::Jsonp => self.config.concurrency.jsonp,
            _ => audit.default_concurrency(),
        }
        .max(1)
    }

    /// Overall per-audit deadline, where spec §5 names one (DOM-XSS,
    /// CSPP, CSWSH); audits with no named overall timeout run bounded
    /// only by the scan's own cancellation token.
    fn overall_timeout_for(&self, kind: AuditKind) -> Option<std::time::Duration> {
        match kind {
            AuditKind::DomXss => Some(self.config.timeouts.dom_xss_overall),
            AuditKind::Cspp => Some(self.config.timeouts.navigation * 4),
            AuditKind::Cswsh => Some(self.config.timeouts.cswsh_per_origin),
            _ => None,
        }
    }

    /// Scan-mode insertion-point filtering (spec §6): fast keeps only
    /// dynamic/reflected points; smart additionally keeps body/parameter
    /// positions even when unclassified; fuzz keeps everything.
    fn points_for_mode(&self, mut points: Vec<InsertionPoint>) -> Vec<InsertionPoint> {
        match self.config.scan_mode {
            ScanMode::Fuzz => points,
            ScanMode::Fast => {
                points.retain(|p| p.is_dynamic || p.is_reflected);
                points
            }
            ScanMode::Smart => {
                points.retain(|p| p.is_dynamic || p.is_reflected || matches!(p.point_type, InsertionPointType::Body | InsertionPointType::Parameter));
                points
            }
        }
    }

    /// Applies the `--insertion-points <csv>` filter (spec §6): when set,
    /// only points whose name matches the csv list survive.
    fn apply_name_filter(&self, mut points: Vec<InsertionPoint>) -> Vec<InsertionPoint> {
        if let Some(filter) = &self.config.insertion_point_filter {
            points.retain(|p| filter.iter().any(|f| f.eq_ignore_ascii_case(&p.name)));
        }
        points
    }

    /// Applies the `--experimental-audits`/`--server-side`/`--client-side`
    /// gating from spec §6 on top of `EngineConfig::audit_enabled`.
    fn should_run(&self, audit: &dyn Audit) -> bool {
        if !self.config.audit_enabled(audit.kind()) {
            return false;
        }
        if audit.kind().is_client_side() {
            self.config.client_side
        } else {
            self.config.server_side
        }
    }

    /// Runs the full applicable audit battery against one history item.
    /// Returns once every dispatched audit has completed, timed out, or
    /// been cancelled — never blocks indefinitely (spec §3 invariant:
    /// "every await-style wait has a bounded timeout or is anchored to a
    /// cancellable scope").
    pub async fn scan_history(&self, history: &History, scan_scope: &CancellationToken) {
        if scan_scope.is_cancelled() {
            return;
        }

        let raw_points = extract_points(history);
        let analyzed = self.analyze_points(history, raw_points, scan_scope).await;
        let filtered = self.apply_name_filter(self.points_for_mode(analyzed));

        let history_scope = scan_scope.child_token();

        // Spec §5: "History-level module parallelism defaults to 10" —
        // bounds how many audit modules run concurrently against one
        // history item.
        let module_gate = Arc::new(Semaphore::new(self.config.concurrency.history_level.max(1)));

        let mut in_flight = FuturesUnordered::new();

        for audit in &self.audits {
            if history_scope.is_cancelled() {
                break;
            }
            if !self.should_run(audit.as_ref()) {
                continue;
            }

            let applicable: Vec<InsertionPoint> = if audit.is_history_level() {
                let sentinel = sentinel_point(history);
                if audit.applies_to(history, &sentinel) {
                    vec![sentinel]
                } else {
                    Vec::new()
                }
            } else {
                filtered.iter().filter(|p| audit.applies_to(history, p)).cloned().collect()
            };

            if applicable.is_empty() {
                continue;
            }

            self.counters.scheduled.fetch_add(1, Ordering::Relaxed);

            let audit = audit.clone();
            let width = self.concurrency_for(audit.as_ref());
            let overall_timeout = self.overall_timeout_for(audit.kind());
            let gate = module_gate.clone();
            let history = history.clone();
            let history_scope = history_scope.clone();
            let counters = self.counters.clone();
            let http = self.http.clone();
            let browser = self.browser.clone();
            let sink = self.sink.clone();
            let oob = self.oob.clone();
            let config = self.config.clone();
            let dedup = self.dedup.get(&audit.kind()).expect("every AuditKind has a DedupSet").clone();

            in_flight.push(tokio::spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    counters.aborted.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                if history_scope.is_cancelled() {
                    counters.aborted.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                let audit_scope = history_scope.child_token();
                let ctx = AuditContext { http: &http, oob: &oob, dedup: dedup.as_ref(), config: &config, sink: sink.as_ref(), browser: browser.as_deref() };

                let body = run_bounded(audit.as_ref(), &ctx, &history, &applicable, width, &audit_scope);
                let outcome = match overall_timeout {
                    Some(d) => tokio::time::timeout(d, body).await.unwrap_or(Err(EngineError::Timeout(d))),
                    None => body.await,
                };

                match outcome {
                    Ok(()) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Cancelled) => {
                        counters.aborted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(audit = audit.kind().as_str(), error = %e, "audit returned an error; treated as skipped, not fatal");
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }

        while in_flight.next().await.is_some() {}

        let (scheduled, completed, aborted) = self.counters.snapshot();
        debug!(scheduled, completed, aborted, url = %history.url, "history scan complete");
    }

    /// Replays `history` twice per insertion point with distinct random
    /// markers (spec §4.3) to classify dynamicity/reflection, bounded by
    /// the history-level concurrency limit.
    async fn analyze_points(&self, history: &History, points: Vec<InsertionPoint>, cancel: &CancellationToken) -> Vec<InsertionPoint> {
        let gate = Arc::new(Semaphore::new(self.config.concurrency.history_level.max(1)));
        let mut tasks = FuturesUnordered::new();

        for point in points {
            if cancel.is_cancelled() {
                break;
            }
            let gate = gate.clone();
            let history = history.clone();
            let http = self.http.clone();
            let workspace_id = history.workspace_id;
            let cancel = cancel.clone();

            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else { return point };
                if cancel.is_cancelled() {
                    return point;
                }
                analyze_dynamicity_and_reflection(&history, &point, |req: Request| {
                    let http = http.clone();
                    async move {
                        let options = ExecuteOptions {
                            history_options: Some(HistoryCreationOptions::scanner(workspace_id)),
                            ..ExecuteOptions::default()
                        };
                        let result = http.execute(&req, &options).await;
                        result.history.filter(|h| !h.is_timeout()).and_then(|h| h.response.decoded.clone())
                    }
                })
                .await
            }));
        }

        let mut out = Vec::new();
        while let Some(joined) = tasks.next().await {
            if let Ok(point) = joined {
                out.push(point);
            }
        }
        out
    }
}

/// Bounded worker pool over `points`: keeps at most `width` of `audit`'s
/// `run` futures in flight at once, checking `cancel` before dispatching
/// each new one (spec §5 cancellation discipline point (a)). Insertion-
/// point order is preserved in dispatch order, not in completion order
/// (spec §5).
async fn run_bounded(
    audit: &dyn Audit,
    ctx: &AuditContext<'_>,
    history: &History,
    points: &[InsertionPoint],
    width: usize,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let width = width.max(1);
    let mut futs = FuturesUnordered::new();
    let mut next = 0usize;

    while next < points.len() && futs.len() < width {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        futs.push(audit.run(ctx, history, &points[next], cancel));
        next += 1;
    }

    while let Some(res) = futs.next().await {
        if let Err(e) = res {
            if e.is_cancelled() {
                return Err(e);
            }
            warn!(audit = audit.kind().as_str(), error = %e, "audit worker returned an error for one insertion point");
        }
        if next < points.len() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            futs.push(audit.run(ctx, history, &points[next], cancel));
            next += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::capability::FakeBrowserPage;
    use crate::browser::pool::BrowserFactory;
    use crate::http::Transport;
    use crate::issues::InMemoryIssueSink;
    use async_trait::async_trait;
    use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};

    fn sample_history(url: &str) -> History {
        History {
            id: HistoryId(1),
            method: "GET".to_string(),
            url: url.to_string(),
            request_headers: Default::default(),
            request_body: None,
            status: 200,
            response_headers: Default::default(),
            response: ResponseData::default(),
            response_size: 0,
            duration: std::time::Duration::from_millis(1),
            source: HistorySource::Scanner,
            workspace_id: WorkspaceId::new(),
            task_id: None,
            scan_id: None,
            scan_job_id: None,
            notes: vec![],
            ws_messages: vec![],
        }
    }

    struct FakeFactory;
    #[async_trait]
    impl BrowserFactory for FakeFactory {
        async fn create(&self) -> crate::error::EngineResult<Box<dyn crate::browser::BrowserPage>> {
            Ok(Box::new(FakeBrowserPage::default()))
        }
    }

    fn test_orchestrator() -> Orchestrator {
        let http = HttpExecutor::new(Transport::Http1, true).unwrap();
        let browser = Arc::new(BrowserPool::new(2, Arc::new(FakeFactory)));
        let sink: Arc<dyn IssueSink> = Arc::new(InMemoryIssueSink::new());
        let oob = OOBCorrelator::new();
        let mut config = EngineConfig::default();
        config.client_side = false; // keep this test offline-only
        Orchestrator::new(http, Some(browser), sink, oob, config)
    }

    #[test]
    fn registry_covers_every_audit_kind() {
        let audits = build_registry();
        assert_eq!(audits.len(), AuditKind::all().len());
    }

    #[tokio::test]
    async fn cancelled_scope_schedules_nothing() {
        let orch = test_orchestrator();
        let history = sample_history("https://t.example/admin");
        let scope = CancellationToken::new();
        scope.cancel();
        orch.scan_history(&history, &scope).await;
        let (scheduled, completed, aborted) = orch.counters().snapshot();
        assert_eq!(scheduled, 0);
        assert_eq!(completed, 0);
        assert_eq!(aborted, 0);
    }

    #[tokio::test]
    async fn scheduled_equals_completed_plus_aborted() {
        let orch = test_orchestrator();
        let history = sample_history("https://t.example/?q=1");
        let scope = CancellationToken::new();
        orch.scan_history(&history, &scope).await;
        let (scheduled, completed, aborted) = orch.counters().snapshot();
        assert_eq!(scheduled, completed + aborted);
    }
}
