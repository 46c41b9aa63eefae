//! # issues
//!
//! The Issue Sink (spec §4.5): the single point through which every audit
//! reports a finding. `IssueSink` is a trait so the orchestrator can be
//! wired to an in-process store in tests and a persistent store in a
//! real deployment; only the in-memory reference implementation lives in
//! this crate (SPEC_FULL.md §4.5 — no `PostgresIssueSink` here, the
//! relational store is an external collaborator).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use sukyan_types::{Confidence, HistoryId, Issue, IssueCode, IssueId, Payload, ScanId, ScanJobId, Severity, TaskId, WorkspaceId};

/// Everything needed to construct an `Issue` except its derived
/// severity, which the sink assigns from `code` so every audit reports
/// the same severity for the same finding class (spec §4.5: "severity is
/// a function of issue code, not of the reporting audit").
pub struct NewIssue {
    pub code: IssueCode,
    pub title: String,
    pub detail: String,
    pub confidence: u8,
    pub primary_history: HistoryId,
    pub auxiliary_histories: Vec<HistoryId>,
    pub payload: Option<Payload>,
    pub insertion_point_summary: Option<String>,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
    pub scan_job_id: Option<ScanJobId>,
}

/// Maps a finding class to its severity. Closed match so adding a new
/// `IssueCode` variant forces a decision here (spec §3 taxonomy is
/// closed).
pub fn severity_for(code: IssueCode) -> Severity {
    match code {
        IssueCode::Log4Shell | IssueCode::React2ShellRce => Severity::Critical,
        IssueCode::XssReflected
        | IssueCode::XssDom
        | IssueCode::Csti
        | IssueCode::MassAssignment
        | IssueCode::HttpMethodTamperingBypass => Severity::High,
        IssueCode::Cspp
        | IssueCode::ForbiddenBypass
        | IssueCode::HostHeaderInjection
        | IssueCode::SniInjection
        | IssueCode::WebsocketCswsh
        | IssueCode::OpenRedirect
        | IssueCode::GraphqlBatchingAbuse
        | IssueCode::GraphqlDepthLimitMissing
        | IssueCode::GraphqlSensitiveFieldExposed => Severity::Medium,
        IssueCode::JsonpEndpointDetected
        | IssueCode::GraphqlIntrospectionEnabled
        | IssueCode::GraphqlFieldSuggestionsLeak
        | IssueCode::GraphqlDirectiveAbuse => Severity::Low,
    }
}

/// The Issue Sink boundary every audit writes findings through.
#[async_trait]
pub trait IssueSink: Send + Sync {
    /// Creates a new issue and returns its assigned id, to be held onto
    /// by the caller in case later probes in the same run turn up
    /// additional evidence for the same logical vulnerability.
    async fn create(&self, new_issue: NewIssue) -> IssueId;

    /// Appends evidence histories to an already-created issue (spec
    /// §4.5: "`appendHistories(issue, histories)` adds evidence
    /// histories idempotently"). A history id already present in
    /// `auxiliary_histories` is not duplicated (spec §3 invariant:
    /// "auxiliary histories are always appended, never rewritten").
    /// No-op if `id` doesn't name a known issue (e.g. a sink
    /// implementation that evicted it) — appending evidence is never
    /// fatal to the reporting audit.
    async fn append_histories(&self, id: IssueId, histories: Vec<HistoryId>);

    async fn all(&self) -> Vec<Issue>;
}

/// Reference in-process implementation: an append-only `Vec<Issue>`
/// behind a lock. Good enough for CLI runs and tests; a real deployment
/// is expected to supply its own `IssueSink` backed by durable storage
/// (SPEC_FULL.md §4.5).
pub struct InMemoryIssueSink {
    issues: RwLock<Vec<Issue>>,
    next_id: AtomicU64,
}

impl InMemoryIssueSink {
    pub fn new() -> Self {
        Self { issues: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
    }
}

impl Default for InMemoryIssueSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueSink for InMemoryIssueSink {
    async fn create(&self, new_issue: NewIssue) -> IssueId {
        let id = IssueId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let severity = severity_for(new_issue.code);
        let issue = Issue {
            id,
            code: new_issue.code,
            title: new_issue.title,
            detail: new_issue.detail,
            confidence: Confidence::new(new_issue.confidence),
            severity,
            primary_history: new_issue.primary_history,
            auxiliary_histories: new_issue.auxiliary_histories,
            payload: new_issue.payload,
            insertion_point_summary: new_issue.insertion_point_summary,
            workspace_id: new_issue.workspace_id,
            task_id: new_issue.task_id,
            scan_id: new_issue.scan_id,
            scan_job_id: new_issue.scan_job_id,
        };
        info!(code = ?issue.code, severity = ?issue.severity, confidence = issue.confidence.value(), "issue created");
        self.issues.write().await.push(issue);
        id
    }

    async fn append_histories(&self, id: IssueId, histories: Vec<HistoryId>) {
        let mut issues = self.issues.write().await;
        if let Some(issue) = issues.iter_mut().find(|i| i.id == id) {
            issue.append_histories(histories);
        }
    }

    async fn all(&self) -> Vec<Issue> {
        self.issues.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: IssueCode) -> NewIssue {
        NewIssue {
            code,
            title: "t".to_string(),
            detail: "d".to_string(),
            confidence: 80,
            primary_history: HistoryId(1),
            auxiliary_histories: vec![],
            payload: None,
            insertion_point_summary: None,
            workspace_id: WorkspaceId::new(),
            task_id: None,
            scan_id: None,
            scan_job_id: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_severity_from_code() {
        let sink = InMemoryIssueSink::new();
        sink.create(sample(IssueCode::Log4Shell)).await;
        let all = sink.all().await;
        assert_eq!(all[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn all_returns_issues_in_creation_order() {
        let sink = InMemoryIssueSink::new();
        sink.create(sample(IssueCode::OpenRedirect)).await;
        sink.create(sample(IssueCode::XssReflected)).await;
        let all = sink.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code, IssueCode::OpenRedirect);
        assert_eq!(all[1].code, IssueCode::XssReflected);
    }

    #[tokio::test]
    async fn append_histories_adds_evidence_idempotently() {
        let sink = InMemoryIssueSink::new();
        let id = sink.create(sample(IssueCode::ForbiddenBypass)).await;

        sink.append_histories(id, vec![HistoryId(2), HistoryId(3)]).await;
        sink.append_histories(id, vec![HistoryId(3), HistoryId(4)]).await;

        let all = sink.all().await;
        assert_eq!(all[0].auxiliary_histories, vec![HistoryId(2), HistoryId(3), HistoryId(4)]);
    }

    #[tokio::test]
    async fn append_histories_never_rewrites_primary() {
        let sink = InMemoryIssueSink::new();
        let id = sink.create(sample(IssueCode::ForbiddenBypass)).await;
        sink.append_histories(id, vec![HistoryId(1)]).await;
        let all = sink.all().await;
        assert_eq!(all[0].primary_history, HistoryId(1));
    }

    #[tokio::test]
    async fn append_histories_on_unknown_id_is_a_noop() {
        let sink = InMemoryIssueSink::new();
        sink.create(sample(IssueCode::ForbiddenBypass)).await;
        sink.append_histories(IssueId(999), vec![HistoryId(7)]).await;
        let all = sink.all().await;
        assert!(all[0].auxiliary_histories.is_empty());
    }
}
