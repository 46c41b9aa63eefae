//! # issue
//!
//! A finding produced by an audit module through the Issue Sink. See
//! spec §3 "Issue" and §4.5.

use serde::{Deserialize, Serialize};

use crate::history::HistoryId;
use crate::identifiers::{ScanId, ScanJobId, TaskId, WorkspaceId};
use crate::payload::Payload;

/// Identifier assigned by the Issue Sink at creation time (spec §4.5);
/// the handle `appendHistories` looks an issue up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueId(pub u64);

/// Confidence is a percentage in `[0, 100]`. Kept as a thin newtype
/// rather than a bare `u8` so callers can't accidentally pass a
/// severity-scale or a fraction where a percentage is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Confidence(u8);

impl Confidence {
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Taxonomy key identifying the logical vulnerability class. Closed set,
/// one variant per audit-reportable finding named across spec §1, §4.2
/// and SPEC_FULL.md §B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    XssReflected,
    XssDom,
    Csti,
    Cspp,
    ForbiddenBypass,
    Log4Shell,
    HostHeaderInjection,
    SniInjection,
    JsonpEndpointDetected,
    WebsocketCswsh,
    React2ShellRce,
    OpenRedirect,
    HttpMethodTamperingBypass,
    MassAssignment,
    GraphqlIntrospectionEnabled,
    GraphqlBatchingAbuse,
    GraphqlDepthLimitMissing,
    GraphqlFieldSuggestionsLeak,
    GraphqlDirectiveAbuse,
    GraphqlSensitiveFieldExposed,
}

/// A finding: code, title, detail, confidence, severity, the primary
/// history it was observed on, any auxiliary evidence histories, the
/// payload that triggered it, and a human-legible summary of the
/// insertion point involved (spec §3 invariant: exactly one primary
/// history; auxiliary histories are appended, never rewritten).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub code: IssueCode,
    pub title: String,
    pub detail: String,
    pub confidence: Confidence,
    pub severity: Severity,
    pub primary_history: HistoryId,
    pub auxiliary_histories: Vec<HistoryId>,
    pub payload: Option<Payload>,
    pub insertion_point_summary: Option<String>,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
    pub scan_job_id: Option<ScanJobId>,
}

impl Issue {
    pub fn append_histories(&mut self, histories: impl IntoIterator<Item = HistoryId>) {
        for h in histories {
            if !self.auxiliary_histories.contains(&h) {
                self.auxiliary_histories.push(h);
            }
        }
    }
}
