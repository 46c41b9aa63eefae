//! # oob
//!
//! A registered out-of-band expectation. See spec §3 "OOBTest" and §4.4.

use serde::{Deserialize, Serialize};

use crate::history::HistoryId;
use crate::identifiers::{ScanId, TaskId, WorkspaceId};
use crate::issue::IssueCode;

/// Either pending or matched, per spec §3's invariant: "Every OOBTest
/// record is either pending or matched; once matched, its history-id is
/// set and may never be cleared."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OOBMatchState {
    Pending,
    /// `contact_only` distinguishes a DNS-only ping (confidence 95) from
    /// a full HTTP contact (confidence 100), per spec §4.4.
    Matched { history_id: HistoryId, contact_only: bool },
}

/// A registered expectation that a probe fired earlier will later be
/// confirmed by an out-of-band callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OOBTest {
    pub code: IssueCode,
    pub interaction_domain: String,
    pub full_id: String,
    pub target_url: String,
    pub insertion_point_summary: Option<String>,
    pub payload_value: String,
    pub originating_history: HistoryId,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
    pub state: OOBMatchState,
}

impl OOBTest {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, OOBMatchState::Pending)
    }
}
