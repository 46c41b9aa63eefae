//! # browser_event
//!
//! An event surfaced by a headless-browser probe — dialog, console,
//! network, or storage activity. See spec §3 "BrowserEvent".

use serde::{Deserialize, Serialize};

use crate::history::HistoryId;
use crate::identifiers::{ScanId, TaskId, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEventKind {
    Dialog,
    Console,
    Network,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserEventCategory(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEvent {
    pub kind: BrowserEventKind,
    pub category: BrowserEventCategory,
    pub url: String,
    pub description: String,
    pub data: serde_json::Value,
    pub history_id: Option<HistoryId>,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
}
