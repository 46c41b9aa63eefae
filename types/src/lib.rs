//! # sukyan-types
//!
//! Shared data model for the sukyan audit execution engine.
//!
//! These types are produced and consumed by every component of the audit
//! engine (`sukyan-engine`): the HTTP execution layer produces `History`,
//! the insertion-point analyzer produces `InsertionPoint`, the payload
//! catalog produces `Payload`, and every audit module produces `Issue`,
//! `OOBTest` and `BrowserEvent` records through the Issue Sink and OOB
//! Correlator.
//!
//! This crate has no async runtime and no I/O — it is pure data plus the
//! small amount of pure logic (URL normalization, dedup-key construction)
//! that more than one component needs to agree on bit-for-bit.

mod browser_event;
mod history;
mod identifiers;
mod insertion_point;
mod issue;
mod oob;
mod payload;

pub mod dedup_key;

pub use browser_event::{BrowserEvent, BrowserEventCategory, BrowserEventKind};
pub use history::{History, HistoryId, HistorySource, ResponseData};
pub use identifiers::{ScanId, ScanJobId, TaskId, WorkspaceId};
pub use insertion_point::{
    InsertionPoint, InsertionPointType, ReflectionAnalysis, ReflectionContext, ValueType,
};
pub use issue::{Confidence, Issue, IssueCode, IssueId, Severity};
pub use oob::OOBTest;
pub use payload::{GeneratorPayload, OOBPayload, Payload};
