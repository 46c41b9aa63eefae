//! # history
//!
//! A captured HTTP exchange, produced by the HTTP Execution component and
//! immutable once stored. See spec §3 "History".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::identifiers::{ScanId, ScanJobId, TaskId, WorkspaceId};

/// Monotonic identifier assigned to a `History` record at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub i64);

/// Where a `History` record originated — distinguishes traffic the scanner
/// itself generated from traffic captured by the proxy front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Scanner,
    Proxy,
}

/// Decoded response body plus the raw bytes it came from. `decoded` is
/// `None` when the body is not valid UTF-8 or not a format the caller
/// asked to decode (e.g. binary downloads).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    pub body_bytes: Vec<u8>,
    pub decoded: Option<String>,
}

impl ResponseData {
    pub fn as_str(&self) -> Option<&str> {
        self.decoded.as_deref()
    }
}

/// A captured HTTP exchange: method, URL, request headers, request body
/// (lazy — not eagerly cloned unless an audit needs to re-emit it),
/// status, response headers, response body, size, timing, and the
/// workspace/task/scan/scan-job identifiers it was produced under.
///
/// Immutable once stored: any field that looks mutable (`notes`) is only
/// ever appended to by the owning component, never rewritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub id: HistoryId,
    pub method: String,
    pub url: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: Option<Vec<u8>>,
    pub status: u16,
    pub response_headers: HashMap<String, String>,
    pub response: ResponseData,
    pub response_size: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub source: HistorySource,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
    pub scan_job_id: Option<ScanJobId>,
    /// Free-form diagnostic trail. Append-only (spec §3 invariant: "Every
    /// Issue has exactly one primary History; auxiliary histories are
    /// always appended, never rewritten" — the same discipline applies
    /// here to notes on the history record itself).
    pub notes: Vec<String>,
    /// Sent-direction payloads observed during the captured session, when
    /// this history represents a WebSocket handshake (spec §6: "WebSocket
    /// connections and messages" persisted tables). Populated by whatever
    /// produced the history (the crawl/proxy front-end is out of scope,
    /// spec §1); empty for ordinary HTTP histories. CSWSHScan (spec §4.2)
    /// replays these to tally sent/received counts.
    pub ws_messages: Vec<String>,
}

impl History {
    /// A history record synthesized when a request timed out before any
    /// response arrived. Status 0 signals "no response"; the elapsed
    /// duration is preserved so OOB detection still has request context
    /// to correlate against (spec §4.1).
    pub fn timeout(
        method: impl Into<String>,
        url: impl Into<String>,
        workspace_id: WorkspaceId,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: HistoryId(0),
            method: method.into(),
            url: url.into(),
            request_headers: HashMap::new(),
            request_body: None,
            status: 0,
            response_headers: HashMap::new(),
            response: ResponseData::default(),
            response_size: 0,
            duration: elapsed,
            source: HistorySource::Scanner,
            workspace_id,
            task_id: None,
            scan_id: None,
            scan_job_id: None,
            notes: vec!["synthesized: request timed out".to_string()],
            ws_messages: Vec::new(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status == 0
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
