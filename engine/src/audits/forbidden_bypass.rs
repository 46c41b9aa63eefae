//! # forbidden_bypass
//!
//! Only runs when the baseline status is 401 or 403 (spec §4.2
//! ForbiddenBypassScan). Generates combinations over IP-spoofing,
//! URL-override and port-override header families plus path-mutation
//! payloads, judging each probe vulnerable when the resulting status is
//! neither 400/401/403/404.
//!
//! Per spec §9's open question ("the source contains an `||` that can be
//! read as always-true; per the intended semantics ... implement with
//! `&&`"), `applies_to` uses `&&`, not `||` — this audit must never fire
//! against a baseline that isn't actually forbidden.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode, IssueId};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;
use crate::payloads::catalog;

pub struct ForbiddenBypassScan;

impl ForbiddenBypassScan {
    fn is_rejected(status: u16) -> bool {
        matches!(status, 400 | 401 | 403 | 404)
    }
}

#[async_trait]
impl Audit for ForbiddenBypassScan {
    fn kind(&self) -> AuditKind {
        AuditKind::ForbiddenBypass
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    /// Baseline status must be exactly 401 or 403 — no `||` that
    /// silently widens this to "any status", per the spec's explicit
    /// correction of the source's ambiguous condition.
    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        matches!(history.status, 401 | 403)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !(history.status == 401 || history.status == 403) {
            return Err(EngineError::Policy("ForbiddenBypassScan requires a 401/403 baseline".to_string()));
        }
        if !ctx.dedup.mark_if_new(&history.url, "forbidden_bypass", None) {
            return Ok(());
        }

        let mut probes: Vec<(String, Request)> = Vec::new();

        for (header, value) in catalog::forbidden_bypass_ip_headers() {
            let mut headers = history.request_headers.clone();
            headers.insert(header.to_string(), value.to_string());
            probes.push((
                format!("header:{header}={value}"),
                Request { method: history.method.clone(), url: history.url.clone(), headers, body: history.request_body.clone() },
            ));
        }
        for header in catalog::forbidden_bypass_url_override_headers() {
            let mut headers = history.request_headers.clone();
            headers.insert(header.to_string(), path_of(&history.url));
            probes.push((
                format!("header:{header}"),
                Request { method: history.method.clone(), url: history.url.clone(), headers, body: history.request_body.clone() },
            ));
        }
        for header in catalog::forbidden_bypass_port_override_headers() {
            let mut headers = history.request_headers.clone();
            headers.insert(header.to_string(), "80".to_string());
            probes.push((
                format!("header:{header}"),
                Request { method: history.method.clone(), url: history.url.clone(), headers, body: history.request_body.clone() },
            ));
        }
        for mutation in catalog::forbidden_bypass_path_mutations() {
            let url = format!("{}{mutation}", history.url.trim_end_matches('/'));
            probes.push((
                format!("path:{mutation}"),
                Request { method: history.method.clone(), url, headers: history.request_headers.clone(), body: history.request_body.clone() },
            ));
        }

        // Several combinations can independently bypass the same 401/403:
        // the first one to succeed creates the primary issue; every later
        // success is alternative evidence for that same logical
        // vulnerability, appended rather than reported as a new issue
        // (spec §4.5/§4.2: "may attach multiple supporting histories").
        let mut primary_issue: Option<IssueId> = None;

        let concurrency = ctx.config.concurrency.forbidden_bypass.max(1);
        for chunk in probes.chunks(concurrency) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            for (label, request) in chunk {
                let options = ExecuteOptions {
                    history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                    ..ExecuteOptions::default()
                };
                let result = ctx.http.execute(request, &options).await;
                let Some(probe_history) = result.history.filter(|h| !h.is_timeout()) else { continue };

                if !Self::is_rejected(probe_history.status) {
                    match primary_issue {
                        None => {
                            let confidence = if (200..300).contains(&probe_history.status) { 90 } else { 75 };
                            let id = ctx
                                .sink
                                .create(NewIssue {
                                    code: IssueCode::ForbiddenBypass,
                                    title: "Authorization bypass via forbidden-path mutation".to_string(),
                                    detail: format!(
                                        "Baseline {} returned {}; probe {label} returned {} for {}",
                                        history.url, history.status, probe_history.status, probe_history.url
                                    ),
                                    confidence,
                                    primary_history: probe_history.id,
                                    auxiliary_histories: vec![history.id],
                                    payload: None,
                                    insertion_point_summary: Some(label.clone()),
                                    workspace_id: history.workspace_id,
                                    task_id: history.task_id,
                                    scan_id: history.scan_id,
                                    scan_job_id: history.scan_job_id,
                                })
                                .await;
                            primary_issue = Some(id);
                        }
                        Some(id) => {
                            ctx.sink.append_histories(id, vec![probe_history.id]).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn path_of(url: &str) -> String {
    url.split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| rest[i..].to_string()))
        .unwrap_or_else(|| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};

    fn sample_history(status: u16) -> History {
        History {
            id: HistoryId(1),
            method: "GET".to_string(),
            url: "https://t.example/admin".to_string(),
            request_headers: Default::default(),
            request_body: None,
            status,
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

    #[test]
    fn does_not_apply_to_200_baseline() {
        let audit = ForbiddenBypassScan;
        let point = crate::audits::sentinel_point(&sample_history(200));
        assert!(!audit.applies_to(&sample_history(200), &point));
    }

    #[test]
    fn applies_to_403_baseline() {
        let audit = ForbiddenBypassScan;
        let point = crate::audits::sentinel_point(&sample_history(403));
        assert!(audit.applies_to(&sample_history(403), &point));
    }

    #[test]
    fn rejects_standard_forbidden_codes() {
        assert!(ForbiddenBypassScan::is_rejected(404));
        assert!(!ForbiddenBypassScan::is_rejected(200));
    }
}
