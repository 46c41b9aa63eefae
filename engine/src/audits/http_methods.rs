//! # http_methods
//!
//! Named in spec §1 ("HTTP method tampering") and budgeted a concurrency
//! default in §5 ("HTTP-Methods 5") but never detailed in §4.2
//! (SPEC_FULL.md §B supplements it). Replays the baseline request with
//! substituted methods and method-override headers, reporting when a
//! method that should be rejected instead returns a 2xx with a
//! baseline-compatible body shape.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;

fn candidate_methods(baseline_method: &str) -> Vec<String> {
    let mut methods = vec!["PUT".to_string(), "DELETE".to_string(), "PATCH".to_string(), "TRACE".to_string()];
    methods.push(baseline_method.to_ascii_lowercase());
    methods
}

/// Whether `candidate`'s body looks like the same resource shape as
/// `baseline` — same top-level JSON key set when both are JSON objects,
/// otherwise a length within 50% of the baseline.
fn same_shape(baseline: &str, candidate: &str) -> bool {
    let baseline_json = serde_json::from_str::<serde_json::Value>(baseline).ok();
    let candidate_json = serde_json::from_str::<serde_json::Value>(candidate).ok();
    match (baseline_json, candidate_json) {
        (Some(serde_json::Value::Object(a)), Some(serde_json::Value::Object(b))) => {
            let mut a_keys: Vec<_> = a.keys().collect();
            let mut b_keys: Vec<_> = b.keys().collect();
            a_keys.sort();
            b_keys.sort();
            a_keys == b_keys
        }
        _ => {
            let (a, b) = (baseline.len().max(1), candidate.len().max(1));
            let ratio = a.max(b) as f64 / a.min(b) as f64;
            ratio < 1.5
        }
    }
}

pub struct HttpMethodsAudit;

#[async_trait]
impl Audit for HttpMethodsAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::HttpMethods
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        matches!(history.status, 401 | 403 | 405)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "http_methods", None) {
            return Ok(());
        }

        let baseline_body = history.response.as_str().unwrap_or_default();

        let mut probes: Vec<(String, Request)> = candidate_methods(&history.method)
            .into_iter()
            .map(|method| {
                (
                    format!("method:{method}"),
                    Request { method, url: history.url.clone(), headers: history.request_headers.clone(), body: history.request_body.clone() },
                )
            })
            .collect();

        for header in ["X-HTTP-Method-Override", "X-Method-Override"] {
            let mut headers = history.request_headers.clone();
            headers.insert(header.to_string(), "GET".to_string());
            probes.push((
                format!("header:{header}"),
                Request { method: history.method.clone(), url: history.url.clone(), headers, body: history.request_body.clone() },
            ));
        }

        for (label, request) in probes {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let options = ExecuteOptions {
                history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                ..ExecuteOptions::default()
            };
            let result = ctx.http.execute(&request, &options).await;
            let Some(probe_history) = result.history.filter(|h| !h.is_timeout()) else { continue };

            if !(200..300).contains(&probe_history.status) {
                continue;
            }
            let probe_body = probe_history.response.as_str().unwrap_or_default();
            if !baseline_body.is_empty() && !same_shape(baseline_body, probe_body) {
                continue;
            }

            ctx.sink
                .create(NewIssue {
                    code: IssueCode::HttpMethodTamperingBypass,
                    title: "HTTP method tampering bypass".to_string(),
                    detail: format!(
                        "Baseline {} rejected with {}; {label} returned {} with a baseline-compatible body",
                        history.url, history.status, probe_history.status
                    ),
                    confidence: 85,
                    primary_history: probe_history.id,
                    auxiliary_histories: vec![history.id],
                    payload: None,
                    insertion_point_summary: Some(label),
                    workspace_id: history.workspace_id,
                    task_id: history.task_id,
                    scan_id: history.scan_id,
                    scan_job_id: history.scan_job_id,
                })
                .await;
            return Ok(());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_shape_compares_json_key_sets() {
        assert!(same_shape(r#"{"a":1,"b":2}"#, r#"{"b":9,"a":3}"#));
        assert!(!same_shape(r#"{"a":1}"#, r#"{"a":1,"b":2}"#));
    }

    #[test]
    fn candidate_methods_include_lowercased_baseline() {
        let methods = candidate_methods("GET");
        assert!(methods.contains(&"get".to_string()));
        assert!(methods.contains(&"TRACE".to_string()));
    }
}
