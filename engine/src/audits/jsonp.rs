//! # jsonp
//!
//! Detects JSONP responses by parsing `name(<valid-JSON>)` with a
//! permissive trailing-semicolon rule; probes a callback-parameter list
//! sized by scan mode when the baseline isn't already JSONP-shaped (spec
//! §4.2 JSONPCallbackScan).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;
use crate::payloads::catalog;

/// Parses `callback_name(<json>)` with an optional trailing `;` and
/// whitespace, returning the callback name and JSON text when the shape
/// matches (spec §4.2: "a permissive suffix-semicolon rule").
fn parse_jsonp(body: &str) -> Option<(String, String)> {
    let trimmed = body.trim().trim_end_matches(';').trim_end();
    let open = trimmed.find('(')?;
    if !trimmed.ends_with(')') {
        return None;
    }
    let name = trimmed[..open].trim();
    let starts_valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    if !starts_valid || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.') {
        return None;
    }
    let json_text = &trimmed[open + 1..trimmed.len() - 1];
    serde_json::from_str::<serde_json::Value>(json_text).ok()?;
    Some((name.to_string(), json_text.to_string()))
}

pub struct JsonpCallbackScan;

#[async_trait]
impl Audit for JsonpCallbackScan {
    fn kind(&self) -> AuditKind {
        AuditKind::Jsonp
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        history.method.eq_ignore_ascii_case("GET") && history.status != 0
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "jsonp", None) {
            return Ok(());
        }

        if let Some(body) = history.response.as_str() {
            if let Some((callback, _json)) = parse_jsonp(body) {
                ctx.sink
                    .create(NewIssue {
                        code: IssueCode::JsonpEndpointDetected,
                        title: "JSONP endpoint detected".to_string(),
                        detail: format!("Baseline response at {} is JSONP-shaped with callback `{callback}`", history.url),
                        confidence: 90,
                        primary_history: history.id,
                        auxiliary_histories: vec![],
                        payload: None,
                        insertion_point_summary: None,
                        workspace_id: history.workspace_id,
                        task_id: history.task_id,
                        scan_id: history.scan_id,
                        scan_job_id: history.scan_job_id,
                    })
                    .await;
                return Ok(());
            }
        }

        let baseline_param_is_jsonp_shaped =
            history.url.contains("callback=") || history.url.contains("jsonp=") || history.url.contains("cb=");
        let names = catalog::jsonp_callback_names(ctx.config.scan_mode, baseline_param_is_jsonp_shaped);

        for name in names {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let marker = format!("sukyan_{}_{:x}", name, rand::random::<u32>());
            let url = append_query_param(&history.url, name, &marker);
            let request = Request { method: "GET".to_string(), url, headers: history.request_headers.clone(), body: None };
            let options = ExecuteOptions {
                history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                ..ExecuteOptions::default()
            };
            let result = ctx.http.execute(&request, &options).await;
            let Some(probe_history) = result.history.filter(|h| !h.is_timeout()) else { continue };
            let Some(body) = probe_history.response.as_str() else { continue };

            if let Some((echoed_callback, _)) = parse_jsonp(body) {
                let controllable = echoed_callback == marker;
                let confidence = if controllable { 90 } else { 75 };
                ctx.sink
                    .create(NewIssue {
                        code: IssueCode::JsonpEndpointDetected,
                        title: "JSONP endpoint detected".to_string(),
                        detail: format!(
                            "Parameter `{name}` turns {} into a JSONP response{}",
                            history.url,
                            if controllable { " with an attacker-controllable callback name" } else { "" }
                        ),
                        confidence,
                        primary_history: probe_history.id,
                        auxiliary_histories: vec![history.id],
                        payload: None,
                        insertion_point_summary: Some(format!("parameter:{name}")),
                        workspace_id: history.workspace_id,
                        task_id: history.task_id,
                        scan_id: history.scan_id,
                        scan_job_id: history.scan_job_id,
                    })
                    .await;
                return Ok(());
            }
        }

        Ok(())
    }
}

fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{name}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_jsonp() {
        let (name, json) = parse_jsonp("myCb({\"a\":1})").unwrap();
        assert_eq!(name, "myCb");
        assert_eq!(json, r#"{"a":1}"#);
    }

    #[test]
    fn parses_with_trailing_semicolon_and_whitespace() {
        let (name, _) = parse_jsonp("  cb({\"a\":1});  \n").unwrap();
        assert_eq!(name, "cb");
    }

    #[test]
    fn rejects_non_jsonp_body() {
        assert!(parse_jsonp(r#"{"a":1}"#).is_none());
        assert!(parse_jsonp("not json at all").is_none());
    }

    #[test]
    fn rejects_invalid_callback_name() {
        assert!(parse_jsonp("1bad(1)").is_none());
    }
}
