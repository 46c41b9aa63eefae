//! # mass_assignment
//!
//! Named in spec §1 but undetailed in §4.2 (SPEC_FULL.md §B supplements
//! it). For JSON-body requests, appends commonly-privileged extra
//! fields drawn from the payload catalog and reports when the response
//! reflects the injected field back with the submitted value.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;
use crate::payloads::catalog;

const SENTINEL_VALUE: bool = true;

pub struct MassAssignmentAudit;

#[async_trait]
impl Audit for MassAssignmentAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::MassAssignment
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        matches!(history.method.as_str(), "POST" | "PUT" | "PATCH")
            && history
                .request_body
                .as_ref()
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
                .map(|v| v.is_object())
                .unwrap_or(false)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "mass_assignment", None) {
            return Ok(());
        }

        let Some(body) = history.request_body.as_ref().and_then(|b| std::str::from_utf8(b).ok()) else {
            return Ok(());
        };
        let Ok(serde_json::Value::Object(base_object)) = serde_json::from_str::<serde_json::Value>(body) else {
            return Ok(());
        };

        for field in catalog::mass_assignment_fields() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if base_object.contains_key(field) {
                continue;
            }

            let mut mutated = base_object.clone();
            mutated.insert(field.to_string(), serde_json::Value::Bool(SENTINEL_VALUE));
            let Ok(mutated_body) = serde_json::to_vec(&serde_json::Value::Object(mutated)) else { continue };

            let request = Request {
                method: history.method.clone(),
                url: history.url.clone(),
                headers: history.request_headers.clone(),
                body: Some(mutated_body),
            };
            let options = ExecuteOptions {
                history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                ..ExecuteOptions::default()
            };
            let result = ctx.http.execute(&request, &options).await;
            let Some(probe_history) = result.history.filter(|h| !h.is_timeout()) else { continue };
            let Some(response_body) = probe_history.response.as_str() else { continue };

            let reflected = serde_json::from_str::<serde_json::Value>(response_body)
                .ok()
                .and_then(|v| v.get(field).cloned())
                .map(|v| v == serde_json::Value::Bool(SENTINEL_VALUE))
                .unwrap_or(false);

            if reflected {
                ctx.sink
                    .create(NewIssue {
                        code: IssueCode::MassAssignment,
                        title: "Mass assignment".to_string(),
                        detail: format!("Field `{field}` injected into the JSON body of {} was accepted and reflected back", history.url),
                        confidence: 70,
                        primary_history: probe_history.id,
                        auxiliary_histories: vec![history.id],
                        payload: None,
                        insertion_point_summary: Some(format!("json-field:{field}")),
                        workspace_id: history.workspace_id,
                        task_id: history.task_id,
                        scan_id: history.scan_id,
                        scan_job_id: history.scan_job_id,
                    })
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};
    use std::collections::HashMap;

    fn sample_history(body: &str) -> History {
        History {
            id: HistoryId(1),
            method: "POST".to_string(),
            url: "https://t.example/users".to_string(),
            request_headers: HashMap::new(),
            request_body: Some(body.as_bytes().to_vec()),
            status: 200,
            response_headers: HashMap::new(),
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
    fn applies_only_to_json_object_bodies() {
        let audit = MassAssignmentAudit;
        let point = crate::audits::sentinel_point(&sample_history(r#"{"name":"a"}"#));
        assert!(audit.applies_to(&sample_history(r#"{"name":"a"}"#), &point));
        assert!(!audit.applies_to(&sample_history("not json"), &point));
    }
}
