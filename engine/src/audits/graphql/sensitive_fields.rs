//! # graphql::sensitive_fields
//!
//! Probes a catalog of field names grouped by category and severity
//! (spec §4.2 SensitiveFieldsAudit) and reports a single consolidated
//! issue listing every discovery by severity, rather than one issue per
//! field — the point is the aggregate exposure, not each field in
//! isolation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::{classify_response, looks_like_graphql_endpoint, GraphQLOutcome};
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;
use crate::payloads::catalog::{self, SensitiveFieldSeverity};

pub struct SensitiveFieldsAudit;

impl SensitiveFieldsAudit {
    async fn probe(&self, ctx: &AuditContext<'_>, history: &History, field: &str) -> EngineResult<GraphQLOutcome> {
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let query = format!("{{{field}}}");
        let body = serde_json::to_vec(&serde_json::json!({ "query": query })).map_err(|e| EngineError::Internal(e.to_string()))?;
        let request = Request { method: "POST".to_string(), url: history.url.clone(), headers, body: Some(body) };
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let Some(h) = result.history.filter(|h| !h.is_timeout()) else {
            return Err(EngineError::Transport("no response to sensitive-field probe".to_string()));
        };
        Ok(classify_response(h.status, h.response.as_str().unwrap_or_default()))
    }
}

#[async_trait]
impl Audit for SensitiveFieldsAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlSensitiveFields
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        looks_like_graphql_endpoint(history)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "graphql_sensitive_fields", None) {
            return Ok(());
        }

        let mut discoveries: Vec<(&'static str, &'static str, SensitiveFieldSeverity)> = Vec::new();
        for (field, category, severity) in catalog::graphql_sensitive_fields() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.probe(ctx, history, field).await? == GraphQLOutcome::Accepted {
                discoveries.push((field, category, severity));
            }
        }

        if discoveries.is_empty() {
            return Ok(());
        }

        discoveries.sort_by(|a, b| b.2.cmp(&a.2));
        let highest = discoveries[0].2;
        let detail = discoveries
            .iter()
            .map(|(field, category, severity)| format!("{field} ({category}, {severity:?})"))
            .collect::<Vec<_>>()
            .join(", ");

        ctx.sink
            .create(NewIssue {
                code: IssueCode::GraphqlSensitiveFieldExposed,
                title: "Sensitive GraphQL fields exposed".to_string(),
                detail: format!("{} exposes queryable fields: {detail}", history.url),
                confidence: confidence_for(highest),
                primary_history: history.id,
                auxiliary_histories: vec![],
                payload: None,
                insertion_point_summary: Some(format!("graphql-sensitive-fields:{}", discoveries.len())),
                workspace_id: history.workspace_id,
                task_id: history.task_id,
                scan_id: history.scan_id,
                scan_job_id: history.scan_job_id,
            })
            .await;

        Ok(())
    }
}

fn confidence_for(severity: SensitiveFieldSeverity) -> u8 {
    match severity {
        SensitiveFieldSeverity::High => 85,
        SensitiveFieldSeverity::Medium => 70,
        SensitiveFieldSeverity::Low => 55,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_tracks_highest_observed_severity() {
        assert_eq!(confidence_for(SensitiveFieldSeverity::High), 85);
        assert_eq!(confidence_for(SensitiveFieldSeverity::Low), 55);
    }
}
