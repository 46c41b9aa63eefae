//! # graphql::directives
//!
//! Probes repeated, conflicting, unknown, and misplaced directive usage
//! (spec §4.2 DirectivesAudit) — servers that accept any of these
//! without validation error are treating client-supplied directives more
//! permissively than the GraphQL spec allows, which has been used to
//! bypass query-cost analysis that only inspects the unexpanded AST.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::{classify_response, looks_like_graphql_endpoint, GraphQLOutcome};
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;

fn directive_probes() -> Vec<(&'static str, &'static str)> {
    vec![
        ("repeated", "{__typename @include(if: true) @include(if: true)}"),
        ("conflicting", "{__typename @include(if: true) @skip(if: true)}"),
        ("unknown", "{__typename @sukyanUnknownDirective}"),
        ("misplaced", "query @include(if: true) {__typename}"),
    ]
}

pub struct DirectivesAudit;

impl DirectivesAudit {
    async fn probe(&self, ctx: &AuditContext<'_>, history: &History, query: &str) -> EngineResult<GraphQLOutcome> {
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let body = serde_json::to_vec(&serde_json::json!({ "query": query })).map_err(|e| EngineError::Internal(e.to_string()))?;
        let request = Request { method: "POST".to_string(), url: history.url.clone(), headers, body: Some(body) };
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let Some(h) = result.history.filter(|h| !h.is_timeout()) else {
            return Err(EngineError::Transport("no response to directive probe".to_string()));
        };
        Ok(classify_response(h.status, h.response.as_str().unwrap_or_default()))
    }
}

#[async_trait]
impl Audit for DirectivesAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlDirectives
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
        if !ctx.dedup.mark_if_new(&history.url, "graphql_directives", None) {
            return Ok(());
        }

        // Unknown and misplaced directives *should* be rejected by any
        // spec-compliant server; accepting them is itself the finding.
        // Repeated/conflicting directives are legal GraphQL but are
        // frequently mishandled by hand-rolled cost analyzers.
        let mut accepted_unexpected = Vec::new();
        for (label, query) in directive_probes() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.probe(ctx, history, query).await? == GraphQLOutcome::Accepted {
                accepted_unexpected.push(label);
            }
        }

        if !accepted_unexpected.is_empty() {
            ctx.sink
                .create(NewIssue {
                    code: IssueCode::GraphqlDirectiveAbuse,
                    title: "GraphQL directive handling too permissive".to_string(),
                    detail: format!("{} accepted directive probes it should reject or that bypass cost analysis: {}", history.url, accepted_unexpected.join(", ")),
                    confidence: 65,
                    primary_history: history.id,
                    auxiliary_histories: vec![],
                    payload: None,
                    insertion_point_summary: Some("graphql-directives".to_string()),
                    workspace_id: history.workspace_id,
                    task_id: history.task_id,
                    scan_id: history.scan_id,
                    scan_job_id: history.scan_job_id,
                })
                .await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_probes_cover_all_four_categories() {
        let labels: Vec<&str> = directive_probes().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["repeated", "conflicting", "unknown", "misplaced"]);
    }
}
