//! # graphql::introspection
//!
//! Tries the standard schema/type introspection query through several
//! evasions a naive "introspection disabled" check would miss: GET with
//! the query as a URL parameter, aliased field names, whitespace/newline
//! variations, and fragment indirection (spec §4.2 IntrospectionAudit).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::{classify_response, looks_like_graphql_endpoint, GraphQLOutcome};
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;

const BASE_QUERY: &str = "{__schema{types{name}}}";

fn evasions() -> Vec<(&'static str, &'static str)> {
    vec![
        ("literal", "{__schema{types{name}}}"),
        ("aliased", "{s:__schema{t:types{n:name}}}"),
        ("whitespace", "{\n  __schema {\n    types {\n      name\n    }\n  }\n}"),
        ("fragment-indirection", "{__schema{...F}} fragment F on __Schema{types{name}}"),
    ]
}

pub struct IntrospectionAudit;

impl IntrospectionAudit {
    async fn probe_post(&self, ctx: &AuditContext<'_>, history: &History, query: &str) -> EngineResult<(u16, String)> {
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
            return Err(EngineError::Transport("no response to introspection probe".to_string()));
        };
        let body = h.response.as_str().unwrap_or_default().to_string();
        Ok((h.status, body))
    }

    async fn probe_get(&self, ctx: &AuditContext<'_>, history: &History, query: &str) -> EngineResult<(u16, String)> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let sep = if history.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{sep}query={encoded}", history.url);
        let request = Request::get(url);
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let Some(h) = result.history.filter(|h| !h.is_timeout()) else {
            return Err(EngineError::Transport("no response to introspection probe".to_string()));
        };
        let body = h.response.as_str().unwrap_or_default().to_string();
        Ok((h.status, body))
    }
}

#[async_trait]
impl Audit for IntrospectionAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlIntrospection
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
        if !ctx.dedup.mark_if_new(&history.url, "graphql_introspection", None) {
            return Ok(());
        }

        // GET-with-query-param first; it alone reveals a server that
        // forgot GraphQL is also reachable that way.
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let Ok((status, body)) = self.probe_get(ctx, history, BASE_QUERY).await {
            if classify_response(status, &body) == GraphQLOutcome::Accepted {
                self.report(ctx, history, "GET query parameter").await;
                return Ok(());
            }
        }

        for (label, query) in evasions() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let (status, body) = self.probe_post(ctx, history, query).await?;
            if classify_response(status, &body) == GraphQLOutcome::Accepted {
                self.report(ctx, history, label).await;
                return Ok(());
            }
        }

        Ok(())
    }
}

impl IntrospectionAudit {
    async fn report(&self, ctx: &AuditContext<'_>, history: &History, evasion: &str) {
        ctx.sink
            .create(NewIssue {
                code: IssueCode::GraphqlIntrospectionEnabled,
                title: "GraphQL introspection enabled".to_string(),
                detail: format!("Introspection query succeeded against {} via the `{evasion}` evasion", history.url),
                confidence: 95,
                primary_history: history.id,
                auxiliary_histories: vec![],
                payload: None,
                insertion_point_summary: Some(format!("graphql-evasion:{evasion}")),
                workspace_id: history.workspace_id,
                task_id: history.task_id,
                scan_id: history.scan_id,
                scan_job_id: history.scan_job_id,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evasions_all_contain_schema_query() {
        for (_, query) in evasions() {
            assert!(query.contains("__schema"));
        }
    }
}
