//! # graphql::field_suggestions
//!
//! Queries deliberately-misspelled field names and looks for a server's
//! own "Did you mean" suggestion leaking the real field name back (spec
//! §4.2 FieldSuggestionsAudit).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::looks_like_graphql_endpoint;
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;
use crate::payloads::catalog;

/// Extracts the suggested field name out of a `Did you mean "x"?`-style
/// message, tolerating the single- or double-quote variants different
/// GraphQL server implementations use.
fn extract_suggestion(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    let marker = "did you mean ";
    let idx = lower.find(marker)?;
    let rest = &message[idx + marker.len()..];
    let quote = rest.chars().find(|c| *c == '"' || *c == '\'')?;
    let after_quote = &rest[rest.find(quote)? + 1..];
    let end = after_quote.find(quote)?;
    Some(after_quote[..end].to_string())
}

pub struct FieldSuggestionsAudit;

impl FieldSuggestionsAudit {
    async fn probe(&self, ctx: &AuditContext<'_>, history: &History, typo: &str) -> EngineResult<Vec<String>> {
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let query = format!("{{{typo}}}");
        let body = serde_json::to_vec(&serde_json::json!({ "query": query })).map_err(|e| EngineError::Internal(e.to_string()))?;
        let request = Request { method: "POST".to_string(), url: history.url.clone(), headers, body: Some(body) };
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let Some(h) = result.history.filter(|h| !h.is_timeout()) else {
            return Err(EngineError::Transport("no response to field-suggestion probe".to_string()));
        };
        let Some(body) = h.response.as_str() else { return Ok(vec![]) };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else { return Ok(vec![]) };
        let Some(errors) = value.get("errors").and_then(|e| e.as_array()) else { return Ok(vec![]) };

        Ok(errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .filter_map(extract_suggestion)
            .collect())
    }
}

#[async_trait]
impl Audit for FieldSuggestionsAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlFieldSuggestions
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
        if !ctx.dedup.mark_if_new(&history.url, "graphql_field_suggestions", None) {
            return Ok(());
        }

        let mut leaked = Vec::new();
        for typo in catalog::graphql_field_typos() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            leaked.extend(self.probe(ctx, history, typo).await?);
        }

        if !leaked.is_empty() {
            leaked.sort();
            leaked.dedup();
            ctx.sink
                .create(NewIssue {
                    code: IssueCode::GraphqlFieldSuggestionsLeak,
                    title: "GraphQL field-suggestion information disclosure".to_string(),
                    detail: format!("{} leaked real field names via \"Did you mean\" suggestions: {}", history.url, leaked.join(", ")),
                    confidence: 70,
                    primary_history: history.id,
                    auxiliary_histories: vec![],
                    payload: None,
                    insertion_point_summary: Some("graphql-field-suggestions".to_string()),
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
    fn extracts_double_quoted_suggestion() {
        let msg = r#"Cannot query field "usr" on type "Query". Did you mean "user"?"#;
        assert_eq!(extract_suggestion(msg), Some("user".to_string()));
    }

    #[test]
    fn extracts_single_quoted_suggestion() {
        let msg = "Cannot query field 'emial'. Did you mean 'email'?";
        assert_eq!(extract_suggestion(msg), Some("email".to_string()));
    }

    #[test]
    fn returns_none_without_suggestion_phrase() {
        assert_eq!(extract_suggestion("Cannot query field \"usr\"."), None);
    }
}
