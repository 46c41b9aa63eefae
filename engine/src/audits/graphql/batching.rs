//! # graphql::batching
//!
//! Probes array batching, alias amplification, and item-count limits
//! (spec §4.2 BatchingAudit). A timing-based signal cross-checks: if a
//! 20-item batch completes in roughly the time of one query, the server
//! is executing the batch's resolvers concurrently rather than serially
//! rate-limiting them.

use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::looks_like_graphql_endpoint;
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::config::ScanMode;
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;

const ALIAS_COUNT: usize = 50;
const BATCH_LIMIT_PROBE: usize = 100;
const TIMING_BATCH_SIZE: usize = 20;
/// A batch running resolvers in parallel finishes within this multiple
/// of a single query's duration; serial execution would take roughly
/// `TIMING_BATCH_SIZE` times as long.
const PARALLEL_TIMING_FACTOR: u32 = 3;

/// Alias amplification and the timing-based parallel-execution signal are
/// "expensive variants" — spec §6 reserves them for fuzz mode.
fn expensive_variants_enabled(scan_mode: ScanMode) -> bool {
    scan_mode == ScanMode::Fuzz
}

fn post_json(history: &History, body: serde_json::Value) -> Request {
    let mut headers = std::collections::HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Request {
        method: "POST".to_string(),
        url: history.url.clone(),
        headers,
        body: Some(serde_json::to_vec(&body).unwrap_or_default()),
    }
}

pub struct BatchingAudit;

impl BatchingAudit {
    async fn send(&self, ctx: &AuditContext<'_>, history: &History, body: serde_json::Value) -> EngineResult<(u16, String)> {
        let request = post_json(history, body);
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let Some(h) = result.history.filter(|h| !h.is_timeout()) else {
            return Err(EngineError::Transport("no response to batching probe".to_string()));
        };
        Ok((h.status, h.response.as_str().unwrap_or_default().to_string()))
    }
}

#[async_trait]
impl Audit for BatchingAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlBatching
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
        if !ctx.dedup.mark_if_new(&history.url, "graphql_batching", None) {
            return Ok(());
        }

        let single_query = serde_json::json!({ "query": "{__typename}" });

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let array_body = serde_json::Value::Array(vec![single_query.clone(); 5]);
        if let Ok((status, body)) = self.send(ctx, history, array_body).await {
            if status < 400 && serde_json::from_str::<serde_json::Value>(&body).map(|v| v.is_array()).unwrap_or(false) {
                self.report(ctx, history, "array batching (5 queries accepted as a JSON array)").await;
                return Ok(());
            }
        }

        let limit_body = serde_json::Value::Array(vec![single_query.clone(); BATCH_LIMIT_PROBE]);
        if let Ok((status, body)) = self.send(ctx, history, limit_body).await {
            if status < 400 && serde_json::from_str::<serde_json::Value>(&body).map(|v| v.is_array()).unwrap_or(false) {
                self.report(ctx, history, &format!("{BATCH_LIMIT_PROBE}-item batch accepted with no limit enforced")).await;
                return Ok(());
            }
        }

        if !expensive_variants_enabled(ctx.config.scan_mode) {
            return Ok(());
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let alias_fields: String = (0..ALIAS_COUNT).map(|i| format!("a{i}: __typename ")).collect();
        let alias_query = serde_json::json!({ "query": format!("{{{alias_fields}}}") });
        if let Ok((status, body)) = self.send(ctx, history, alias_query).await {
            if status < 400 && serde_json::from_str::<serde_json::Value>(&body).ok().and_then(|v| v.get("data").cloned()).is_some() {
                self.report(ctx, history, &format!("alias amplification ({ALIAS_COUNT} aliases accepted)")).await;
                return Ok(());
            }
        }

        let single_elapsed = {
            let started = Instant::now();
            let _ = self.send(ctx, history, single_query.clone()).await;
            started.elapsed()
        };
        let batch_elapsed = {
            let batch_body = serde_json::Value::Array(vec![single_query; TIMING_BATCH_SIZE]);
            let started = Instant::now();
            let _ = self.send(ctx, history, batch_body).await;
            started.elapsed()
        };
        if !single_elapsed.is_zero() && batch_elapsed < single_elapsed * PARALLEL_TIMING_FACTOR {
            self.report(
                ctx,
                history,
                &format!("timing signal: {TIMING_BATCH_SIZE}-item batch ({batch_elapsed:?}) completed within {PARALLEL_TIMING_FACTOR}x a single query ({single_elapsed:?})"),
            )
            .await;
        }

        Ok(())
    }
}

impl BatchingAudit {
    async fn report(&self, ctx: &AuditContext<'_>, history: &History, detail: &str) {
        ctx.sink
            .create(NewIssue {
                code: IssueCode::GraphqlBatchingAbuse,
                title: "GraphQL query batching abuse".to_string(),
                detail: format!("{} allows {detail}", history.url),
                confidence: 80,
                primary_history: history.id,
                auxiliary_histories: vec![],
                payload: None,
                insertion_point_summary: Some("graphql-batching".to_string()),
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
    fn alias_query_produces_fifty_distinct_aliases() {
        let alias_fields: String = (0..ALIAS_COUNT).map(|i| format!("a{i}: __typename ")).collect();
        assert_eq!(alias_fields.matches("__typename").count(), ALIAS_COUNT);
    }

    #[test]
    fn expensive_variants_only_run_in_fuzz_mode() {
        assert!(!expensive_variants_enabled(ScanMode::Fast));
        assert!(!expensive_variants_enabled(ScanMode::Smart));
        assert!(expensive_variants_enabled(ScanMode::Fuzz));
    }
}
