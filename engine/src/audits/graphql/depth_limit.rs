//! # graphql::depth_limit
//!
//! Generic nested-introspection probes at fixed depths, fragment-chain
//! and circular-fragment variants, and — when a schema was discovered —
//! a schema-aware probe built from the deepest cyclic object chain
//! (spec §4.2 DepthLimitAudit). Reports only when the accepted depth
//! reaches the configured minimum (default 8, spec §9).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::graphql::schema::{classify_response, looks_like_graphql_endpoint, GraphQLOutcome, GraphQLSchema};
use crate::audits::{Audit, AuditContext, AuditKind};
use crate::config::ScanMode;
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::issues::NewIssue;

const GENERIC_DEPTHS: [usize; 3] = [8, 12, 20];
const FRAGMENT_CHAIN_DEPTH: usize = 10;

/// Builds `{__schema{types{name}}}` nested `depth` levels deep using the
/// only field every GraphQL server accepts without knowing the schema:
/// introspection's own recursive `ofType` chain.
fn nested_introspection_query(depth: usize) -> String {
    let mut inner = "name".to_string();
    for _ in 0..depth {
        inner = format!("ofType {{ {inner} }}");
    }
    format!("{{__schema{{types{{{inner}}}}}}}")
}

fn fragment_chain_query(depth: usize) -> String {
    let mut fragments = String::new();
    for i in 0..depth {
        let next = if i + 1 < depth { format!("...F{}", i + 1) } else { "name".to_string() };
        fragments.push_str(&format!("fragment F{i} on __Type {{ {next} }}\n"));
    }
    format!("{{__schema{{types{{...F0}}}}}}\n{fragments}")
}

fn circular_fragment_query() -> String {
    "{__schema{types{...A}}} fragment A on __Type { ofType { ...A } }".to_string()
}

/// The schema-aware chain probe is the "expensive variant" spec §6
/// reserves for fuzz mode — it costs a schema-introspection round trip
/// plus a second fetch before the probe itself.
fn schema_aware_depth_enabled(scan_mode: ScanMode) -> bool {
    scan_mode == ScanMode::Fuzz
}

fn schema_aware_query(chain: &[String]) -> String {
    let mut body = "__typename".to_string();
    for field in chain.iter().rev() {
        body = format!("{field} {{ {body} }}");
    }
    format!("query {{ {body} }}")
}

pub struct DepthLimitAudit;

impl DepthLimitAudit {
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
            return Err(EngineError::Transport("no response to depth-limit probe".to_string()));
        };
        Ok(classify_response(h.status, h.response.as_str().unwrap_or_default()))
    }
}

#[async_trait]
impl Audit for DepthLimitAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::GraphqlDepthLimit
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
        if !ctx.dedup.mark_if_new(&history.url, "graphql_depth_limit", None) {
            return Ok(());
        }

        let min_reportable = ctx.config.depth_limit_min_reportable;
        let mut deepest_accepted = 0usize;

        for depth in GENERIC_DEPTHS {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if self.probe(ctx, history, &nested_introspection_query(depth)).await? == GraphQLOutcome::Accepted {
                deepest_accepted = deepest_accepted.max(depth);
            }
        }

        if self.probe(ctx, history, &fragment_chain_query(FRAGMENT_CHAIN_DEPTH)).await? == GraphQLOutcome::Accepted {
            deepest_accepted = deepest_accepted.max(FRAGMENT_CHAIN_DEPTH);
        }

        // Circular-fragment acceptance is itself the finding regardless
        // of a specific depth number: a server that resolves a
        // self-referencing fragment at all has no cycle guard.
        let circular_accepted = self.probe(ctx, history, &circular_fragment_query()).await? == GraphQLOutcome::Accepted;

        if schema_aware_depth_enabled(ctx.config.scan_mode) {
            let schema_chain_depth = if let Some(schema_body) = self.fetch_schema(ctx, history).await {
                GraphQLSchema::parse(&schema_body).map(|schema| {
                    let chain = schema.deepest_cyclic_chain();
                    chain.len()
                })
            } else {
                None
            };

            if let Some(chain_len) = schema_chain_depth {
                if chain_len >= min_reportable {
                    if let Some(schema_body) = self.fetch_schema(ctx, history).await {
                        if let Some(schema) = GraphQLSchema::parse(&schema_body) {
                            let chain = schema.deepest_cyclic_chain();
                            if self.probe(ctx, history, &schema_aware_query(&chain)).await? == GraphQLOutcome::Accepted {
                                deepest_accepted = deepest_accepted.max(chain_len);
                            }
                        }
                    }
                }
            }
        }

        if circular_accepted || deepest_accepted >= min_reportable {
            let detail = if circular_accepted {
                format!("{} resolves a self-referencing circular fragment with no recursion guard", history.url)
            } else {
                format!("{} accepts nested queries to depth {deepest_accepted} (minimum reportable: {min_reportable})", history.url)
            };
            ctx.sink
                .create(NewIssue {
                    code: IssueCode::GraphqlDepthLimitMissing,
                    title: "GraphQL query depth limit missing or too permissive".to_string(),
                    detail,
                    confidence: if circular_accepted { 90 } else { 80 },
                    primary_history: history.id,
                    auxiliary_histories: vec![],
                    payload: None,
                    insertion_point_summary: Some(format!("graphql-depth:{deepest_accepted}")),
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

impl DepthLimitAudit {
    async fn fetch_schema(&self, ctx: &AuditContext<'_>, history: &History) -> Option<String> {
        let query = "{__schema{queryType{name} types{name fields{name type{name ofType{name}}}}}}";
        let mut headers = std::collections::HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let body = serde_json::to_vec(&serde_json::json!({ "query": query })).ok()?;
        let request = Request { method: "POST".to_string(), url: history.url.clone(), headers, body: Some(body) };
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let h = result.history.filter(|h| !h.is_timeout())?;
        h.response.as_str().map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_introspection_query_nests_ofType_n_times() {
        let q = nested_introspection_query(3);
        assert_eq!(q.matches("ofType").count(), 3);
    }

    #[test]
    fn fragment_chain_query_declares_requested_depth_fragments() {
        let q = fragment_chain_query(4);
        assert_eq!(q.matches("fragment F").count(), 4);
    }

    #[test]
    fn schema_aware_query_nests_chain_fields_in_order() {
        let chain = vec!["User".to_string(), "User".to_string()];
        let q = schema_aware_query(&chain);
        let first = q.find("User").unwrap();
        let second = q.rfind("User").unwrap();
        assert!(second > first);
    }

    #[test]
    fn schema_aware_depth_only_enabled_in_fuzz_mode() {
        assert!(!schema_aware_depth_enabled(ScanMode::Fast));
        assert!(!schema_aware_depth_enabled(ScanMode::Smart));
        assert!(schema_aware_depth_enabled(ScanMode::Fuzz));
    }
}
