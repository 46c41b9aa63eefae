//! # open_redirect
//!
//! Named in spec §1's vulnerability list but never given its own §4.2
//! subsection (SPEC_FULL.md §B supplements it). Probes redirect-shaped
//! insertion points with attacker-controlled absolute and
//! protocol-relative URLs, with redirect-following disabled so the
//! `Location` header is observed directly rather than silently followed
//! (spec §4.1: "open-redirect audit disables following").

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, InsertionPointType, IssueCode, ValueType};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::{ExecuteOptions, HistoryCreationOptions, RedirectPolicy, Request};
use crate::insertion_points::create_request_from_insertion_points;
use crate::issues::NewIssue;

const ATTACKER_HOST: &str = "evil.sukyan-test.invalid";

fn redirect_payloads() -> Vec<String> {
    vec![
        format!("https://{ATTACKER_HOST}/"),
        format!("http://{ATTACKER_HOST}/"),
        format!("//{ATTACKER_HOST}/"),
        format!("https://{ATTACKER_HOST}@trusted.example/"),
    ]
}

pub struct OpenRedirectAudit;

impl OpenRedirectAudit {
    fn looks_like_redirect_param(name: &str, value_type: ValueType) -> bool {
        let lower = name.to_ascii_lowercase();
        value_type == ValueType::Url
            || ["redirect", "url", "next", "return", "returnto", "return_to", "dest", "destination", "continue", "callback_url", "target"]
                .iter()
                .any(|candidate| lower.contains(candidate))
    }
}

#[async_trait]
impl Audit for OpenRedirectAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::OpenRedirect
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn applies_to(&self, _history: &History, point: &InsertionPoint) -> bool {
        matches!(point.point_type, InsertionPointType::Parameter | InsertionPointType::Body | InsertionPointType::JsonField)
            && Self::looks_like_redirect_param(&point.name, point.value_type)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "open_redirect", Some(&point.summary())) {
            return Ok(());
        }

        for payload in redirect_payloads() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let request = create_request_from_insertion_points(history, &[(point.clone(), payload.clone())]);
            let options = ExecuteOptions {
                history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                redirects: RedirectPolicy::DoNotFollow,
                ..ExecuteOptions::default()
            };
            let result = ctx.http.execute(&request, &options).await;
            let Some(probe_history) = result.history.filter(|h| !h.is_timeout()) else { continue };

            if !(300..400).contains(&probe_history.status) {
                continue;
            }
            let Some(location) = probe_history.header("location") else { continue };

            if redirects_to_attacker(location) {
                ctx.sink
                    .create(NewIssue {
                        code: IssueCode::OpenRedirect,
                        title: "Open redirect".to_string(),
                        detail: format!(
                            "Insertion point `{}` with payload `{payload}` produced a {} redirect to `{location}`",
                            point.summary(),
                            probe_history.status
                        ),
                        confidence: 85,
                        primary_history: probe_history.id,
                        auxiliary_histories: vec![history.id],
                        payload: None,
                        insertion_point_summary: Some(point.summary()),
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

fn redirects_to_attacker(location: &str) -> bool {
    let normalized = location.trim();
    normalized.contains(ATTACKER_HOST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_redirect_shaped_parameter_names() {
        assert!(OpenRedirectAudit::looks_like_redirect_param("returnTo", ValueType::FreeText));
        assert!(OpenRedirectAudit::looks_like_redirect_param("q", ValueType::Url));
        assert!(!OpenRedirectAudit::looks_like_redirect_param("q", ValueType::FreeText));
    }

    #[test]
    fn detects_attacker_host_in_location() {
        assert!(redirects_to_attacker("https://evil.sukyan-test.invalid/path"));
        assert!(redirects_to_attacker("//evil.sukyan-test.invalid"));
        assert!(!redirects_to_attacker("https://trusted.example/path"));
    }
}
