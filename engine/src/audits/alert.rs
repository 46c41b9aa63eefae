//! # alert
//!
//! Reflected XSS & CSTI verification via dialog events (spec §4.2
//! AlertAudit). Validates that the unmodified target does not already
//! raise an alert, then for each (insertion-point, payload) pair in a
//! bounded worker pool navigates a browser to the mutated request and
//! observes dialog events — falling back to synthetic user-interaction
//! events for `on*`-style payloads that need a trigger.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::browser::SyntheticInteraction;
use crate::error::{EngineError, EngineResult};
use crate::insertion_points::create_request_from_insertion_points;
use crate::issues::NewIssue;
use crate::payloads::catalog::{self, CspPosture};

const MARKER_PREFIX: &str = "M_";

fn fresh_marker() -> String {
    format!("{MARKER_PREFIX}{:08x}", rand::random::<u32>())
}

pub struct AlertAudit;

impl AlertAudit {
    /// Spec §4.2: "performs one `requestHasAlert` pre-check that itself
    /// drives a navigation; this is intentional (prevents false
    /// positives) and should not be skipped silently." Returns `true`
    /// if the unmodified target already raises a dialog on its own.
    async fn request_has_alert(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        cancel: &CancellationToken,
    ) -> EngineResult<bool> {
        let Some(pool) = ctx.browser else { return Ok(false) };
        let mut handle = pool.acquire(cancel).await?;
        handle.page_mut().navigate(&history.url, false).await?;
        let dialog = handle.page_mut().wait_for_dialog(ctx.config.timeouts.dialog_fast_path).await;
        Ok(dialog.is_some())
    }
}

#[async_trait]
impl Audit for AlertAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Alert
    }

    fn default_concurrency(&self) -> usize {
        3
    }

    fn applies_to(&self, _history: &History, point: &InsertionPoint) -> bool {
        catalog::xss_eligible(point.point_type, crate::config::ScanMode::Smart) && (point.is_reflected || point.is_dynamic)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if ctx.browser.is_none() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if !ctx.dedup.mark_if_new(&history.url, "alert", Some(&point.summary())) {
            return Ok(());
        }

        if self.request_has_alert(ctx, history, cancel).await? {
            // The page alerts on its own; any dialog observed later
            // can't be attributed to our payload.
            return Ok(());
        }

        let csp = CspPosture::from_header(history.header("content-security-policy"));
        let payloads = catalog::xss_payloads(&csp, point.reflection.as_ref().map(|r| r.context));

        for payload in payloads {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let marker = fresh_marker();
            let value = match &payload {
                sukyan_types::Payload::Generator { template, .. } => template.replace("{marker}", &marker),
                other => other.get_value(),
            };

            let request = create_request_from_insertion_points(history, &[(point.clone(), value.clone())]);
            let url_for_browser = request.url.clone();

            let Some(pool) = ctx.browser else { return Ok(()) };
            let mut handle = pool.acquire(cancel).await?;
            handle.page_mut().navigate(&url_for_browser, false).await?;

            let mut dialog = handle.page_mut().wait_for_dialog(ctx.config.timeouts.dialog_fast_path).await;

            if dialog.is_none() {
                for interaction in
                    [SyntheticInteraction::Click, SyntheticInteraction::Hover, SyntheticInteraction::Focus, SyntheticInteraction::Keyboard]
                {
                    handle.page_mut().fire_synthetic_interaction(interaction).await.ok();
                }
                dialog = handle.page_mut().wait_for_dialog(ctx.config.timeouts.dialog_slow_path).await;
            }

            if let Some(dialog) = dialog {
                if dialog.message.contains(&marker) {
                    ctx.sink
                        .create(NewIssue {
                            code: IssueCode::XssReflected,
                            title: "Reflected cross-site scripting".to_string(),
                            detail: format!(
                                "Payload `{value}` at insertion point `{}` raised a `{}` dialog: {}",
                                point.summary(),
                                dialog.dialog_type,
                                dialog.message
                            ),
                            confidence: 90,
                            primary_history: history.id,
                            auxiliary_histories: vec![],
                            payload: Some(sukyan_types::Payload::Static { value, match_marker: Some(marker) }),
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
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::InsertionPointType;

    #[test]
    fn xss_eligible_points_pass_applies_to() {
        let audit = AlertAudit;
        let mut point = InsertionPoint::new("q", InsertionPointType::Parameter, "x");
        point.is_reflected = true;
        let history = sample_history();
        assert!(audit.applies_to(&history, &point));
    }

    #[test]
    fn non_reflected_non_dynamic_points_are_skipped() {
        let audit = AlertAudit;
        let point = InsertionPoint::new("q", InsertionPointType::Parameter, "x");
        let history = sample_history();
        assert!(!audit.applies_to(&history, &point));
    }

    fn sample_history() -> History {
        use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};
        History {
            id: HistoryId(1),
            method: "GET".to_string(),
            url: "https://t.example/".to_string(),
            request_headers: Default::default(),
            request_body: None,
            status: 200,
            response_headers: Default::default(),
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
}
