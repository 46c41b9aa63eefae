//! # cspp
//!
//! Client-side prototype pollution (spec §4.2 CSPP). With a separator
//! chosen by URL shape, appends four polluting payloads and reads
//! `window.sukyan`; on success, fingerprints the page against a map of
//! known gadget libraries and emits an issue carrying canned exploit
//! payloads when matched.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::issues::NewIssue;
use crate::payloads::catalog;

/// Known gadget libraries fingerprinted by the presence of a page-global
/// (spec glossary: "Gadget — a named library idiom that converts
/// prototype pollution into code execution; fingerprinted by the
/// presence of globals in the page").
fn gadget_fingerprints() -> &'static [(&'static str, &'static str, &'static str)] {
    &[
        ("jQuery", "typeof window.jQuery !== 'undefined'", "$.fn.init.prototype.sukyan=alert"),
        ("Vue", "typeof window.Vue !== 'undefined'", "Object.prototype.sukyan=alert"),
        ("Lodash", "typeof window._ !== 'undefined' && typeof window._.template === 'function'", "_.template('<%= sukyan %>')"),
    ]
}

/// Chooses the separator a polluting payload should be appended with,
/// based on whether the URL already has a query string or a fragment.
fn separator_for(url: &str) -> char {
    if url.contains('#') {
        '#'
    } else if url.contains('?') {
        '&'
    } else {
        '?'
    }
}

pub struct CsppAudit;

#[async_trait]
impl Audit for CsppAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Cspp
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, _history: &History, _point: &InsertionPoint) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let Some(pool) = ctx.browser else { return Ok(()) };
        if !ctx.dedup.mark_if_new(&history.url, "cspp", None) {
            return Ok(());
        }

        let separator = separator_for(&history.url);
        let timeout = ctx.config.timeouts.navigation * 4;

        let outcome = tokio::time::timeout(timeout, async {
            for payload in catalog::cspp_payloads(separator) {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }

                let url = format!("{}{payload}", history.url);
                let mut handle = pool.acquire(cancel).await?;
                handle.page_mut().navigate(&url, false).await?;
                let polluted = handle.page_mut().eval("window.sukyan").await?;

                if polluted == serde_json::Value::String("reserved".to_string()) {
                    let mut matched_gadgets = Vec::new();
                    for (name, probe, exploit) in gadget_fingerprints() {
                        if handle.page_mut().eval(probe).await.ok() == Some(serde_json::Value::Bool(true)) {
                            matched_gadgets.push((*name, *exploit));
                        }
                    }

                    let detail = if matched_gadgets.is_empty() {
                        format!("Polluting `{payload}` on {} set window.sukyan, but no known gadget library was fingerprinted", history.url)
                    } else {
                        let gadgets: Vec<String> = matched_gadgets.iter().map(|(n, e)| format!("{n} (`{e}`)")).collect();
                        format!("Polluting `{payload}` on {} set window.sukyan; candidate gadgets: {}", history.url, gadgets.join(", "))
                    };

                    ctx.sink
                        .create(NewIssue {
                            code: IssueCode::Cspp,
                            title: "Client-side prototype pollution".to_string(),
                            detail,
                            confidence: if matched_gadgets.is_empty() { 70 } else { 90 },
                            primary_history: history.id,
                            auxiliary_histories: vec![],
                            payload: None,
                            insertion_point_summary: Some(format!("query:{payload}")),
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
        })
        .await;

        match outcome {
            Ok(inner) => inner,
            Err(_) => Err(EngineError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooses_separator_by_url_shape() {
        assert_eq!(separator_for("https://t.example/"), '?');
        assert_eq!(separator_for("https://t.example/?a=1"), '&');
        assert_eq!(separator_for("https://t.example/#frag"), '#');
    }
}
