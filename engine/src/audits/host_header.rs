//! # host_header
//!
//! Embeds an OOB payload in the Host-family of headers and registers an
//! `OOBTest` (spec §4.2 HostHeaderAudit). Deliberately keeps its own
//! header list rather than sharing Log4Shell's — per spec §9's open
//! question, "some audit modules duplicate default header lists
//! (Log4Shell vs Host-Header); the core design treats them as
//! independent sets — do not unify without explicit direction."

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint};

use crate::audits::{sentinel_point, Audit, AuditContext, AuditKind};
use crate::error::EngineResult;
use crate::http::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::oob::new_oob_test;

const OOB_TEMPLATE: &str = "{domain}";

/// Header names a reverse proxy or virtual-host router might trust over
/// (or in addition to) the real `Host` header.
fn host_family_headers() -> &'static [&'static str] {
    &["Host", "X-Forwarded-Host", "X-Host", "X-Forwarded-Server", "X-HTTP-Host-Override"]
}

pub struct HostHeaderAudit;

#[async_trait]
impl Audit for HostHeaderAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::HostHeader
    }

    fn default_concurrency(&self) -> usize {
        10
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
        for header_name in host_family_headers() {
            if cancel.is_cancelled() {
                return Err(crate::error::EngineError::Cancelled);
            }
            if !ctx.dedup.mark_if_new(&history.url, "host_header", Some(header_name)) {
                continue;
            }

            let oob = ctx.oob.get_url();
            let payload_value = oob.get_value(OOB_TEMPLATE);

            let mut headers = history.request_headers.clone();
            headers.insert(header_name.to_string(), payload_value.clone());

            let request = Request { method: history.method.clone(), url: history.url.clone(), headers, body: history.request_body.clone() };
            let options = ExecuteOptions {
                history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
                ..ExecuteOptions::default()
            };
            let result = ctx.http.execute(&request, &options).await;
            let originating_history = result.history.map(|h| h.id).unwrap_or(history.id);

            let test = new_oob_test(
                sukyan_types::IssueCode::HostHeaderInjection,
                &oob,
                history.url.clone(),
                Some(format!("header:{header_name}")),
                payload_value,
                originating_history,
                history.workspace_id,
                history.task_id,
                history.scan_id,
            );
            ctx.oob.register(test).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_applies_as_history_level() {
        let audit = HostHeaderAudit;
        assert!(audit.is_history_level());
        assert_eq!(host_family_headers().len(), 5);
    }
}
