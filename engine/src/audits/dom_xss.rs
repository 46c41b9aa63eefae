//! # dom_xss
//!
//! For each DOM-XSS source and each CSP-filtered payload, loads the page
//! in an incognito browser context with a taint-tracking script injected
//! before any page script runs, then reads console and dialog events in
//! parallel for a marker-tagged sink hit (spec §4.2 DOMXSSAudit).

use async_trait::async_trait;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::issues::NewIssue;
use crate::payloads::catalog::{self, CspPosture};

const BASELINE_TIMEOUT: Duration = Duration::from_secs(2);
const SCRIPT_COUNT_DOUBLING_THRESHOLD: usize = 20;

/// DOM-XSS sources, per spec §4.2: "location.hash, location.search,
/// localStorage, sessionStorage, window.name, document.cookie,
/// postMessage, document.referrer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomXssSource {
    LocationHash,
    LocationSearch,
    LocalStorage,
    SessionStorage,
    WindowName,
    DocumentCookie,
    PostMessage,
    DocumentReferrer,
}

impl DomXssSource {
    pub fn all() -> &'static [DomXssSource] {
        use DomXssSource::*;
        &[LocationHash, LocationSearch, LocalStorage, SessionStorage, WindowName, DocumentCookie, PostMessage, DocumentReferrer]
    }

    fn is_storage(&self) -> bool {
        matches!(self, DomXssSource::LocalStorage | DomXssSource::SessionStorage)
    }

    fn label(&self) -> &'static str {
        match self {
            DomXssSource::LocationHash => "location.hash",
            DomXssSource::LocationSearch => "location.search",
            DomXssSource::LocalStorage => "localStorage",
            DomXssSource::SessionStorage => "sessionStorage",
            DomXssSource::WindowName => "window.name",
            DomXssSource::DocumentCookie => "document.cookie",
            DomXssSource::PostMessage => "postMessage",
            DomXssSource::DocumentReferrer => "document.referrer",
        }
    }
}

/// The marker-tagged taint-tracking script: hooks `innerHTML`,
/// `outerHTML`, `document.write`, `eval`, string-`setTimeout`/
/// `setInterval`, `Function`, `location`, and jQuery's `.html()`, and
/// `console.log`s a `SUKYAN_TAINT:<sink>:<marker>` line whenever a
/// marked value reaches one (spec §4.2: "hooked sinks ... emit a
/// marker-tagged console message when the marked source value reaches
/// them").
fn taint_tracking_script(marker: &str) -> String {
    format!(
        r#"(function(){{
  const MARKER = "{marker}";
  const report = (sink) => console.log("SUKYAN_TAINT:" + sink + ":" + MARKER);
  const wrap = (obj, prop, sink) => {{
    const desc = Object.getOwnPropertyDescriptor(obj, prop);
    if (!desc || !desc.set) return;
    Object.defineProperty(obj, prop, {{
      set(v) {{ if (typeof v === "string" && v.includes(MARKER)) report(sink); return desc.set.call(this, v); }},
      get: desc.get,
    }});
  }};
  wrap(Element.prototype, "innerHTML", "innerHTML");
  wrap(Element.prototype, "outerHTML", "outerHTML");
  const origWrite = document.write;
  document.write = function(s) {{ if (String(s).includes(MARKER)) report("document.write"); return origWrite.apply(this, arguments); }};
  const origEval = window.eval;
  window.eval = function(s) {{ if (String(s).includes(MARKER)) report("eval"); return origEval.apply(this, arguments); }};
  const origFn = window.Function;
  window.Function = new Proxy(origFn, {{ construct(target, args) {{ if (args.some(a => String(a).includes(MARKER))) report("Function"); return Reflect.construct(target, args); }} }});
}})();"#
    )
}

pub struct DomXssAudit;

impl DomXssAudit {
    fn per_source_timeout(&self, script_count: usize) -> Duration {
        if script_count > SCRIPT_COUNT_DOUBLING_THRESHOLD {
            BASELINE_TIMEOUT * 2
        } else {
            BASELINE_TIMEOUT
        }
    }
}

#[async_trait]
impl Audit for DomXssAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::DomXss
    }

    fn default_concurrency(&self) -> usize {
        3
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

        let overall = tokio::time::timeout(ctx.config.timeouts.dom_xss_overall, async {
            for source in DomXssSource::all() {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                if !ctx.dedup.mark_if_new(&history.url, "dom_xss", Some(source.label())) {
                    continue;
                }

                let csp = CspPosture::from_header(history.header("content-security-policy"));
                let payloads = catalog::xss_payloads(&csp, None);
                for payload in payloads.into_iter().take(2) {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }

                    let marker = format!("M_{:08x}", rand::random::<u32>());
                    let value = match &payload {
                        sukyan_types::Payload::Generator { template, .. } => template.replace("{marker}", &marker),
                        other => other.get_value(),
                    };

                    let mut handle = pool.acquire(cancel).await?;
                    handle.page_mut().inject_script_before_load(&taint_tracking_script(&marker)).await?;

                    if source.is_storage() {
                        handle.page_mut().navigate(&history.url, true).await?;
                        let storage_api = match source {
                            DomXssSource::LocalStorage => "localStorage",
                            DomXssSource::SessionStorage => "sessionStorage",
                            _ => unreachable!(),
                        };
                        handle
                            .page_mut()
                            .eval(&format!("{storage_api}.setItem('sukyan', {:?})", value))
                            .await?;
                        handle.page_mut().reload().await?;
                    } else {
                        let url = apply_source(&history.url, *source, &value);
                        handle.page_mut().navigate(&url, true).await?;
                    }

                    let script_count = handle.page_mut().script_count().await;
                    let timeout = self.per_source_timeout(script_count);

                    let (console_events, dialog) = tokio::join!(
                        handle.page_mut().wait_for_console(timeout),
                        handle.page_mut().wait_for_dialog(timeout)
                    );

                    let sink_hit = console_events
                        .iter()
                        .find(|e| e.text.contains(&marker) && e.text.contains("SUKYAN_TAINT"))
                        .map(|e| e.text.clone());

                    if sink_hit.is_some() || dialog.is_some() {
                        let sink_label = sink_hit
                            .as_deref()
                            .and_then(|t| t.split(':').nth(1))
                            .unwrap_or("dialog")
                            .to_string();
                        ctx.sink
                            .create(NewIssue {
                                code: IssueCode::XssDom,
                                title: "DOM-based cross-site scripting".to_string(),
                                detail: format!(
                                    "Tainted value from `{}` reached sink `{sink_label}` at {}",
                                    source.label(),
                                    history.url
                                ),
                                confidence: 90,
                                primary_history: history.id,
                                auxiliary_histories: vec![],
                                payload: Some(sukyan_types::Payload::Static { value, match_marker: Some(marker) }),
                                insertion_point_summary: Some(format!("dom-source:{}", source.label())),
                                workspace_id: history.workspace_id,
                                task_id: history.task_id,
                                scan_id: history.scan_id,
                                scan_job_id: history.scan_job_id,
                            })
                            .await;
                        break;
                    }
                }
            }
            Ok(())
        })
        .await;

        match overall {
            Ok(inner) => inner,
            Err(_) => Err(EngineError::Timeout(ctx.config.timeouts.dom_xss_overall)),
        }
    }
}

fn apply_source(url: &str, source: DomXssSource, value: &str) -> String {
    let base = url.split(['#', '?']).next().unwrap_or(url);
    match source {
        DomXssSource::LocationHash => format!("{base}#{value}"),
        DomXssSource::LocationSearch => format!("{base}?{value}"),
        DomXssSource::WindowName | DomXssSource::DocumentCookie | DomXssSource::PostMessage | DomXssSource::DocumentReferrer => url.to_string(),
        DomXssSource::LocalStorage | DomXssSource::SessionStorage => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_timeout_above_script_threshold() {
        let audit = DomXssAudit;
        assert_eq!(audit.per_source_timeout(5), BASELINE_TIMEOUT);
        assert_eq!(audit.per_source_timeout(21), BASELINE_TIMEOUT * 2);
    }

    #[test]
    fn hash_source_appends_fragment() {
        let url = apply_source("https://t.example/page", DomXssSource::LocationHash, "X");
        assert_eq!(url, "https://t.example/page#X");
    }

    #[test]
    fn storage_sources_keep_url_untouched_for_navigation() {
        let url = apply_source("https://t.example/page?a=1", DomXssSource::LocalStorage, "X");
        assert_eq!(url, "https://t.example/page?a=1");
    }
}
