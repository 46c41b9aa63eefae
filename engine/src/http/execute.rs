//! # execute
//!
//! `execute(request, options) -> ExecuteResult` — the HTTP Execution
//! component's sole entrypoint (spec §4.1). Builds a request from
//! captured history (or from a re-emitted `Request`), executes it with
//! the chosen transport, and records the response as a `History`.
//!
//! Retry/backoff for transient *connect*-phase failures follows the
//! other_examples HTTP-retry reference (`paw`'s `engine/http.rs`):
//! exponential backoff with jitter, capped attempts. It is deliberately
//! never applied once a request has reached the server, to avoid
//! duplicate side effects on non-idempotent endpoints.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use sukyan_types::{History, HistoryId, HistorySource, ResponseData};
use sukyan_types::{ScanId, ScanJobId, TaskId, WorkspaceId};

use crate::error::{EngineError, EngineResult};

const MAX_CONNECT_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 250;
const MAX_RETRY_DELAY_MS: u64 = 4_000;

/// A request ready to execute — either built fresh by an audit or
/// re-emitted from an `InsertionPoint` substitution.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: "GET".to_string(), url: url.into(), headers: HashMap::new(), body: None }
    }
}

/// How the produced `History` should be tagged, and whether the request
/// body stream should be cloned into it (spec §4.1:
/// "history-creation-options (source, workspace/task/scan, whether to
/// clone the body stream)").
#[derive(Debug, Clone)]
pub struct HistoryCreationOptions {
    pub source: HistorySource,
    pub workspace_id: WorkspaceId,
    pub task_id: Option<TaskId>,
    pub scan_id: Option<ScanId>,
    pub scan_job_id: Option<ScanJobId>,
    pub clone_body: bool,
}

impl HistoryCreationOptions {
    pub fn scanner(workspace_id: WorkspaceId) -> Self {
        Self {
            source: HistorySource::Scanner,
            workspace_id,
            task_id: None,
            scan_id: None,
            scan_job_id: None,
            clone_body: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    Follow,
    /// Used by the open-redirect audit: the component must see the raw
    /// `Location` header rather than having reqwest silently follow it
    /// (spec §4.1: "Redirect behavior per-audit: open-redirect audit
    /// disables following; all other audits use the default").
    DoNotFollow,
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub create_history: bool,
    pub history_options: Option<HistoryCreationOptions>,
    pub timeout: Duration,
    pub redirects: RedirectPolicy,
    pub accept_invalid_certs: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            create_history: true,
            history_options: None,
            timeout: Duration::from_secs(30),
            redirects: RedirectPolicy::Follow,
            accept_invalid_certs: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecuteResult {
    pub history: Option<History>,
    pub error: Option<String>,
    pub duration: Duration,
    pub response_data: Option<ResponseData>,
}

impl ExecuteResult {
    pub fn succeeded(&self) -> bool {
        self.history.as_ref().map(|h| !h.is_timeout()).unwrap_or(false)
    }
}

/// Executes `request` against `client`, honoring `options`. Never returns
/// `Err`: transport errors, timeouts and body-read failures are all
/// surfaced inside `ExecuteResult` so the orchestrator and every audit
/// can treat "no verdict" uniformly rather than matching on a `Result`
/// (spec §4.1: "Failures: transport error, timeout, body-read error. None
/// is fatal to the orchestrator").
pub async fn execute(client: &reqwest::Client, request: &Request, options: &ExecuteOptions) -> ExecuteResult {
    let started = Instant::now();

    let result = tokio::time::timeout(options.timeout, send_with_retry(client, request, options)).await;

    let elapsed = started.elapsed();

    match result {
        Err(_) => {
            // Deadline elapsed: synthesize a timeout history so OOB
            // correlation still has request context (spec §4.1).
            let history = options.create_history.then(|| {
                let opts = options
                    .history_options
                    .clone()
                    .unwrap_or_else(|| HistoryCreationOptions::scanner(WorkspaceId::new()));
                History::timeout(&request.method, &request.url, opts.workspace_id, elapsed)
            });
            ExecuteResult { history, error: Some("timeout".to_string()), duration: elapsed, response_data: None }
        }
        Ok(Ok((response_data, history))) => {
            ExecuteResult { history: Some(history), error: None, duration: elapsed, response_data: Some(response_data) }
        }
        Ok(Err(e)) => {
            let history = options.create_history.then(|| {
                let opts = options
                    .history_options
                    .clone()
                    .unwrap_or_else(|| HistoryCreationOptions::scanner(WorkspaceId::new()));
                History::timeout(&request.method, &request.url, opts.workspace_id, elapsed)
            });
            ExecuteResult { history, error: Some(e.to_string()), duration: elapsed, response_data: None }
        }
    }
}

async fn send_with_retry(
    client: &reqwest::Client,
    request: &Request,
    options: &ExecuteOptions,
) -> EngineResult<(ResponseData, History)> {
    let mut attempt = 0;
    loop {
        match send_once(client, request, options).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < MAX_CONNECT_RETRIES && is_connect_phase_failure(&e) => {
                attempt += 1;
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_connect_phase_failure(err: &EngineError) -> bool {
    matches!(err, EngineError::Transport(msg) if msg.contains("connect") || msg.contains("dns"))
}

fn retry_delay(attempt: u32) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt));
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    let jitter_range = (capped_ms / 4).max(1);
    let jittered = capped_ms + rand::thread_rng().gen_range(0..jitter_range);
    Duration::from_millis(jittered)
}

async fn send_once(
    client: &reqwest::Client,
    request: &Request,
    options: &ExecuteOptions,
) -> EngineResult<(ResponseData, History)> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| EngineError::Internal(format!("invalid method: {e}")))?;

    let mut builder = client.request(method, &request.url);
    for (k, v) in &request.headers {
        builder = builder.header(k, v);
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }
    // Redirect policy is baked into which `client` the caller passed in
    // (see `HttpExecutor`, which holds a follow- and a no-follow client)
    // rather than applied per-request — reqwest has no per-request
    // redirect override.

    let started = Instant::now();
    let response = builder
        .send()
        .await
        .map_err(|e| EngineError::Transport(describe_reqwest_error(&e)))?;

    let status = response.status().as_u16();
    let response_headers: HashMap<String, String> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| EngineError::Transport(format!("body read error: {e}")))?
        .to_vec();
    let decoded = String::from_utf8(body_bytes.clone()).ok();

    let response_data = ResponseData { body_bytes: body_bytes.clone(), decoded };
    let response_size = body_bytes.len();

    let history_opts = options
        .history_options
        .clone()
        .unwrap_or_else(|| HistoryCreationOptions::scanner(WorkspaceId::new()));

    let history = History {
        id: HistoryId(0),
        method: request.method.clone(),
        url: request.url.clone(),
        request_headers: request.headers.clone(),
        request_body: history_opts.clone_body.then(|| request.body.clone()).flatten(),
        status,
        response_headers,
        response: response_data.clone(),
        response_size,
        duration: started.elapsed(),
        source: history_opts.source,
        workspace_id: history_opts.workspace_id,
        task_id: history_opts.task_id,
        scan_id: history_opts.scan_id,
        scan_job_id: history_opts.scan_job_id,
        notes: Vec::new(),
        ws_messages: Vec::new(),
    };

    Ok((response_data, history))
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!("connect error: {e}")
    } else if e.is_timeout() {
        format!("timeout: {e}")
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_caps() {
        let d1 = retry_delay(1);
        let d4 = retry_delay(4);
        assert!(d1.as_millis() < d4.as_millis() || d4.as_millis() <= MAX_RETRY_DELAY_MS as u128 + 1);
        assert!(d4.as_millis() as u64 <= MAX_RETRY_DELAY_MS + MAX_RETRY_DELAY_MS / 4);
    }
}
