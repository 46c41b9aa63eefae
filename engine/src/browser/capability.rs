//! # capability
//!
//! The Chrome DevTools Protocol driver is treated as an external
//! capability (spec §1), never implemented directly here. `BrowserPage`
//! is the trait boundary every client-side audit programs against; a
//! real implementation backed by a CDP client is expected to live
//! outside this crate and plug in here. `FakeBrowserPage` (test-only) is
//! the hand-rolled fake SPEC_FULL.md §A.4 calls for, standing in for
//! `mockall` given how small this trait surface is.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineResult;

/// A JS-dialog event (`alert`/`confirm`/`prompt`) observed on a page
/// (spec §4.2 AlertAudit).
#[derive(Debug, Clone)]
pub struct DialogEvent {
    pub dialog_type: String,
    pub message: String,
    pub url: String,
}

/// A console message observed on a page, used by the DOM-XSS taint
/// tracker to read marker-tagged sink hits (spec §4.2 DOMXSSAudit).
#[derive(Debug, Clone)]
pub struct ConsoleEvent {
    pub level: String,
    pub text: String,
}

/// A synthetic user-interaction kind AlertAudit fires to provoke
/// `on*`-style payloads when no dialog appears within the fast-path
/// window (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticInteraction {
    Click,
    Hover,
    Focus,
    Keyboard,
}

/// One leased browser page — exclusive ownership for the duration of one
/// probe (spec §9 "Browser scope"). Implementations must guarantee that
/// dropping the handle (on success, error, timeout, or cancellation)
/// releases the page back to the pool.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&mut self, url: &str, incognito: bool) -> EngineResult<()>;

    /// Injects `script` so it runs before any page script — required for
    /// the DOM-XSS taint-tracking hooks (spec §4.2 DOMXSSAudit: "taint-
    /// tracking script injected before any page script runs").
    async fn inject_script_before_load(&mut self, script: &str) -> EngineResult<()>;

    async fn eval(&mut self, script: &str) -> EngineResult<Value>;

    async fn wait_for_dialog(&mut self, timeout: std::time::Duration) -> Option<DialogEvent>;

    async fn wait_for_console(&mut self, timeout: std::time::Duration) -> Vec<ConsoleEvent>;

    async fn fire_synthetic_interaction(&mut self, kind: SyntheticInteraction) -> EngineResult<()>;

    /// Number of `<script>` tags on the current page — feeds the
    /// adaptive per-source timeout in DOMXSSAudit (spec §4.2: "baseline
    /// 2s, doubled above 20 scripts").
    async fn script_count(&mut self) -> usize;

    async fn reload(&mut self) -> EngineResult<()>;
}

/// A hand-rolled fake implementation for tests: scripted dialog/console
/// events, no real navigation. Deliberately plainer than pulling in
/// `mockall` for a trait this small (SPEC_FULL.md §A.4).
#[derive(Default)]
pub struct FakeBrowserPage {
    pub navigated_urls: Vec<String>,
    pub scripted_dialogs: Vec<DialogEvent>,
    pub scripted_console: Vec<ConsoleEvent>,
    pub scripted_script_count: usize,
    pub eval_results: std::collections::HashMap<String, Value>,
}

#[async_trait]
impl BrowserPage for FakeBrowserPage {
    async fn navigate(&mut self, url: &str, _incognito: bool) -> EngineResult<()> {
        self.navigated_urls.push(url.to_string());
        Ok(())
    }

    async fn inject_script_before_load(&mut self, _script: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn eval(&mut self, script: &str) -> EngineResult<Value> {
        Ok(self.eval_results.get(script).cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_dialog(&mut self, _timeout: std::time::Duration) -> Option<DialogEvent> {
        self.scripted_dialogs.pop()
    }

    async fn wait_for_console(&mut self, _timeout: std::time::Duration) -> Vec<ConsoleEvent> {
        std::mem::take(&mut self.scripted_console)
    }

    async fn fire_synthetic_interaction(&mut self, _kind: SyntheticInteraction) -> EngineResult<()> {
        Ok(())
    }

    async fn script_count(&mut self) -> usize {
        self.scripted_script_count
    }

    async fn reload(&mut self) -> EngineResult<()> {
        Ok(())
    }
}
