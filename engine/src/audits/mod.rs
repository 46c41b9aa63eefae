//! # audits
//!
//! The Audit Module Contract (spec §4.2/§9): every audit is a small unit
//! that inspects a `History`/`InsertionPoint` pair and reports through an
//! `IssueSink`. One `run` method plus the pure selectors the orchestrator
//! needs to decide applicability and scheduling.

pub mod alert;
pub mod cspp;
pub mod cswsh;
pub mod dom_xss;
pub mod forbidden_bypass;
pub mod graphql;
pub mod host_header;
pub mod http_methods;
pub mod jsonp;
pub mod log4shell;
pub mod mass_assignment;
pub mod open_redirect;
pub mod react2shell;
pub mod sni;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint};

use crate::browser::BrowserPool;
use crate::config::EngineConfig;
use crate::dedup::DedupSet;
use crate::error::EngineResult;
use crate::http::HttpExecutor;
use crate::issues::IssueSink;
use crate::oob::OOBCorrelator;

/// Closed taxonomy of audit implementations (spec §4.2, §B). Each variant
/// names one `Audit` implementor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    Alert,
    DomXss,
    Cspp,
    ForbiddenBypass,
    Log4Shell,
    HostHeader,
    Sni,
    Jsonp,
    Cswsh,
    React2Shell,
    OpenRedirect,
    HttpMethods,
    MassAssignment,
    GraphqlIntrospection,
    GraphqlBatching,
    GraphqlDepthLimit,
    GraphqlFieldSuggestions,
    GraphqlDirectives,
    GraphqlSensitiveFields,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Alert => "alert",
            AuditKind::DomXss => "dom_xss",
            AuditKind::Cspp => "cspp",
            AuditKind::ForbiddenBypass => "forbidden_bypass",
            AuditKind::Log4Shell => "log4shell",
            AuditKind::HostHeader => "host_header",
            AuditKind::Sni => "sni",
            AuditKind::Jsonp => "jsonp",
            AuditKind::Cswsh => "cswsh",
            AuditKind::React2Shell => "react2shell",
            AuditKind::OpenRedirect => "open_redirect",
            AuditKind::HttpMethods => "http_methods",
            AuditKind::MassAssignment => "mass_assignment",
            AuditKind::GraphqlIntrospection => "graphql_introspection",
            AuditKind::GraphqlBatching => "graphql_batching",
            AuditKind::GraphqlDepthLimit => "graphql_depth_limit",
            AuditKind::GraphqlFieldSuggestions => "graphql_field_suggestions",
            AuditKind::GraphqlDirectives => "graphql_directives",
            AuditKind::GraphqlSensitiveFields => "graphql_sensitive_fields",
        }
    }

    /// Experimental audits are opt-in only via `--experimental-audits`
    /// (spec §6). React2Shell targets a narrow, fast-moving framework
    /// surface and CSWSH probes live origins from the browser's
    /// perspective; both are held behind the flag until stable.
    pub fn is_experimental(&self) -> bool {
        matches!(self, AuditKind::React2Shell | AuditKind::Cswsh)
    }

    /// Whether this audit inspects history/requests it drives itself
    /// (server-side) or needs a live browser page (client-side), per the
    /// `--server-side`/`--client-side` split in spec §6.
    pub fn is_client_side(&self) -> bool {
        matches!(self, AuditKind::Alert | AuditKind::DomXss | AuditKind::Cswsh)
    }

    pub fn all() -> &'static [AuditKind] {
        use AuditKind::*;
        &[
            Alert,
            DomXss,
            Cspp,
            ForbiddenBypass,
            Log4Shell,
            HostHeader,
            Sni,
            Jsonp,
            Cswsh,
            React2Shell,
            OpenRedirect,
            HttpMethods,
            MassAssignment,
            GraphqlIntrospection,
            GraphqlBatching,
            GraphqlDepthLimit,
            GraphqlFieldSuggestions,
            GraphqlDirectives,
            GraphqlSensitiveFields,
        ]
    }
}

/// Shared read-only dependencies every audit's `run` gets: the HTTP
/// executor to fire its own probes, the OOB correlator to register
/// blind probes, the dedup set to skip work already covered, the
/// resolved config, and an issue sink to report through.
pub struct AuditContext<'a> {
    pub http: &'a HttpExecutor,
    pub oob: &'a OOBCorrelator,
    pub dedup: &'a DedupSet,
    pub config: &'a EngineConfig,
    pub sink: &'a dyn IssueSink,
    /// Only populated when the orchestrator was configured with browser
    /// support; client-side audits (`is_client_side`) must tolerate
    /// `None` by reporting nothing rather than panicking (spec §6:
    /// `--client-side` may be turned off independently of `--server-side`).
    pub browser: Option<&'a BrowserPool>,
}

/// The uniform contract every audit module implements (spec §4.2).
#[async_trait]
pub trait Audit: Send + Sync {
    fn kind(&self) -> AuditKind;

    /// Default worker-pool width the orchestrator should use for this
    /// audit absent an override in `ConcurrencyLimits` (spec §5).
    fn default_concurrency(&self) -> usize {
        5
    }

    /// Whether this audit reasons about the request as a whole rather
    /// than about one insertion point at a time (e.g. ForbiddenBypass,
    /// CSWSH, JSONP, Host-Header, SNI, the GraphQL suite). The
    /// orchestrator dispatches these exactly once per history against a
    /// sentinel point built by `sentinel_point`, instead of once per
    /// extracted insertion point (SPEC_FULL.md §4.2: several audits
    /// "inspect the parsed API definition" or the whole request, not a
    /// single mutable position).
    fn is_history_level(&self) -> bool {
        false
    }

    /// Whether this audit has anything to do against this
    /// history/insertion-point pair. Pure and side-effect free so the
    /// orchestrator can use it to size work queues before spawning.
    fn applies_to(&self, history: &History, point: &InsertionPoint) -> bool;

    /// Runs the probe(s) for one history/insertion-point pair, reporting
    /// any findings through `ctx.sink`. Must observe `cancel` at
    /// suspension points before issuing network/browser calls (spec §5).
    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()>;
}

/// Builds the single sentinel `InsertionPoint` the orchestrator passes to
/// `is_history_level` audits in place of a real extracted point — it
/// carries the request URL as its value so `applies_to` implementations
/// that want to look at the history's shape still can, without the
/// orchestrator needing a second dispatch path through `Audit::run`.
pub fn sentinel_point(history: &History) -> InsertionPoint {
    InsertionPoint::new("_request", sukyan_types::InsertionPointType::Header, history.url.clone())
}
