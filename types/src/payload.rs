//! # payload
//!
//! Polymorphic over the capability set {get-value, get-interaction-data,
//! match-against-string}, per spec §3 "Payload" and §9's design note:
//! "represent as a sum type with variants {Static, OOB, Generator}".

use serde::{Deserialize, Serialize};

/// An out-of-band payload: carries a unique interaction domain and
/// full-id, minted by the OOB Correlator's `getURL()` (spec §4.4). Reuse
/// across different `OOBTest` registrations is forbidden (spec §3
/// invariant) — each probe must call `get_interaction_data` at most once
/// and register the result before firing the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OOBPayload {
    pub interaction_domain: String,
    pub full_id: String,
}

impl OOBPayload {
    /// The value substituted into the request — e.g. an LDAP lookup
    /// string embedding the canary domain for Log4Shell, or the bare
    /// domain for Host-header/SNI probes.
    pub fn get_value(&self, template: &str) -> String {
        template.replace("{domain}", &self.interaction_domain)
    }
}

/// A payload that templates a fresh marker at each call, so N concurrent
/// workers never collide on the same marker string (used by AlertAudit
/// and DOMXSSAudit, which need a unique per-navigation marker to
/// disambiguate which worker's dialog/console event just fired).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorPayload {
    pub template: String,
}

impl GeneratorPayload {
    /// Renders one instance of the template with a fresh marker
    /// substituted for `{marker}`.
    pub fn render(&self, marker: &str) -> String {
        self.template.replace("{marker}", marker)
    }
}

/// A payload value, polymorphic over the three capabilities spec §3
/// names: `get_value` (every variant), `get_interaction_data` (only
/// `Oob`), `matches` (a validation predicate evaluated against a
/// response body or console message).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Static {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        match_marker: Option<String>,
    },
    Oob {
        template: String,
        oob: OOBPayload,
    },
    Generator {
        template: String,
        marker: String,
    },
}

impl Payload {
    pub fn get_value(&self) -> String {
        match self {
            Payload::Static { value, .. } => value.clone(),
            Payload::Oob { template, oob } => oob.get_value(template),
            Payload::Generator { template, marker } => {
                GeneratorPayload { template: template.clone() }.render(marker)
            }
        }
    }

    /// `None` for payloads that have no OOB component.
    pub fn get_interaction_data(&self) -> Option<&OOBPayload> {
        match self {
            Payload::Oob { oob, .. } => Some(oob),
            _ => None,
        }
    }

    /// Validates that `haystack` demonstrates this payload fired — the
    /// "match-against-string" capability. Falls back to a verbatim
    /// substring check when no explicit marker was set.
    pub fn matches_against(&self, haystack: &str) -> bool {
        match self {
            Payload::Static { value, match_marker } => {
                haystack.contains(match_marker.as_deref().unwrap_or(value))
            }
            Payload::Generator { marker, .. } => haystack.contains(marker),
            Payload::Oob { .. } => false,
        }
    }
}
