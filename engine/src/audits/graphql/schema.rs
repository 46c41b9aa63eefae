//! # graphql::schema
//!
//! Shared machinery the whole GraphQL suite depends on: a minimal parsed
//! API definition built from an introspection response (spec §4.2:
//! "each audit receives the parsed API definition"), the dedicated
//! response-classification function, and the schema-aware cyclic-chain
//! DFS used by the depth-limit audit.

use std::collections::HashMap;

use sukyan_types::History;

/// One field on a GraphQL object type: its name and the type it returns
/// (stripped of `!`/`[]` wrappers), plus whether it returns a list.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub type_name: String,
}

/// One object type and its fields, as seen in `__schema.types`.
#[derive(Debug, Clone, Default)]
pub struct ObjectType {
    pub fields: Vec<Field>,
}

/// The minimal parsed introspection result every GraphQL audit is handed
/// — a map from type name to its fields, plus the root query type name.
#[derive(Debug, Clone, Default)]
pub struct GraphQLSchema {
    pub types: HashMap<String, ObjectType>,
    pub query_root: String,
}

impl GraphQLSchema {
    /// Parses the standard `__schema { queryType { name } types { name
    /// fields { name type { name, ofType { name } } } } }` introspection
    /// shape. Returns `None` on anything that doesn't look like a
    /// GraphQL introspection payload — the caller treats that as "schema
    /// unavailable" rather than an error (spec §5 parse-failure policy:
    /// "the specific sub-audit is skipped").
    pub fn parse(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let schema = value.get("data")?.get("__schema")?;
        let query_root = schema.get("queryType")?.get("name")?.as_str()?.to_string();

        let mut types = HashMap::new();
        for t in schema.get("types")?.as_array()? {
            let Some(name) = t.get("name").and_then(|n| n.as_str()) else { continue };
            let fields = t
                .get("fields")
                .and_then(|f| f.as_array())
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|f| {
                            let field_name = f.get("name")?.as_str()?.to_string();
                            let type_name = unwrap_type_name(f.get("type")?)?;
                            Some(Field { name: field_name, type_name })
                        })
                        .collect()
                })
                .unwrap_or_default();
            types.insert(name.to_string(), ObjectType { fields });
        }

        Some(Self { types, query_root })
    }

    /// Depth-first search from the query root, discovering the longest
    /// cyclic object chain reachable from each root field — marks the
    /// current path on the recursion frame and unmarks on the way back
    /// out, so a type that appears twice on *different* branches isn't
    /// mistaken for a cycle (spec §9: "marks-and-unmarks the visited set
    /// on its recursion frame to detect [cycles] without relying on heap
    /// cycles").
    pub fn deepest_cyclic_chain(&self) -> Vec<String> {
        let Some(root) = self.types.get(&self.query_root) else { return Vec::new() };
        let mut best = Vec::new();
        for field in &root.fields {
            let mut path = vec![field.type_name.clone()];
            let mut on_path = std::collections::HashSet::new();
            on_path.insert(field.type_name.clone());
            self.dfs(&field.type_name, &mut path, &mut on_path, &mut best);
            path.pop();
        }
        best
    }

    fn dfs(&self, type_name: &str, path: &mut Vec<String>, on_path: &mut std::collections::HashSet<String>, best: &mut Vec<String>) {
        if path.len() > best.len() {
            *best = path.clone();
        }
        // Cap traversal depth generously above the reportable threshold;
        // a schema with a genuine cycle would otherwise recurse forever.
        if path.len() >= 64 {
            return;
        }
        let Some(object) = self.types.get(type_name) else { return };
        for field in &object.fields {
            if on_path.contains(&field.type_name) {
                // Found the cycle edge; record the chain through it once
                // more so callers can see depth including the repeat.
                let mut closed = path.clone();
                closed.push(field.type_name.clone());
                if closed.len() > best.len() {
                    *best = closed;
                }
                continue;
            }
            path.push(field.type_name.clone());
            on_path.insert(field.type_name.clone());
            self.dfs(&field.type_name, path, on_path, best);
            on_path.remove(&field.type_name);
            path.pop();
        }
    }
}

fn unwrap_type_name(type_ref: &serde_json::Value) -> Option<String> {
    if let Some(name) = type_ref.get("name").and_then(|n| n.as_str()) {
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    type_ref.get("ofType").and_then(unwrap_type_name)
}

/// Recognized phrases/extension codes a server uses to reject a query on
/// depth/complexity grounds (spec §8: "Depth-limit rejection by
/// extension code `DEPTH_LIMIT_EXCEEDED` prevents a finding even if
/// `data` is present").
const DEPTH_REJECTION_PHRASES: &[&str] = &["max depth", "maximum depth", "too deep", "query is too complex", "complexity"];
const DEPTH_REJECTION_CODES: &[&str] = &["DEPTH_LIMIT_EXCEEDED", "QUERY_TOO_COMPLEX", "MAX_COMPLEXITY_EXCEEDED"];
const SYNTAX_REJECTION_PHRASES: &[&str] = &["syntax error", "cannot query field", "validation error", "unknown argument", "unknown type"];

/// Outcome of classifying one GraphQL probe response (spec §4.2: "a
/// dedicated function: rejects a probe when HTTP >= 400, when errors
/// contain recognized depth/complexity phrases or extension codes, or
/// when errors contain syntax/validation phrases; accepts only when
/// `data` has a non-null leaf").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphQLOutcome {
    Accepted,
    RejectedDepth,
    RejectedSyntax,
    RejectedOther,
}

pub fn classify_response(status: u16, body: &str) -> GraphQLOutcome {
    if status >= 400 {
        return GraphQLOutcome::RejectedOther;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return GraphQLOutcome::RejectedOther;
    };

    if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
        let lower = serde_json::to_string(errors).unwrap_or_default().to_lowercase();
        if DEPTH_REJECTION_CODES.iter().any(|c| lower.contains(&c.to_lowercase())) || DEPTH_REJECTION_PHRASES.iter().any(|p| lower.contains(p)) {
            return GraphQLOutcome::RejectedDepth;
        }
        if SYNTAX_REJECTION_PHRASES.iter().any(|p| lower.contains(p)) {
            return GraphQLOutcome::RejectedSyntax;
        }
        if !errors.is_empty() {
            return GraphQLOutcome::RejectedOther;
        }
    }

    let has_leaf = value
        .get("data")
        .map(|data| !data.is_null() && has_non_null_leaf(data))
        .unwrap_or(false);

    if has_leaf {
        GraphQLOutcome::Accepted
    } else {
        GraphQLOutcome::RejectedOther
    }
}

fn has_non_null_leaf(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => map.values().any(has_non_null_leaf),
        serde_json::Value::Array(items) => items.iter().any(has_non_null_leaf),
        _ => true,
    }
}

/// Whether `history` looks like a GraphQL endpoint worth probing: a POST
/// with a JSON body carrying a `query` field, or a URL path ending in
/// `/graphql`.
pub fn looks_like_graphql_endpoint(history: &History) -> bool {
    if history.url.contains("/graphql") {
        return true;
    }
    history
        .request_body
        .as_ref()
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
        .map(|v| v.get("query").is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_error_as_rejected() {
        assert_eq!(classify_response(500, "{}"), GraphQLOutcome::RejectedOther);
    }

    #[test]
    fn classifies_depth_extension_code_as_rejected_depth() {
        let body = r#"{"errors":[{"message":"nope","extensions":{"code":"DEPTH_LIMIT_EXCEEDED"}}]}"#;
        assert_eq!(classify_response(200, body), GraphQLOutcome::RejectedDepth);
    }

    #[test]
    fn classifies_syntax_error_as_rejected_syntax() {
        let body = r#"{"errors":[{"message":"Cannot query field \"x\" on type \"Query\"."}]}"#;
        assert_eq!(classify_response(200, body), GraphQLOutcome::RejectedSyntax);
    }

    #[test]
    fn accepts_non_null_leaf_data() {
        let body = r#"{"data":{"__schema":{"types":[{"name":"Query"}]}}}"#;
        assert_eq!(classify_response(200, body), GraphQLOutcome::Accepted);
    }

    #[test]
    fn rejects_data_present_but_depth_limited_extension() {
        let body = r#"{"data":null,"errors":[{"message":"x","extensions":{"code":"DEPTH_LIMIT_EXCEEDED"}}]}"#;
        assert_eq!(classify_response(200, body), GraphQLOutcome::RejectedDepth);
    }

    #[test]
    fn deepest_cyclic_chain_follows_self_referencing_type() {
        let mut schema = GraphQLSchema { types: HashMap::new(), query_root: "Query".to_string() };
        schema.types.insert("Query".to_string(), ObjectType { fields: vec![Field { name: "user".to_string(), type_name: "User".to_string() }] });
        schema.types.insert(
            "User".to_string(),
            ObjectType { fields: vec![Field { name: "friend".to_string(), type_name: "User".to_string() }] },
        );
        let chain = schema.deepest_cyclic_chain();
        assert_eq!(chain, vec!["User".to_string(), "User".to_string()]);
    }
}
