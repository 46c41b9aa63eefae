//! # analyzer
//!
//! Produces the ordered sequence of `InsertionPoint`s for a history item
//! (spec §4.3): extracts candidate positions, then optionally drives
//! dynamicity/reflection analysis by replaying the request with distinct
//! random markers. Also owns `create_request_from_insertion_points`, the
//! re-emission operation every audit uses to mutate one position while
//! leaving all others bit-identical to the baseline (spec §8).

use std::collections::HashMap;

use rand::Rng;
use sukyan_types::{History, InsertionPoint, InsertionPointType, ValueType};

use crate::http::Request;
use crate::insertion_points::reflection;

/// Extracts the ordered, deterministic set of mutable positions from a
/// history item: query parameters, body parameters (form-encoded or JSON
/// fields), headers, cookies, and path segments. Order is stable across
/// calls on the same `History` (spec §3: "ordered deterministically").
pub fn extract_points(history: &History) -> Vec<InsertionPoint> {
    let mut points = Vec::new();

    if let Some((_, query)) = history.url.split_once('?') {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let mut p = InsertionPoint::new(name, InsertionPointType::Parameter, value);
            p.value_type = infer_value_type(value);
            points.push(p);
        }
    }

    for (name, value) in &history.request_headers {
        if name.eq_ignore_ascii_case("cookie") {
            for cookie_pair in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                let (name, val) = cookie_pair.split_once('=').unwrap_or((cookie_pair, ""));
                points.push(InsertionPoint::new(name, InsertionPointType::Cookie, val));
            }
        } else if !is_structural_header(name) {
            points.push(InsertionPoint::new(name, InsertionPointType::Header, value));
        }
    }

    if let Some(body) = &history.request_body {
        if let Ok(text) = std::str::from_utf8(body) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
                collect_json_fields(&json, String::new(), &mut points);
            } else if looks_form_encoded(text) {
                for pair in text.split('&').filter(|p| !p.is_empty()) {
                    let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                    points.push(InsertionPoint::new(name, InsertionPointType::Body, value));
                }
            }
        }
    }

    for (i, segment) in path_segments(&history.url).into_iter().enumerate() {
        if !segment.is_empty() {
            points.push(InsertionPoint::new(format!("segment{i}"), InsertionPointType::Path, segment));
        }
    }

    points
}

fn is_structural_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "host" | "content-length" | "connection" | "accept-encoding"
    )
}

fn looks_form_encoded(text: &str) -> bool {
    !text.is_empty() && text.contains('=') && !text.trim_start().starts_with('{') && !text.trim_start().starts_with('[')
}

fn collect_json_fields(value: &serde_json::Value, prefix: String, out: &mut Vec<InsertionPoint>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
                match v {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        collect_json_fields(v, path, out)
                    }
                    _ => {
                        let mut p = InsertionPoint::new(path, InsertionPointType::JsonField, scalar_to_string(v));
                        p.value_type = json_value_type(v);
                        out.push(p);
                    }
                }
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                collect_json_fields(v, format!("{prefix}[{i}]"), out);
            }
        }
        _ => {}
    }
}

fn scalar_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_value_type(v: &serde_json::Value) -> ValueType {
    match v {
        serde_json::Value::Bool(_) => ValueType::Boolean,
        serde_json::Value::Number(_) => ValueType::Number,
        serde_json::Value::String(s) if s.contains('@') => ValueType::Email,
        serde_json::Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => ValueType::Url,
        serde_json::Value::String(_) => ValueType::FreeText,
        _ => ValueType::Unknown,
    }
}

fn infer_value_type(value: &str) -> ValueType {
    if value.parse::<f64>().is_ok() {
        ValueType::Number
    } else if value == "true" || value == "false" {
        ValueType::Boolean
    } else if value.starts_with("http://") || value.starts_with("https://") {
        ValueType::Url
    } else if value.contains('@') {
        ValueType::Email
    } else {
        ValueType::FreeText
    }
}

fn path_segments(url: &str) -> Vec<String> {
    let without_query = url.split('?').next().unwrap_or(url);
    let path = without_query.split_once("://").and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..])).unwrap_or("");
    path.split('/').map(|s| s.to_string()).collect()
}

/// Replays `history`'s request twice through `send` with distinct random
/// markers substituted at `point`, classifying it dynamic/reflected per
/// spec §4.3.1: "`is-dynamic` if the two responses diverge
/// deterministically with the marker; `is-reflected` if the marker
/// appears verbatim in the response."
pub async fn analyze_dynamicity_and_reflection<F, Fut>(
    history: &History,
    point: &InsertionPoint,
    mut send: F,
) -> InsertionPoint
where
    F: FnMut(Request) -> Fut,
    Fut: std::future::Future<Output = Option<String>>,
{
    let mut result = point.clone();

    let marker_a = random_marker();
    let marker_b = random_marker();

    let req_a = create_request_from_insertion_points(history, &[(point.clone(), marker_a.clone())]);
    let req_b = create_request_from_insertion_points(history, &[(point.clone(), marker_b.clone())]);

    let (body_a, body_b) = futures::join!(send(req_a), send(req_b));

    if let (Some(a), Some(b)) = (&body_a, &body_b) {
        // Strip each marker out before comparing: if the bodies still
        // differ, the divergence isn't just "the marker text itself
        // differs" but something the server computed from it.
        let stripped_a = a.replace(&marker_a, "");
        let stripped_b = b.replace(&marker_b, "");
        result.is_dynamic = stripped_a != stripped_b;
    }

    if let Some(a) = &body_a {
        result.is_reflected = a.contains(&marker_a);
        if result.is_reflected {
            result.reflection = reflection::classify(a, &marker_a);
        }
    }

    result
}

fn random_marker() -> String {
    let n: u64 = rand::thread_rng().gen();
    format!("sukyan_{n:x}")
}

/// Re-renders `history`'s request with each `(point, payload_value)` pair
/// substituted in, leaving every other position bit-identical to the
/// baseline (spec §4.3, tested against spec §8's invariant).
pub fn create_request_from_insertion_points(
    history: &History,
    substitutions: &[(InsertionPoint, String)],
) -> Request {
    let mut url = history.url.clone();
    let mut headers = history.request_headers.clone();
    let mut body = history.request_body.clone();

    for (point, payload_value) in substitutions {
        match point.point_type {
            InsertionPointType::Parameter => {
                url = substitute_query_param(&url, &point.name, payload_value);
            }
            InsertionPointType::Path => {
                url = substitute_path_segment(&url, &point.name, payload_value);
            }
            InsertionPointType::Header => {
                headers.insert(point.name.clone(), payload_value.clone());
            }
            InsertionPointType::Cookie => {
                let cookie_header = headers.get("Cookie").or_else(|| headers.get("cookie")).cloned().unwrap_or_default();
                headers.insert("Cookie".to_string(), substitute_cookie(&cookie_header, &point.name, payload_value));
            }
            InsertionPointType::Body => {
                if let Some(b) = &body {
                    if let Ok(text) = String::from_utf8(b.clone()) {
                        body = Some(substitute_form_field(&text, &point.name, payload_value).into_bytes());
                    }
                }
            }
            InsertionPointType::JsonField => {
                if let Some(b) = &body {
                    if let Ok(text) = std::str::from_utf8(b) {
                        if let Ok(mut json) = serde_json::from_str::<serde_json::Value>(text) {
                            set_json_path(&mut json, &point.name, payload_value);
                            if let Ok(new_body) = serde_json::to_vec(&json) {
                                body = Some(new_body);
                            }
                        }
                    }
                }
            }
            InsertionPointType::XmlAttr => {
                if let Some(b) = &body {
                    if let Ok(text) = String::from_utf8(b.clone()) {
                        let needle = format!("{}=\"", point.name);
                        if let Some(idx) = text.find(&needle) {
                            let start = idx + needle.len();
                            if let Some(end_rel) = text[start..].find('"') {
                                let mut new_text = text.clone();
                                new_text.replace_range(start..start + end_rel, payload_value);
                                body = Some(new_text.into_bytes());
                            }
                        }
                    }
                }
            }
        }
    }

    Request { method: history.method.clone(), url, headers, body }
}

fn substitute_query_param(url: &str, name: &str, value: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((b, q)) => (b, q),
        None => return url.to_string(),
    };
    let new_pairs: Vec<String> = query
        .split('&')
        .map(|pair| {
            let (k, _) = pair.split_once('=').unwrap_or((pair, ""));
            if k == name {
                format!("{name}={}", urlencoding_lite(value))
            } else {
                pair.to_string()
            }
        })
        .collect();
    format!("{base}?{}", new_pairs.join("&"))
}

fn substitute_path_segment(url: &str, segment_name: &str, value: &str) -> String {
    let idx: usize = match segment_name.strip_prefix("segment").and_then(|s| s.parse().ok()) {
        Some(i) => i,
        None => return url.to_string(),
    };
    let (prefix, path) = match url.split_once("://") {
        Some((scheme, rest)) => match rest.find('/') {
            Some(i) => (format!("{scheme}://{}", &rest[..i]), rest[i..].to_string()),
            None => return url.to_string(),
        },
        None => (String::new(), url.to_string()),
    };
    let (path_part, query_part) = match path.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (path, None),
    };
    let mut segments: Vec<String> = path_part.split('/').map(|s| s.to_string()).collect();
    if let Some(s) = segments.get_mut(idx) {
        *s = value.to_string();
    }
    let rebuilt = segments.join("/");
    match query_part {
        Some(q) => format!("{prefix}{rebuilt}?{q}"),
        None => format!("{prefix}{rebuilt}"),
    }
}

fn substitute_cookie(cookie_header: &str, name: &str, value: &str) -> String {
    let mut found = false;
    let mut pairs: Vec<String> = cookie_header
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, _) = pair.split_once('=').unwrap_or((pair, ""));
            if k == name {
                found = true;
                format!("{name}={value}")
            } else {
                pair.to_string()
            }
        })
        .collect();
    if !found {
        pairs.push(format!("{name}={value}"));
    }
    pairs.join("; ")
}

fn substitute_form_field(body: &str, name: &str, value: &str) -> String {
    let pairs: Vec<String> = body
        .split('&')
        .map(|pair| {
            let (k, _) = pair.split_once('=').unwrap_or((pair, ""));
            if k == name {
                format!("{name}={}", urlencoding_lite(value))
            } else {
                pair.to_string()
            }
        })
        .collect();
    pairs.join("&")
}

fn set_json_path(json: &mut serde_json::Value, path: &str, value: &str) {
    let mut current = json;
    let parts: Vec<&str> = path.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        let is_last = i == parts.len() - 1;
        if is_last {
            if let Some(obj) = current.as_object_mut() {
                obj.insert(part.to_string(), serde_json::Value::String(value.to_string()));
            }
        } else if let Some(obj) = current.as_object_mut() {
            current = obj.entry(part.to_string()).or_insert_with(|| serde_json::json!({}));
        }
    }
}

fn urlencoding_lite(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sukyan_types::{HistoryId, HistorySource, ResponseData, WorkspaceId};

    fn sample_history(url: &str) -> History {
        History {
            id: HistoryId(1),
            method: "GET".to_string(),
            url: url.to_string(),
            request_headers: HashMap::new(),
            request_body: None,
            status: 200,
            response_headers: HashMap::new(),
            response: ResponseData::default(),
            response_size: 0,
            duration: std::time::Duration::from_millis(10),
            source: HistorySource::Scanner,
            workspace_id: WorkspaceId::new(),
            task_id: None,
            scan_id: None,
            scan_job_id: None,
            notes: vec![],
            ws_messages: vec![],
        }
    }

    #[test]
    fn extracts_query_params() {
        let h = sample_history("https://t.example/s?q=hello&page=2");
        let points = extract_points(&h);
        assert!(points.iter().any(|p| p.name == "q" && p.value == "hello"));
        assert!(points.iter().any(|p| p.name == "page"));
    }

    #[test]
    fn rebuild_leaves_other_positions_untouched() {
        let h = sample_history("https://t.example/s?q=hello&page=2");
        let points = extract_points(&h);
        let q = points.iter().find(|p| p.name == "q").unwrap().clone();
        let req = create_request_from_insertion_points(&h, &[(q, "PAYLOAD".to_string())]);
        assert!(req.url.contains("q=PAYLOAD"));
        assert!(req.url.contains("page=2"));
    }

    #[test]
    fn path_segment_substitution_preserves_query() {
        let h = sample_history("https://t.example/users/1/orders?x=1");
        let points = extract_points(&h);
        let seg = points.iter().find(|p| p.point_type == InsertionPointType::Path && p.value == "1").unwrap().clone();
        let req = create_request_from_insertion_points(&h, &[(seg, "42".to_string())]);
        assert!(req.url.contains("/users/42/orders"));
        assert!(req.url.contains("x=1"));
    }
}
