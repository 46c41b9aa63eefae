//! # reflection
//!
//! Reflection-context analysis: tokenizes a response around a reflected
//! marker and classifies where it landed, and whether common encodings
//! were applied (spec §4.3.2).

use sukyan_types::{ReflectionAnalysis, ReflectionContext};

/// Classifies the context a `marker` was reflected into, and whether the
/// response HTML/quote/backslash-encoded it. Returns `None` when the
/// marker does not appear verbatim (the caller should only invoke this
/// after confirming `is_reflected`).
pub fn classify(body: &str, marker: &str) -> Option<ReflectionAnalysis> {
    let idx = body.find(marker)?;
    let before = &body[..idx];

    let context = classify_context(before, body, idx, marker.len());

    Some(ReflectionAnalysis {
        context,
        html_encoded: body.contains(&html_escape(marker)),
        quote_encoded: body.contains(&marker.replace('"', "&quot;")),
        backslash_escaped: body.contains(&marker.replace('\\', "\\\\")),
    })
}

fn classify_context(before: &str, body: &str, idx: usize, marker_len: usize) -> ReflectionContext {
    // Comment: an unterminated `<!--` precedes the marker with no closing
    // `-->` in between.
    if let Some(comment_start) = before.rfind("<!--") {
        if !before[comment_start..].contains("-->") {
            return ReflectionContext::Comment;
        }
    }

    // Script block: inside the nearest enclosing <script>...</script>.
    if let Some(script_start) = before.to_ascii_lowercase().rfind("<script") {
        let after_open = &before[script_start..];
        if !after_open.to_ascii_lowercase().contains("</script>") {
            return ReflectionContext::ScriptBlock;
        }
    }

    // Attribute value: the nearest preceding `="` (or `='`) has no
    // closing quote of the same kind before the marker, and we are still
    // inside a `<...>` tag (no unmatched `>` since the quote opened).
    if let Some(attr_quote_idx) = before.rfind("=\"") {
        let after = &before[attr_quote_idx + 2..];
        if !after.contains('"') && !after.contains('>') {
            return ReflectionContext::AttributeValue;
        }
    }
    if let Some(attr_quote_idx) = before.rfind("='") {
        let after = &before[attr_quote_idx + 2..];
        if !after.contains('\'') && !after.contains('>') {
            return ReflectionContext::AttributeValue;
        }
    }

    // JavaScript string: inside a <script> block AND inside a quoted
    // string literal — checked after the plain script-block case above
    // has already returned, so here we look at whether an odd number of
    // unescaped quotes precede the marker within the current line.
    let after = &body[idx + marker_len..];
    let _ = after;
    if looks_like_js_string_context(before) {
        return ReflectionContext::JavascriptString;
    }

    ReflectionContext::HtmlContent
}

fn looks_like_js_string_context(before: &str) -> bool {
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &before[line_start..];
    let in_script = line.contains("var ") || line.contains("let ") || line.contains("const ");
    let quotes = line.matches('\'').count() + line.matches('"').count();
    in_script && quotes % 2 == 1
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_html_content() {
        let body = "<div>M_marker123</div>";
        let r = classify(body, "M_marker123").unwrap();
        assert_eq!(r.context, ReflectionContext::HtmlContent);
    }

    #[test]
    fn classifies_attribute_value() {
        let body = r#"<input value="M_marker123">"#;
        let r = classify(body, "M_marker123").unwrap();
        assert_eq!(r.context, ReflectionContext::AttributeValue);
    }

    #[test]
    fn classifies_script_block() {
        let body = "<script>var x = M_marker123;</script>";
        let r = classify(body, "M_marker123").unwrap();
        assert_eq!(r.context, ReflectionContext::ScriptBlock);
    }

    #[test]
    fn classifies_comment() {
        let body = "<!-- M_marker123 -->";
        let r = classify(body, "M_marker123").unwrap();
        assert_eq!(r.context, ReflectionContext::Comment);
    }

    #[test]
    fn detects_quote_encoding_alongside_verbatim_reflection() {
        // One reflection point left the marker bare; another, encoded.
        // `classify` finds the first verbatim occurrence and should still
        // notice the encoded sibling exists elsewhere in the body.
        let body = r#"<div>M_marker"123</div><input value="M_marker&quot;123">"#;
        let r = classify(body, r#"M_marker"123"#).unwrap();
        assert!(r.quote_encoded);
    }

    #[test]
    fn no_reflection_returns_none() {
        assert!(classify("<div>nothing here</div>", "M_marker123").is_none());
    }
}
