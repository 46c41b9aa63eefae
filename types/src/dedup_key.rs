//! # dedup_key
//!
//! URL normalization and deduplication-key construction. Pure, allocation
//! cheap, and deterministic — both the Insertion-Point Analyzer and the
//! per-audit Deduplication Layer must agree on this bit-for-bit (spec §8:
//! "`build-deduplication-key(url, source)` is deterministic and depends
//! only on its inputs").

/// Replaces path segments and query values with `X` so that
/// `/users/1?id=2` and `/users/42?id=9` collapse to the same key (spec
/// §4.6). Idempotent: `normalize(normalize(u)) == normalize(u)` (spec
/// §8).
pub fn normalize(url: &str) -> String {
    let (before_query, query) = match url.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (url, None),
    };

    let path_normalized = normalize_path(before_query);

    match query {
        Some(q) => format!("{path_normalized}?{}", normalize_query(q)),
        None => path_normalized,
    }
}

fn normalize_path(url: &str) -> String {
    // Split off scheme://host so only the path portion's segments are
    // replaced; the host is load-bearing for dedup (different hosts are
    // different targets) and must survive normalization untouched.
    let (prefix, path) = match url.split_once("://") {
        Some((scheme, rest)) => match rest.find('/') {
            Some(idx) => (format!("{scheme}://{}", &rest[..idx]), &rest[idx..]),
            None => return url.to_string(),
        },
        None => (String::new(), url),
    };

    let normalized_segments: Vec<&str> = path
        .split('/')
        .map(|segment| if segment.is_empty() { segment } else { "X" })
        .collect();

    format!("{prefix}{}", normalized_segments.join("/"))
}

fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) => format!("{k}=X"),
            None => format!("{pair}=X"),
        })
        .collect();
    pairs.sort();
    pairs.join("&")
}

/// Builds the per-audit dedup key: `normalize(url) + ":" + source [+ ":" + sub_key]`
/// (spec §4.6).
pub fn build_key(url: &str, source: &str, sub_key: Option<&str>) -> String {
    let norm = normalize(url);
    match sub_key {
        Some(sub) => format!("{norm}:{source}:{sub}"),
        None => format!("{norm}:{source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_path_and_query() {
        let a = normalize("https://t.example/users/1?id=2");
        let b = normalize("https://t.example/users/42?id=9");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_is_idempotent() {
        let u = "https://t.example/users/1/orders/7?sort=desc&id=2";
        let once = normalize(u);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_preserves_host() {
        let a = normalize("https://a.example/x?y=1");
        let b = normalize("https://b.example/x?y=1");
        assert_ne!(a, b);
    }

    #[test]
    fn build_key_is_deterministic() {
        let k1 = build_key("https://t.example/s?q=1", "q", None);
        let k2 = build_key("https://t.example/s?q=2", "q", None);
        assert_eq!(k1, k2);
    }

    #[test]
    fn build_key_distinguishes_sub_key() {
        let k1 = build_key("https://t.example/s", "hash", Some("a"));
        let k2 = build_key("https://t.example/s", "hash", Some("b"));
        assert_ne!(k1, k2);
    }
}
