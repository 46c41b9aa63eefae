//! # dedup
//!
//! Per-audit concurrent deduplication set (spec §4.6). Each audit module
//! owns one `DedupSet`; no cross-audit sharing. `dashmap` is adopted from
//! the wider example pack (the `GlobalSushrut` workspace carries it for
//! exactly this kind of concurrent-set use case — the teacher itself has
//! no concurrent-map dependency) per the design note in spec §9: "a
//! concurrent hash map satisfies the contract."

use dashmap::DashMap;

use sukyan_types::dedup_key::build_key;

/// An atomic test-and-insert set keyed by `(normalized URL) + ":" +
/// (source or insertion-point string) [+ ":" + optional sub-key]`.
/// `mark_if_new` returns `true` for the first caller and `false` for
/// every subsequent caller with the same key — race-safe under 100
/// simultaneous callers (spec §4.6, tested below).
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: DashMap<String, ()>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    /// Returns `true` exactly once per distinct `(url, source, sub_key)`.
    /// `DashMap::insert` takes the shard's write lock for the duration of
    /// the call, so the "previous value was absent" signal it returns is
    /// the race-safe mark-if-new primitive spec §4.6 requires.
    pub fn mark_if_new(&self, url: &str, source: &str, sub_key: Option<&str>) -> bool {
        let key = build_key(url, source, sub_key);
        self.seen.insert(key, ()).is_none()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_if_new_is_race_safe_under_concurrency() {
        let set = std::sync::Arc::new(DedupSet::new());
        let mut handles = Vec::new();
        for _ in 0..100 {
            let set = set.clone();
            handles.push(tokio::spawn(async move {
                set.mark_if_new("https://t.example/a", "src", None)
            }));
        }
        let mut true_count = 0;
        for h in handles {
            if h.await.unwrap() {
                true_count += 1;
            }
        }
        assert_eq!(true_count, 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_sub_keys_are_independent() {
        let set = DedupSet::new();
        assert!(set.mark_if_new("https://t.example/a", "hash", Some("k1")));
        assert!(set.mark_if_new("https://t.example/a", "hash", Some("k2")));
        assert!(!set.mark_if_new("https://t.example/a", "hash", Some("k1")));
    }

    #[test]
    fn normalized_urls_collapse() {
        let set = DedupSet::new();
        assert!(set.mark_if_new("https://t.example/users/1?id=2", "q", None));
        assert!(!set.mark_if_new("https://t.example/users/42?id=9", "q", None));
    }
}
