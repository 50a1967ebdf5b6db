//! In-memory memoization of per-fragment analysis results.
//!
//! Keyed by content fingerprint (hash + length), bounded by a TTL and
//! an entry cap. Built as an explicitly constructed service object so
//! each pipeline (and each test) owns its own instance; the map is
//! mutex-guarded because analyses for different fragments run
//! concurrently.

use crate::diagnostic::Diagnostic;
use crate::fragment::Fingerprint;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Evict down to this share of the cap once it is exceeded.
const EVICTION_TARGET: f64 = 0.8;

#[derive(Debug, Clone)]
struct CacheEntry {
    diagnostics: Vec<Diagnostic>,
    created_at: DateTime<Utc>,
    #[allow(dead_code)]
    analysis_ms: u64,
}

pub struct AnalysisCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl AnalysisCache {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
            max_entries: max_entries.max(1),
        }
    }

    /// Cached diagnostics for a fingerprint, or None. An expired entry
    /// is removed and treated as a miss.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<Diagnostic>> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(fingerprint) {
            Some(entry) => Utc::now().signed_duration_since(entry.created_at) > self.ttl,
            None => return None,
        };
        if expired {
            entries.remove(fingerprint);
            return None;
        }
        entries.get(fingerprint).map(|e| e.diagnostics.clone())
    }

    pub fn put(&self, fingerprint: Fingerprint, diagnostics: Vec<Diagnostic>, analysis_ms: u64) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(
            fingerprint,
            CacheEntry {
                diagnostics,
                created_at: Utc::now(),
                analysis_ms,
            },
        );
        if entries.len() > self.max_entries {
            Self::evict(&mut entries, self.ttl, self.max_entries);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expired entries go first; if the map is still over target,
    /// oldest-created entries follow until it fits.
    fn evict(entries: &mut HashMap<Fingerprint, CacheEntry>, ttl: Duration, max_entries: usize) {
        let now = Utc::now();
        entries.retain(|_, entry| now.signed_duration_since(entry.created_at) <= ttl);

        let target = ((max_entries as f64) * EVICTION_TARGET) as usize;
        if entries.len() <= target {
            return;
        }
        let mut by_age: Vec<(Fingerprint, DateTime<Utc>)> = entries
            .iter()
            .map(|(fp, entry)| (*fp, entry.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);
        for (fp, _) in by_age.into_iter().take(entries.len() - target) {
            entries.remove(&fp);
        }
    }

    /// Test hook: age an entry as if it had been inserted earlier.
    #[cfg(test)]
    pub(crate) fn backdate(&self, fingerprint: &Fingerprint, age: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(fingerprint) {
                entry.created_at -= age;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::SourceFragment;

    fn fp(text: &str) -> Fingerprint {
        SourceFragment::new(text, "python", "test.py").fingerprint()
    }

    #[test]
    fn test_put_then_get() {
        let cache = AnalysisCache::new(600, 10);
        let key = fp("x = 1");
        cache.put(key, Vec::new(), 3);
        assert!(cache.get(&key).is_some_and(|v| v.is_empty()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_on_unknown_fingerprint() {
        let cache = AnalysisCache::new(600, 10);
        assert!(cache.get(&fp("nope")).is_none());
    }

    #[test]
    fn test_ttl_expiry_is_a_miss() {
        let cache = AnalysisCache::new(600, 10);
        let key = fp("x = 1");
        cache.put(key, Vec::new(), 1);

        // Fresh entry hits.
        assert!(cache.get(&key).is_some());

        // Aged past the TTL it misses and is dropped.
        cache.backdate(&key, Duration::seconds(601));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_eviction_removes_expired_then_oldest() {
        let cache = AnalysisCache::new(600, 5);
        let keys: Vec<Fingerprint> = (0..5).map(|n| fp(&format!("x = {}", n))).collect();
        for key in &keys {
            cache.put(*key, Vec::new(), 1);
        }
        // Age two entries past the TTL, then overflow the cap.
        cache.backdate(&keys[0], Duration::seconds(700));
        cache.backdate(&keys[1], Duration::seconds(700));
        cache.put(fp("overflow"), Vec::new(), 1);

        assert!(cache.len() <= 4); // 80% of cap 5
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[1]).is_none());
        assert!(cache.get(&fp("overflow")).is_some());
    }

    #[test]
    fn test_eviction_prefers_oldest_when_none_expired() {
        let cache = AnalysisCache::new(600, 3);
        let a = fp("a");
        let b = fp("b");
        let c = fp("c");
        cache.put(a, Vec::new(), 1);
        cache.put(b, Vec::new(), 1);
        cache.put(c, Vec::new(), 1);
        cache.backdate(&a, Duration::seconds(100));
        cache.put(fp("d"), Vec::new(), 1);

        // `a` was the oldest live entry.
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&fp("d")).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = AnalysisCache::new(600, 10);
        cache.put(fp("x"), Vec::new(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        let cache = Arc::new(AnalysisCache::new(600, 100));
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for n in 0..50 {
                    let key = fp(&format!("t{} n{}", t, n));
                    cache.put(key, Vec::new(), 1);
                    let _ = cache.get(&key);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 100);
    }
}
