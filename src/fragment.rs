//! Source fragments and their cache fingerprints.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An immutable unit of source text submitted for analysis: one file,
/// one function, or one edited region.
#[derive(Debug, Clone)]
pub struct SourceFragment {
    text: Arc<str>,
    language: String,
    /// Opaque identity (e.g. "src/app.py:0-120"); used only for cache
    /// scoping and result attribution, never interpreted.
    origin: String,
}

impl SourceFragment {
    pub fn new(text: impl Into<Arc<str>>, language: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            origin: origin.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cheap handle for moving the text into worker tasks.
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    /// Character width of each line; used to clamp diagnostic spans.
    pub fn line_widths(&self) -> Vec<usize> {
        self.text.lines().map(|l| l.chars().count()).collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = DefaultHasher::new();
        self.text.hash(&mut hasher);
        self.origin.hash(&mut hasher);
        Fingerprint {
            hash: hasher.finish(),
            len: self.text.len(),
        }
    }
}

/// Cache key for a fragment. The length rides along with the hash so
/// a hash collision between differently-sized inputs can't produce a
/// stale hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: u64,
    pub len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable_for_same_content() {
        let a = SourceFragment::new("def f():\n    pass\n", "python", "a.py");
        let b = SourceFragment::new("def f():\n    pass\n", "python", "a.py");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_on_content_change() {
        let a = SourceFragment::new("x = 1", "python", "a.py");
        let b = SourceFragment::new("x = 2", "python", "a.py");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_scoped_by_origin() {
        let a = SourceFragment::new("x = 1", "python", "a.py");
        let b = SourceFragment::new("x = 1", "python", "b.py");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_line_widths() {
        let f = SourceFragment::new("abc\nde\n", "python", "a.py");
        assert_eq!(f.line_widths(), vec![3, 2]);
    }
}
