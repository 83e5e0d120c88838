use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;

use crate::types::RevisionId;

/// Bounded LRU cache for historical file content, keyed by (revision,
/// relative path). Current-revision reads bypass it entirely.
pub(crate) struct ContentCache {
    inner: LruCache<(RevisionId, PathBuf), Arc<Vec<u8>>>,
}

impl ContentCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, revision: &RevisionId, path: &PathBuf) -> Option<Arc<Vec<u8>>> {
        self.inner
            .get(&(revision.clone(), path.clone()))
            .map(Arc::clone)
    }

    pub fn put(&mut self, revision: RevisionId, path: PathBuf, content: Arc<Vec<u8>>) {
        self.inner.put((revision, path), content);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> (RevisionId, PathBuf) {
        (RevisionId::from(format!("r{n}").as_str()), PathBuf::from(format!("f{n}.txt")))
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ContentCache::new(4);
        let (rev, path) = entry(1);
        assert!(cache.get(&rev, &path).is_none());
        cache.put(rev.clone(), path.clone(), Arc::new(vec![1, 2, 3]));
        assert_eq!(cache.get(&rev, &path).unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_bounded_eviction() {
        let mut cache = ContentCache::new(2);
        for n in 0..5 {
            let (rev, path) = entry(n);
            cache.put(rev, path, Arc::new(vec![n as u8]));
        }
        assert_eq!(cache.len(), 2);
        let (rev, path) = entry(0);
        assert!(cache.get(&rev, &path).is_none());
        let (rev, path) = entry(4);
        assert!(cache.get(&rev, &path).is_some());
    }
}
