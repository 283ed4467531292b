//! Inverted index: token hash -> row ids (roaring treemap, lock-free map).

use super::SearchVector;
use crate::types::RowId;
use dashmap::DashMap;
use roaring::RoaringTreemap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct SearchIndex {
    postings: DashMap<u64, RoaringTreemap>,
    /// Outstanding `suspend` calls. Postings are empty while non-zero.
    suspended: AtomicUsize,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.suspended.load(Ordering::Acquire) == 0
    }

    pub fn insert(&self, row_id: RowId, vector: &SearchVector) {
        if !self.is_live() {
            return;
        }
        for &token in vector.tokens() {
            self.postings.entry(token).or_default().insert(row_id.0);
        }
    }

    pub fn remove(&self, row_id: RowId, vector: &SearchVector) {
        for &token in vector.tokens() {
            if let Some(mut ids) = self.postings.get_mut(&token) {
                ids.remove(row_id.0);
                if ids.is_empty() {
                    drop(ids);
                    self.postings.remove(&token);
                }
            }
        }
    }

    /// Row ids containing every query token. `None` while suspended.
    pub fn lookup(&self, query: &SearchVector) -> Option<RoaringTreemap> {
        if !self.is_live() {
            return None;
        }
        let mut tokens = query.tokens().iter();
        let first = match tokens.next() {
            Some(t) => *t,
            None => return None,
        };
        let mut hits = self.postings.get(&first).map(|ids| ids.clone()).unwrap_or_default();
        for token in tokens {
            if hits.is_empty() {
                break;
            }
            match self.postings.get(token) {
                Some(ids) => hits &= &*ids,
                None => hits.clear(),
            }
        }
        Some(hits)
    }

    /// Drop the postings until a matching `resume`.
    pub fn suspend(&self) {
        self.suspended.fetch_add(1, Ordering::AcqRel);
        self.postings.clear();
    }

    /// Undo one `suspend`; the last one rebuilds from `rows`.
    pub fn resume<'a>(&self, rows: impl IntoIterator<Item = (RowId, &'a SearchVector)>) {
        let prev = self
            .suspended
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if prev <= 1 {
            self.rebuild(rows);
        }
    }

    pub fn rebuild<'a>(&self, rows: impl IntoIterator<Item = (RowId, &'a SearchVector)>) {
        self.postings.clear();
        if !self.is_live() {
            return;
        }
        for (row_id, vector) in rows {
            self.insert(row_id, vector);
        }
    }

    /// Distinct tokens indexed
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> SearchVector {
        SearchVector::from_text(text)
    }

    #[test]
    fn test_lookup_requires_all_tokens() {
        let idx = SearchIndex::new();
        idx.insert(RowId(1), &v("red apple"));
        idx.insert(RowId(2), &v("green apple"));
        idx.insert(RowId(3), &v("red car"));

        let hits = idx.lookup(&v("apple")).unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![1, 2]);

        let hits = idx.lookup(&v("RED apple")).unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![1]);

        assert!(idx.lookup(&v("banana")).unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let idx = SearchIndex::new();
        idx.insert(RowId(1), &v("alpha"));
        idx.remove(RowId(1), &v("alpha"));
        assert!(idx.lookup(&v("alpha")).unwrap().is_empty());
        assert_eq!(idx.token_count(), 0);
    }

    #[test]
    fn test_suspend_and_resume_rebuilds() {
        let idx = SearchIndex::new();
        let a = v("alpha");
        let b = v("beta");
        idx.insert(RowId(1), &a);

        idx.suspend();
        assert!(!idx.is_live());
        assert!(idx.lookup(&a).is_none());
        idx.insert(RowId(2), &b);
        assert_eq!(idx.token_count(), 0);

        idx.resume([(RowId(1), &a), (RowId(2), &b)]);
        assert!(idx.is_live());
        assert_eq!(idx.lookup(&b).unwrap().len(), 1);
    }

    #[test]
    fn test_nested_suspend() {
        let idx = SearchIndex::new();
        let a = v("alpha");
        idx.suspend();
        idx.suspend();
        idx.resume([(RowId(1), &a)]);
        assert!(!idx.is_live());
        idx.resume([(RowId(1), &a)]);
        assert_eq!(idx.lookup(&a).unwrap().len(), 1);
    }
}
