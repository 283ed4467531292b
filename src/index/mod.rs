//! Full-text search index for row tables.
//!
//! Design:
//! - Tokens are lowercase alphanumeric runs, hashed with seahash
//! - Every row keeps a sorted `SearchVector` of its token hashes
//! - `SearchIndex` maps token hash -> roaring bitmap of row ids
//! - The postings can be suspended during bulk loads; lookups then return
//!   `None` and callers scan per-row vectors instead

mod search;

pub use search::SearchIndex;

use serde_json::Value;
use smallvec::SmallVec;

use crate::types::RowData;

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[inline]
fn token_hash(token: &str) -> u64 {
    seahash::hash(token.as_bytes())
}

/// Sorted, deduplicated token hashes of one row (or one query).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchVector(SmallVec<[u64; 8]>);

impl SearchVector {
    pub fn from_text(text: &str) -> Self {
        let mut hashes: SmallVec<[u64; 8]> = tokenize(text).map(|t| token_hash(&t)).collect();
        hashes.sort_unstable();
        hashes.dedup();
        Self(hashes)
    }

    /// Tokens of every string value in `data` whose key is in `text_columns`.
    pub fn from_row<'a>(data: &RowData, text_columns: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hashes: SmallVec<[u64; 8]> = SmallVec::new();
        for column in text_columns {
            if let Some(Value::String(s)) = data.get(column) {
                hashes.extend(tokenize(s).map(|t| token_hash(&t)));
            }
        }
        hashes.sort_unstable();
        hashes.dedup();
        Self(hashes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> &[u64] {
        &self.0
    }

    /// True when every token of `query` occurs in this vector.
    pub fn contains_all(&self, query: &SearchVector) -> bool {
        query.0.iter().all(|h| self.0.binary_search(h).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Hello, World! foo-bar_42").collect();
        assert_eq!(tokens, vec!["hello", "world", "foo", "bar", "42"]);
    }

    #[test]
    fn test_vector_only_covers_text_columns() {
        let data = json!({"name": "Ada Lovelace", "city": "London", "age": 36})
            .as_object()
            .cloned()
            .unwrap();
        let v = SearchVector::from_row(&data, ["name"]);
        assert!(v.contains_all(&SearchVector::from_text("ada")));
        assert!(v.contains_all(&SearchVector::from_text("LOVELACE ada")));
        assert!(!v.contains_all(&SearchVector::from_text("london")));
        assert!(v.contains_all(&SearchVector::from_text("  ")));
    }
}
