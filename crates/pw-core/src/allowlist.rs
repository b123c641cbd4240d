//! Allow-list of base URLs exempt from idle termination.

use thiserror::Error;

use crate::base_url::base_url;
use crate::store::{PatternStore, StoreError};

/// Allow-list editing errors.
#[derive(Debug, Error)]
pub enum AllowListError {
    /// The input has no base URL (`scheme://host`).
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
    /// No entry exists at the requested position.
    #[error("no allow-list entry at index {index} (list has {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`AllowList::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    AlreadyPresent(String),
}

impl AddOutcome {
    /// The normalized entry.
    pub fn entry(&self) -> &str {
        match self {
            Self::Added(entry) | Self::AlreadyPresent(entry) => entry,
        }
    }
}

/// Whether the base URL of `url` is one of `patterns`.
///
/// A URL without a base form never matches.
pub fn contains_base_url(patterns: &[String], url: &str) -> bool {
    base_url(url).is_some_and(|base| patterns.iter().any(|pattern| *pattern == base))
}

/// Editor over the persisted allow-list.
///
/// Entries are stored in base form and kept unique; order is insertion
/// order.
#[derive(Debug, Clone)]
pub struct AllowList<S> {
    store: S,
}

impl<S: PatternStore> AllowList<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<String>, AllowListError> {
        Ok(self.store.load_patterns().await?)
    }

    /// Normalizes `url` and appends it unless already listed.
    pub async fn add(&self, url: &str) -> Result<AddOutcome, AllowListError> {
        let entry = base_url(url).ok_or_else(|| AllowListError::InvalidUrl(url.to_string()))?;

        let mut patterns = self.store.load_patterns().await?;
        if patterns.contains(&entry) {
            return Ok(AddOutcome::AlreadyPresent(entry));
        }

        patterns.push(entry.clone());
        self.store.save_patterns(&patterns).await?;
        tracing::debug!(%entry, "allow-list entry added");
        Ok(AddOutcome::Added(entry))
    }

    /// Removes the entry at `index` and returns it.
    pub async fn remove(&self, index: usize) -> Result<String, AllowListError> {
        let mut patterns = self.store.load_patterns().await?;
        if index >= patterns.len() {
            return Err(AllowListError::IndexOutOfRange {
                index,
                len: patterns.len(),
            });
        }

        let removed = patterns.remove(index);
        self.store.save_patterns(&patterns).await?;
        tracing::debug!(entry = %removed, "allow-list entry removed");
        Ok(removed)
    }

    /// Whether the base URL of `url` is listed.
    pub async fn contains(&self, url: &str) -> Result<bool, AllowListError> {
        let patterns = self.store.load_patterns().await?;
        Ok(contains_base_url(&patterns, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPatternStore;

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let list = AllowList::new(MemoryPatternStore::new());

        let outcome = list.add("https://example.com").await.unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Added("https://example.com".to_string())
        );
        assert_eq!(list.list().await.unwrap(), vec!["https://example.com"]);

        let removed = list.remove(0).await.unwrap();
        assert_eq!(removed, "https://example.com");
        assert!(list.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_normalizes_and_deduplicates() {
        let store = MemoryPatternStore::new();
        let list = AllowList::new(store.clone());

        list.add("https://example.com/watch?v=1").await.unwrap();
        let again = list.add("https://EXAMPLE.com:8443/other").await.unwrap();

        assert_eq!(
            again,
            AddOutcome::AlreadyPresent("https://example.com".to_string())
        );
        assert_eq!(store.snapshot(), vec!["https://example.com"]);
    }

    #[tokio::test]
    async fn add_keeps_insertion_order() {
        let list = AllowList::new(MemoryPatternStore::new());
        list.add("https://b.test").await.unwrap();
        list.add("https://a.test").await.unwrap();

        assert_eq!(
            list.list().await.unwrap(),
            vec!["https://b.test", "https://a.test"]
        );
    }

    #[tokio::test]
    async fn add_rejects_invalid_url() {
        let store = MemoryPatternStore::new();
        let list = AllowList::new(store.clone());

        let err = list.add("example.com").await.unwrap_err();

        assert!(matches!(err, AllowListError::InvalidUrl(_)));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn remove_out_of_range_leaves_list_unchanged() {
        let store = MemoryPatternStore::with_patterns(["https://a.test"]);
        let list = AllowList::new(store.clone());

        let err = list.remove(3).await.unwrap_err();

        assert!(matches!(
            err,
            AllowListError::IndexOutOfRange { index: 3, len: 1 }
        ));
        assert_eq!(store.snapshot(), vec!["https://a.test"]);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_error() {
        let list = AllowList::new(MemoryPatternStore::unavailable());

        assert!(matches!(
            list.add("https://a.test").await,
            Err(AllowListError::Store(StoreError::Unavailable))
        ));
    }

    #[test]
    fn matching_compares_base_urls() {
        let patterns = vec!["https://example.com".to_string()];

        assert!(contains_base_url(&patterns, "https://example.com/a/b?c"));
        assert!(!contains_base_url(&patterns, "http://example.com/"));
        assert!(!contains_base_url(&patterns, "https://sub.example.com/"));
        assert!(!contains_base_url(&patterns, "not a url"));
    }
}
