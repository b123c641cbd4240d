//! Persistent store seams.
//!
//! Browser storage comes in two halves:
//! - a synchronous local half scoped to the page origin ([`LocalStorage`]),
//!   which holds the persisted volume;
//! - an asynchronous namespaced half shared by the whole extension
//!   ([`PatternStore`]), which holds the allow-list.
//!
//! The in-memory implementations here back the simulated page and tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use thiserror::Error;

/// Local-storage key holding the persisted volume.
pub const VOLUME_KEY: &str = "globalVideoVolume";

/// Extension-storage key holding the allow-list.
pub const URL_PATTERNS_KEY: &str = "urlPatterns";

/// Persistent store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend is not reachable from this context.
    #[error("storage backend unavailable")]
    Unavailable,
    /// The backend rejected the read or write.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("invalid stored value for {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// Synchronous key/value storage scoped to one page origin.
pub trait LocalStorage {
    /// Returns the stored value, or `None` if absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Asynchronous storage for the URL pattern list.
pub trait PatternStore {
    /// Loads the pattern list; an absent list is empty.
    fn load_patterns(&self) -> impl Future<Output = Result<Vec<String>, StoreError>>;

    fn save_patterns(&self, patterns: &[String]) -> impl Future<Output = Result<(), StoreError>>;
}

impl<T: LocalStorage + ?Sized> LocalStorage for Rc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

impl<T: PatternStore + ?Sized> PatternStore for Rc<T> {
    fn load_patterns(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> {
        (**self).load_patterns()
    }

    fn save_patterns(&self, patterns: &[String]) -> impl Future<Output = Result<(), StoreError>> {
        (**self).save_patterns(patterns)
    }
}

/// In-memory [`LocalStorage`]. Clones share the same entries, which is how a
/// reload over the same origin is simulated.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// In-memory [`PatternStore`] that can be switched unavailable.
#[derive(Debug, Clone)]
pub struct MemoryPatternStore {
    patterns: Rc<RefCell<Vec<String>>>,
    available: Rc<Cell<bool>>,
}

impl Default for MemoryPatternStore {
    fn default() -> Self {
        Self {
            patterns: Rc::default(),
            available: Rc::new(Cell::new(true)),
        }
    }
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns<I, T>(patterns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let store = Self::default();
        store
            .patterns
            .borrow_mut()
            .extend(patterns.into_iter().map(Into::into));
        store
    }

    /// A store whose backend is missing, like a content script running
    /// without the storage permission.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.patterns.borrow().clone()
    }
}

impl PatternStore for MemoryPatternStore {
    async fn load_patterns(&self) -> Result<Vec<String>, StoreError> {
        if !self.available.get() {
            return Err(StoreError::Unavailable);
        }
        Ok(self.patterns.borrow().clone())
    }

    async fn save_patterns(&self, patterns: &[String]) -> Result<(), StoreError> {
        if !self.available.get() {
            return Err(StoreError::Unavailable);
        }
        *self.patterns.borrow_mut() = patterns.to_vec();
        Ok(())
    }
}
