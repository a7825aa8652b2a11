//! The narrow contract between the emitter and a concrete store.
//!
//! Two implementations:
//! - `WeaviateClient`: HTTP against a running Weaviate instance
//! - `MemoryStore`: in-process, records every operation and can be told to
//!   fail (testing and dry runs)

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::schema::StoreSchema;
use crate::graph::{EntryId, EntryRef};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),
    #[error("Store operation timed out: {0}")]
    Timeout(String),
    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Transient store failure: {0}")]
    Transient(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl StoreError {
    /// Whether the same request may succeed when repeated.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_) | Self::Transient(_))
    }

    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the emitter needs from a store.
///
/// Upserts are keyed by `(class_name, id)` and must be idempotent.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Check that the store is up and accepting requests.
    async fn ping(&self) -> StoreResult<()>;

    /// Create whatever classes and properties of `schema` are missing.
    async fn ensure_schema(&self, schema: &StoreSchema) -> StoreResult<()>;

    async fn upsert(&self, class_name: &str, id: EntryId, data: &Map<String, Value>) -> StoreResult<()>;

    /// Add `to` to the `property` reference list of `from`.
    async fn link(&self, from: &EntryRef, property: &str, to: &EntryRef) -> StoreResult<()>;
}

/// A recorded link: `from.property -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredLink {
    pub from: EntryRef,
    pub property: String,
    pub to: EntryRef,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<EntryRef, Map<String, Value>>,
    links: HashSet<StoredLink>,
    schemas: Vec<String>,
    upsert_attempts: HashMap<EntryId, usize>,
    upsert_failures: HashMap<EntryId, VecDeque<StoreError>>,
    link_failures: HashMap<(EntryId, String), VecDeque<StoreError>>,
}

/// In-process store.
pub struct MemoryStore {
    available: bool,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::available()
    }
}

impl MemoryStore {
    pub fn available() -> Self {
        Self {
            available: true,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Every operation fails with `Unreachable`.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Queue failures for the next upserts of `id`, one per attempt.
    #[must_use]
    pub fn with_upsert_failures(mut self, id: EntryId, failures: Vec<StoreError>) -> Self {
        self.state.get_mut().upsert_failures.entry(id).or_default().extend(failures);
        self
    }

    /// Queue failures for the next links from `from` through `property`.
    #[must_use]
    pub fn with_link_failures(mut self, from: EntryId, property: &str, failures: Vec<StoreError>) -> Self {
        self.state
            .get_mut()
            .link_failures
            .entry((from, property.to_string()))
            .or_default()
            .extend(failures);
        self
    }

    pub async fn object(&self, key: &EntryRef) -> Option<Map<String, Value>> {
        self.state.lock().await.objects.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn links(&self) -> HashSet<StoredLink> {
        self.state.lock().await.links.clone()
    }

    pub async fn has_link(&self, from: &EntryRef, property: &str, to: &EntryRef) -> bool {
        self.state.lock().await.links.contains(&StoredLink {
            from: from.clone(),
            property: property.to_string(),
            to: to.clone(),
        })
    }

    pub async fn upsert_attempts(&self, id: EntryId) -> usize {
        self.state.lock().await.upsert_attempts.get(&id).copied().unwrap_or(0)
    }

    pub async fn schemas(&self) -> Vec<String> {
        self.state.lock().await.schemas.clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store configured as unavailable".to_string()))
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }

    async fn ensure_schema(&self, schema: &StoreSchema) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if !state.schemas.contains(&schema.name) {
            state.schemas.push(schema.name.clone());
        }
        Ok(())
    }

    async fn upsert(&self, class_name: &str, id: EntryId, data: &Map<String, Value>) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        *state.upsert_attempts.entry(id).or_insert(0) += 1;

        if let Some(error) = state.upsert_failures.get_mut(&id).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        let key = EntryRef {
            class_name: class_name.to_string(),
            id,
        };
        state.objects.insert(key, data.clone());
        Ok(())
    }

    async fn link(&self, from: &EntryRef, property: &str, to: &EntryRef) -> StoreResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        if let Some(error) = state
            .link_failures
            .get_mut(&(from.id, property.to_string()))
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        if !state.objects.contains_key(from) {
            return Err(StoreError::Rejected {
                status: 404,
                message: format!("no object {from}"),
            });
        }
        if !state.objects.contains_key(to) {
            return Err(StoreError::Rejected {
                status: 422,
                message: format!("link target {to} does not exist"),
            });
        }

        state.links.insert(StoredLink {
            from: from.clone(),
            property: property.to_string(),
            to: to.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::assign;

    fn key(class_name: &str, seq: i64) -> (EntryRef, Map<String, Value>) {
        let mut data = Map::new();
        data.insert("seq".into(), Value::from(seq));
        let id = assign(class_name, &data);
        (
            EntryRef {
                class_name: class_name.to_string(),
                id,
            },
            data,
        )
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unreachable("x".into()).is_retryable());
        assert!(StoreError::Timeout("x".into()).is_retryable());
        assert!(StoreError::Transient("x".into()).is_retryable());
        assert!(!StoreError::Rejected { status: 422, message: "x".into() }.is_retryable());
        assert!(!StoreError::InvalidUrl("x".into()).is_retryable());
    }

    #[test]
    fn test_error_variants_are_exhaustive() {
        let errors = [
            StoreError::Unreachable("x".into()),
            StoreError::Timeout("x".into()),
            StoreError::Rejected { status: 500, message: "x".into() },
            StoreError::Transient("x".into()),
            StoreError::InvalidUrl("x".into()),
        ];

        for error in &errors {
            let expected = match error {
                StoreError::Unreachable(_) | StoreError::Timeout(_) | StoreError::Transient(_) => true,
                StoreError::Rejected { .. } | StoreError::InvalidUrl(_) => false,
            };
            assert_eq!(error.is_retryable(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::available();
        let (book, data) = key("Book", 1);

        store.upsert("Book", book.id, &data).await.unwrap();
        store.upsert("Book", book.id, &data).await.unwrap();

        assert_eq!(store.object_count().await, 1);
        assert_eq!(store.upsert_attempts(book.id).await, 2);
        assert_eq!(store.object(&book).await, Some(data));
    }

    #[tokio::test]
    async fn test_link_requires_both_objects() {
        let store = MemoryStore::available();
        let (book, book_data) = key("Book", 1);
        let (meta, _) = key("Meta", 1);

        store.upsert("Book", book.id, &book_data).await.unwrap();
        let result = store.link(&book, "meta", &meta).await;

        assert!(matches!(result, Err(StoreError::Rejected { status: 422, .. })));
        assert!(store.links().await.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures_consumed_in_order() {
        let (book, data) = key("Book", 1);
        let store = MemoryStore::available().with_upsert_failures(
            book.id,
            vec![StoreError::Timeout("slow".into()), StoreError::Transient("503".into())],
        );

        assert!(matches!(store.upsert("Book", book.id, &data).await, Err(StoreError::Timeout(_))));
        assert!(matches!(store.upsert("Book", book.id, &data).await, Err(StoreError::Transient(_))));
        assert!(store.upsert("Book", book.id, &data).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::unavailable();
        assert!(matches!(store.ping().await, Err(StoreError::Unreachable(_))));
        assert!(store.ensure_schema(&StoreSchema::gutenberg()).await.is_err());
    }
}
