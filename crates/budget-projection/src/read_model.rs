//! In-memory read-model storage.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::projection::{ReadModel, ReadModelRepository};

fn poisoned() -> DomainError {
    DomainError::Infrastructure("read model lock poisoned".into())
}

/// Read-model rows held in an ordered map.
#[derive(Debug)]
pub struct InMemoryReadModelRepository<V: ReadModel> {
    rows: RwLock<BTreeMap<V::Key, V>>,
}

impl<V: ReadModel> Default for InMemoryReadModelRepository<V> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<V: ReadModel> InMemoryReadModelRepository<V> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<V: ReadModel> ReadModelRepository<V> for InMemoryReadModelRepository<V> {
    async fn find_one(&self, key: &V::Key) -> Result<Option<V>, DomainError> {
        Ok(self.rows.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn find_all(&self) -> Result<Vec<V>, DomainError> {
        Ok(self
            .rows
            .read()
            .map_err(|_| poisoned())?
            .values()
            .cloned()
            .collect())
    }

    async fn save(&self, view: V) -> Result<(), DomainError> {
        self.rows
            .write()
            .map_err(|_| poisoned())?
            .insert(view.key(), view);
        Ok(())
    }

    async fn delete(&self, key: &V::Key) -> Result<(), DomainError> {
        self.rows.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}
