//! In-memory projection checkpoints.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::projection::CheckpointStore;

fn poisoned() -> DomainError {
    DomainError::Infrastructure("checkpoint lock poisoned".into())
}

/// Checkpoints held in process memory.
///
/// Pairs with in-memory read models: both vanish on restart, so every
/// projection rebuilds from the start of the log.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    positions: RwLock<HashMap<String, i64>>,
}

impl InMemoryCheckpointStore {
    /// Creates a store with no checkpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection: &str) -> Result<Option<i64>, DomainError> {
        Ok(self
            .positions
            .read()
            .map_err(|_| poisoned())?
            .get(projection)
            .copied())
    }

    async fn save(&self, projection: &str, position: i64) -> Result<(), DomainError> {
        self.positions
            .write()
            .map_err(|_| poisoned())?
            .insert(projection.to_owned(), position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoints_are_kept_per_projection() {
        // Arrange
        let store = InMemoryCheckpointStore::new();

        // Act
        store.save("plans", 4).await.unwrap();
        store.save("plans", 9).await.unwrap();
        store.save("users", 2).await.unwrap();

        // Assert
        assert_eq!(store.load("plans").await.unwrap(), Some(9));
        assert_eq!(store.load("users").await.unwrap(), Some(2));
        assert_eq!(store.load("envelopes").await.unwrap(), None);
    }
}
