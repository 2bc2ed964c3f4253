//! Discovery and credential-store capabilities.
//!
//! Both are looked up through [`References`](crate::refer::References) by the
//! embedded resolvers and queried by key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{ConnectionParams, CredentialParams};
use crate::error::PersistenceError;

/// Service that resolves connection endpoints by key
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Register an endpoint under a key
    async fn register(
        &self,
        correlation_id: Option<&str>,
        key: &str,
        connection: ConnectionParams,
    ) -> Result<(), PersistenceError>;

    /// Resolve every endpoint registered under a key
    async fn resolve_all(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> Result<Vec<ConnectionParams>, PersistenceError>;
}

/// Secure store that resolves credentials by key
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn store(
        &self,
        correlation_id: Option<&str>,
        key: &str,
        credential: Option<CredentialParams>,
    ) -> Result<(), PersistenceError>;

    async fn lookup(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> Result<Option<CredentialParams>, PersistenceError>;
}

/// Discovery service that keeps endpoints in memory
#[derive(Clone, Default)]
pub struct MemoryDiscovery {
    items: Arc<RwLock<HashMap<String, Vec<ConnectionParams>>>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a discovery service from `(key, endpoint)` pairs
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ConnectionParams)>) -> Self {
        let mut items: HashMap<String, Vec<ConnectionParams>> = HashMap::new();
        for (key, connection) in entries {
            items.entry(key).or_default().push(connection);
        }
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn register(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
        connection: ConnectionParams,
    ) -> Result<(), PersistenceError> {
        self.items
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(connection);
        Ok(())
    }

    async fn resolve_all(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> Result<Vec<ConnectionParams>, PersistenceError> {
        Ok(self
            .items
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

/// Credential store that keeps credentials in memory
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    items: Arc<RwLock<HashMap<String, CredentialParams>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn store(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
        credential: Option<CredentialParams>,
    ) -> Result<(), PersistenceError> {
        let mut items = self.items.write().await;
        match credential {
            Some(credential) => {
                items.insert(key.to_string(), credential);
            }
            None => {
                items.remove(key);
            }
        }
        Ok(())
    }

    async fn lookup(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> Result<Option<CredentialParams>, PersistenceError> {
        Ok(self.items.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_discovery() {
        let discovery = MemoryDiscovery::new();
        discovery
            .register(None, "db", ConnectionParams::from_host("a", 5432, "app"))
            .await
            .unwrap();
        discovery
            .register(None, "db", ConnectionParams::from_host("b", 5432, "app"))
            .await
            .unwrap();

        let resolved = discovery.resolve_all(None, "db").await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(discovery.resolve_all(None, "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_credential_store() {
        let store = MemoryCredentialStore::new();
        store
            .store(None, "pg", Some(CredentialParams::new("admin", "secret")))
            .await
            .unwrap();

        let found = store.lookup(None, "pg").await.unwrap().unwrap();
        assert_eq!(found.username(), Some("admin"));

        store.store(None, "pg", None).await.unwrap();
        assert!(store.lookup(None, "pg").await.unwrap().is_none());
    }
}
