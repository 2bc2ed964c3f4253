//! Resolves connection endpoints from configuration and discovery services.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Configurable, ConnectionParams, PersistenceConfig};
use crate::connect::Discovery;
use crate::error::PersistenceError;
use crate::refer::{Referenceable, References};

/// Endpoint resolver
///
/// Endpoints carrying a `discovery_key` are replaced by whatever the
/// registered discovery services return for that key; fields a discovered
/// endpoint leaves unset are taken from the configured one.
#[derive(Clone, Default)]
pub struct ConnectionResolver {
    connections: Vec<ConnectionParams>,
    discovery: Vec<Arc<dyn Discovery>>,
}

impl ConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every configured endpoint, substituting discovered ones
    pub async fn resolve_all(
        &self,
        correlation_id: Option<&str>,
    ) -> Result<Vec<ConnectionParams>, PersistenceError> {
        let mut resolved = Vec::with_capacity(self.connections.len());

        for connection in &self.connections {
            let Some(key) = connection.discovery_key() else {
                resolved.push(connection.clone());
                continue;
            };

            let discovered = self.resolve_in_discovery(correlation_id, key).await?;
            if discovered.is_empty() {
                warn!(
                    correlation_id = ?correlation_id,
                    discovery_key = %key,
                    "No connection found in discovery services"
                );
            }
            resolved.extend(
                discovered
                    .into_iter()
                    .map(|found| found.with_defaults_from(connection)),
            );
        }

        debug!(
            correlation_id = ?correlation_id,
            count = resolved.len(),
            "Resolved connections"
        );
        Ok(resolved)
    }

    async fn resolve_in_discovery(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> Result<Vec<ConnectionParams>, PersistenceError> {
        let mut found = Vec::new();
        for discovery in &self.discovery {
            found.extend(discovery.resolve_all(correlation_id, key).await?);
        }
        Ok(found)
    }
}

impl Configurable for ConnectionResolver {
    fn configure(&mut self, config: &PersistenceConfig) {
        self.connections = config.connection_params();
    }
}

impl Referenceable for ConnectionResolver {
    fn set_references(&mut self, references: &References) {
        self.discovery = references.discovery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::MemoryDiscovery;
    use crate::refer::Descriptor;

    fn references_with(discovery: MemoryDiscovery) -> References {
        let mut references = References::new();
        references.put_discovery(
            Descriptor::new("test", "discovery", "memory", "default", "1.0"),
            Arc::new(discovery),
        );
        references
    }

    #[tokio::test]
    async fn test_resolve_configured_connections() {
        let mut resolver = ConnectionResolver::new();
        resolver.configure(&PersistenceConfig {
            connection: Some(ConnectionParams::from_host("localhost", 5432, "test")),
            ..Default::default()
        });

        let resolved = resolver.resolve_all(None).await.unwrap();
        assert_eq!(resolved, vec![ConnectionParams::from_host("localhost", 5432, "test")]);
    }

    #[tokio::test]
    async fn test_discovery_substitution() {
        let discovery = MemoryDiscovery::from_entries([
            ("pg".to_string(), ConnectionParams::from_host("node1", 5432, "app")),
            ("pg".to_string(), ConnectionParams::from_host("node2", 5432, "app")),
        ]);

        let mut resolver = ConnectionResolver::new();
        resolver.configure(&PersistenceConfig {
            connections: vec![
                ConnectionParams {
                    discovery_key: Some("pg".to_string()),
                    ..Default::default()
                },
                ConnectionParams::from_uri("postgres://static/app"),
            ],
            ..Default::default()
        });
        resolver.set_references(&references_with(discovery));

        let resolved = resolver.resolve_all(Some("123")).await.unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].host(), Some("node1"));
        assert_eq!(resolved[1].host(), Some("node2"));
        assert_eq!(resolved[2].uri(), Some("postgres://static/app"));
    }

    #[tokio::test]
    async fn test_discovery_key_without_discovery_is_dropped() {
        let mut resolver = ConnectionResolver::new();
        resolver.configure(&PersistenceConfig {
            connection: Some(ConnectionParams {
                discovery_key: Some("missing".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert!(resolver.resolve_all(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discovered_fields_override_configured_ones() {
        let discovery = MemoryDiscovery::from_entries([(
            "pg".to_string(),
            ConnectionParams {
                host: Some("discovered".to_string()),
                port: Some(6432),
                ..Default::default()
            },
        )]);

        let mut resolver = ConnectionResolver::new();
        resolver.configure(&PersistenceConfig {
            connection: Some(ConnectionParams {
                discovery_key: Some("pg".to_string()),
                host: Some("configured".to_string()),
                database: Some("app".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        resolver.set_references(&references_with(discovery));

        let resolved = resolver.resolve_all(None).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].host(), Some("discovered"));
        assert_eq!(resolved[0].port(), Some(6432));
        assert_eq!(resolved[0].database(), Some("app"));
    }
}
