//! Postgres connection resolver
//!
//! Gathers endpoints (configured or discovered) and credentials (configured or
//! stored), validates the endpoints and composes the settings handed to the
//! driver.
//!
//! ### Configuration
//!
//! - `connection` / `connections[]`: `discovery_key`, `host`, `port`,
//!   `database`, `uri`
//! - `credential` / `credentials[]`: `store_key`, `username`, `password`

use common::config::{Configurable, ConnectionParams, CredentialParams, PersistenceConfig};
use common::connect::{ConnectionResolver, CredentialResolver};
use common::error::{ConfigurationError, PersistenceError};
use common::refer::{Referenceable, References};
use serde::{Deserialize, Serialize};

/// Effective driver settings produced by one resolve
///
/// Built fresh on every call; later endpoints override earlier ones field by
/// field and credentials are applied last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedConfig {
    pub connection_string: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Default)]
pub struct PostgresConnectionResolver {
    connection_resolver: ConnectionResolver,
    credential_resolver: CredentialResolver,
}

impl PostgresConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve, validate and compose the effective connection settings
    pub async fn resolve(
        &self,
        correlation_id: Option<&str>,
    ) -> Result<ComposedConfig, PersistenceError> {
        let connections = self.connection_resolver.resolve_all(correlation_id).await?;
        Self::validate_connections(correlation_id, &connections)?;

        // Credentials are optional and never validated
        let credential = self.credential_resolver.lookup(correlation_id).await;

        Ok(Self::compose(&connections, credential.as_ref()))
    }

    /// Check a single endpoint; a URI makes it valid regardless of other fields
    pub fn validate_connection(
        correlation_id: Option<&str>,
        connection: &ConnectionParams,
    ) -> Result<(), ConfigurationError> {
        if connection.uri().is_some() {
            return Ok(());
        }
        if connection.host().is_none() {
            return Err(ConfigurationError::invalid(
                correlation_id,
                "NO_HOST",
                "Connection host is not set",
            ));
        }
        if connection.port().is_none() {
            return Err(ConfigurationError::invalid(
                correlation_id,
                "NO_PORT",
                "Connection port is not set",
            ));
        }
        if connection.database().is_none() {
            return Err(ConfigurationError::invalid(
                correlation_id,
                "NO_DATABASE",
                "Connection database is not set",
            ));
        }
        Ok(())
    }

    pub fn validate_connections(
        correlation_id: Option<&str>,
        connections: &[ConnectionParams],
    ) -> Result<(), ConfigurationError> {
        if connections.is_empty() {
            return Err(ConfigurationError::invalid(
                correlation_id,
                "NO_CONNECTION",
                "Database connection is not set",
            ));
        }

        connections
            .iter()
            .try_for_each(|connection| Self::validate_connection(correlation_id, connection))
    }

    pub fn compose(
        connections: &[ConnectionParams],
        credential: Option<&CredentialParams>,
    ) -> ComposedConfig {
        let mut config = ComposedConfig::default();

        for connection in connections {
            if let Some(uri) = connection.uri() {
                config.connection_string = Some(uri.to_string());
            }
            if let Some(host) = connection.host() {
                config.host = Some(host.to_string());
            }
            if let Some(port) = connection.port() {
                config.port = Some(port);
            }
            if let Some(database) = connection.database() {
                config.database = Some(database.to_string());
            }
        }

        if let Some(credential) = credential {
            if let Some(username) = credential.username() {
                config.user = Some(username.to_string());
            }
            if let Some(password) = credential.password() {
                config.password = Some(password.to_string());
            }
        }

        config
    }
}

impl Configurable for PostgresConnectionResolver {
    fn configure(&mut self, config: &PersistenceConfig) {
        self.connection_resolver.configure(config);
        self.credential_resolver.configure(config);
    }
}

impl Referenceable for PostgresConnectionResolver {
    fn set_references(&mut self, references: &References) {
        self.connection_resolver.set_references(references);
        self.credential_resolver.set_references(references);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::connect::{CredentialStore, MemoryCredentialStore, MemoryDiscovery};
    use common::error::ComponentError;
    use common::refer::Descriptor;
    use std::sync::Arc;

    fn configured(config: PersistenceConfig) -> PostgresConnectionResolver {
        let mut resolver = PostgresConnectionResolver::new();
        resolver.configure(&config);
        resolver
    }

    #[tokio::test]
    async fn test_resolve_host_port_database() {
        let resolver = configured(PersistenceConfig {
            connection: Some(ConnectionParams::from_host("localhost", 5432, "test")),
            credential: Some(CredentialParams::new("postgres", "postgres")),
            ..Default::default()
        });

        let config = resolver.resolve(Some("123")).await.unwrap();
        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.port, Some(5432));
        assert_eq!(config.database.as_deref(), Some("test"));
        assert_eq!(config.user.as_deref(), Some("postgres"));
        assert_eq!(config.password.as_deref(), Some("postgres"));
        assert_eq!(config.connection_string, None);
    }

    #[tokio::test]
    async fn test_resolve_without_credentials() {
        let resolver = configured(PersistenceConfig {
            connection: Some(ConnectionParams::from_host("localhost", 5432, "test")),
            ..Default::default()
        });

        let config = resolver.resolve(None).await.unwrap();
        assert_eq!(config.user, None);
        assert_eq!(config.password, None);
    }

    #[tokio::test]
    async fn test_no_connection() {
        let err = configured(PersistenceConfig::default())
            .resolve(Some("123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_CONNECTION");
        assert_eq!(err.correlation_id(), Some("123"));
    }

    #[test]
    fn test_malformed_endpoints() {
        let cases = [
            (ConnectionParams::default(), "NO_HOST"),
            (
                ConnectionParams {
                    host: Some(String::new()),
                    port: Some(5432),
                    database: Some("test".to_string()),
                    ..Default::default()
                },
                "NO_HOST",
            ),
            (
                ConnectionParams {
                    host: Some("localhost".to_string()),
                    database: Some("test".to_string()),
                    ..Default::default()
                },
                "NO_PORT",
            ),
            (ConnectionParams::from_host("localhost", 0, "test"), "NO_PORT"),
            (
                ConnectionParams {
                    host: Some("localhost".to_string()),
                    port: Some(5432),
                    ..Default::default()
                },
                "NO_DATABASE",
            ),
        ];

        for (connection, code) in cases {
            let err = PostgresConnectionResolver::validate_connection(None, &connection).unwrap_err();
            assert_eq!(err.code(), code, "endpoint {connection:?}");
        }
    }

    #[test]
    fn test_uri_skips_field_validation() {
        let connection = ConnectionParams {
            uri: Some("postgres://localhost/test".to_string()),
            port: Some(0),
            ..Default::default()
        };
        assert!(PostgresConnectionResolver::validate_connection(None, &connection).is_ok());
    }

    #[test]
    fn test_first_invalid_endpoint_fails_all() {
        let connections = vec![
            ConnectionParams::from_host("a", 5432, "db"),
            ConnectionParams::from_host("b", 0, "db"),
        ];
        let err = PostgresConnectionResolver::validate_connections(None, &connections).unwrap_err();
        assert_eq!(err.code(), "NO_PORT");
    }

    #[test]
    fn test_compose_last_endpoint_wins() {
        let connections = vec![
            ConnectionParams::from_host("a", 5432, "first"),
            ConnectionParams {
                host: Some("b".to_string()),
                port: Some(5433),
                ..Default::default()
            },
        ];
        let credential = CredentialParams {
            username: Some("admin".to_string()),
            ..Default::default()
        };

        let config = PostgresConnectionResolver::compose(&connections, Some(&credential));
        assert_eq!(config.host.as_deref(), Some("b"));
        assert_eq!(config.port, Some(5433));
        assert_eq!(config.database.as_deref(), Some("first"));
        assert_eq!(config.user.as_deref(), Some("admin"));
        assert_eq!(config.password, None);
    }

    #[tokio::test]
    async fn test_resolve_through_discovery_and_store() {
        let discovery = MemoryDiscovery::from_entries([(
            "pg".to_string(),
            ConnectionParams::from_uri("postgres://db.internal:5432/app"),
        )]);
        let store = MemoryCredentialStore::new();
        store
            .store(None, "pg-cred", Some(CredentialParams::new("app", "secret")))
            .await
            .unwrap();

        let mut references = References::new();
        references.put_discovery(
            Descriptor::new("test", "discovery", "memory", "default", "1.0"),
            Arc::new(discovery),
        );
        references.put_credential_store(
            Descriptor::new("test", "credential-store", "memory", "default", "1.0"),
            Arc::new(store),
        );

        let mut resolver = configured(PersistenceConfig {
            connection: Some(ConnectionParams {
                discovery_key: Some("pg".to_string()),
                ..Default::default()
            }),
            credential: Some(CredentialParams {
                store_key: Some("pg-cred".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        resolver.set_references(&references);

        let config = resolver.resolve(None).await.unwrap();
        assert_eq!(
            config.connection_string.as_deref(),
            Some("postgres://db.internal:5432/app")
        );
        assert_eq!(config.user.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_discovered_endpoint_keeps_configured_database() {
        let discovery = MemoryDiscovery::from_entries([(
            "main-db".to_string(),
            ConnectionParams {
                host: Some("10.0.0.5".to_string()),
                port: Some(5432),
                ..Default::default()
            },
        )]);
        let mut references = References::new();
        references.put_discovery(
            Descriptor::new("test", "discovery", "memory", "default", "1.0"),
            Arc::new(discovery),
        );

        let mut resolver = configured(PersistenceConfig {
            connection: Some(ConnectionParams {
                discovery_key: Some("main-db".to_string()),
                database: Some("app".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        resolver.set_references(&references);

        let config = resolver.resolve(None).await.unwrap();
        assert_eq!(config.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.port, Some(5432));
        assert_eq!(config.database.as_deref(), Some("app"));
    }
}
