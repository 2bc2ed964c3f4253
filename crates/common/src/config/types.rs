//! # Configuration Types
//!
//! Configuration structures consumed by persistence components: connection
//! endpoints, credentials, pool options and the persistence section itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigurationError;

/// Default locator of the connection a persistence component depends on
pub const DEFAULT_CONNECTION_DEPENDENCY: &str = "*:connection:postgres:*:1.0";

/// One connection endpoint: either a self-sufficient URI or host/port/database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Resource URI or connection string with all parameters in it
    pub uri: Option<String>,

    /// Host name or IP address
    pub host: Option<String>,

    /// Port number; `0` is treated as unset
    pub port: Option<u16>,

    /// Database name
    pub database: Option<String>,

    /// Key used to retrieve the endpoint from a discovery service
    pub discovery_key: Option<String>,
}

impl ConnectionParams {
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn from_host(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            database: Some(database.into()),
            ..Default::default()
        }
    }

    /// URI, ignoring empty strings
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref().filter(|u| !u.is_empty())
    }

    /// Host, ignoring empty strings
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|h| !h.is_empty())
    }

    /// Port, with `0` read as unset
    pub fn port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }

    /// Database name, ignoring empty strings
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref().filter(|d| !d.is_empty())
    }

    pub fn discovery_key(&self) -> Option<&str> {
        self.discovery_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Fill fields missing here from `base`
    ///
    /// Used for discovered endpoints, which override the configured endpoint
    /// that named them field by field.
    pub fn with_defaults_from(self, base: &ConnectionParams) -> Self {
        Self {
            uri: self.uri.filter(|u| !u.is_empty()).or_else(|| base.uri.clone()),
            host: self.host.filter(|h| !h.is_empty()).or_else(|| base.host.clone()),
            port: self.port.filter(|p| *p != 0).or(base.port),
            database: self
                .database
                .filter(|d| !d.is_empty())
                .or_else(|| base.database.clone()),
            discovery_key: self
                .discovery_key
                .filter(|k| !k.is_empty())
                .or_else(|| base.discovery_key.clone()),
        }
    }
}

/// Optional credential pair, possibly kept in a credential store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialParams {
    pub username: Option<String>,
    pub password: Option<String>,

    /// Key used to retrieve the credential from a credential store
    pub store_key: Option<String>,
}

impl CredentialParams {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            store_key: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn store_key(&self) -> Option<&str> {
        self.store_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Pool and paging options (`options.*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceOptions {
    /// Maximum number of items returned by one page
    pub max_page_size: i64,

    /// Maximum number of pooled connections
    pub max_pool_size: u32,

    /// Milliseconds to wait for a pooled connection
    pub connect_timeout: u64,

    /// Milliseconds a connection may sit idle in the pool
    pub idle_timeout: u64,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            max_pool_size: 2,
            connect_timeout: 5000,
            idle_timeout: 10000,
        }
    }
}

impl PersistenceOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    /// `None` when idle connections are never reaped
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_millis(self.idle_timeout))
    }
}

/// Locators of components this component depends on (`dependencies.*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    pub connection: String,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION_DEPENDENCY.to_string(),
        }
    }
}

/// Configuration of a persistence component and its connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Table name (legacy key)
    pub collection: Option<String>,

    /// Table name; takes precedence over `collection`
    pub table: Option<String>,

    pub dependencies: DependenciesConfig,

    /// Single connection endpoint
    pub connection: Option<ConnectionParams>,

    /// Cluster endpoints; used instead of `connection` when not empty
    pub connections: Vec<ConnectionParams>,

    /// Single credential
    pub credential: Option<CredentialParams>,

    /// Alternative credentials; used instead of `credential` when not empty
    pub credentials: Vec<CredentialParams>,

    pub options: PersistenceOptions,
}

impl PersistenceConfig {
    /// Effective table name: `table`, falling back to `collection`
    pub fn table_name(&self) -> Option<&str> {
        self.table
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.collection.as_deref().filter(|c| !c.is_empty()))
    }

    /// Configured endpoints in declaration order
    pub fn connection_params(&self) -> Vec<ConnectionParams> {
        if !self.connections.is_empty() {
            self.connections.clone()
        } else {
            self.connection.iter().cloned().collect()
        }
    }

    /// Configured credentials in declaration order
    pub fn credential_params(&self) -> Vec<CredentialParams> {
        if !self.credentials.is_empty() {
            self.credentials.clone()
        } else {
            self.credential.iter().cloned().collect()
        }
    }
}

/// Common configuration validation trait
pub trait ConfigValidation {
    type Error;

    /// Validate configuration and return any errors
    fn validate(&self) -> Result<(), Self::Error>;

    /// Get configuration warnings (non-fatal issues)
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

impl ConfigValidation for PersistenceConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.options.max_page_size <= 0 {
            return Err(ConfigurationError::invalid(
                None,
                "INVALID_PAGE_SIZE",
                "options.max_page_size must be greater than 0",
            ));
        }

        if self.options.max_pool_size == 0 {
            return Err(ConfigurationError::invalid(
                None,
                "INVALID_POOL_SIZE",
                "options.max_pool_size must be greater than 0",
            ));
        }

        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.table_name().is_none() {
            warnings.push("No table name configured (table/collection)".to_string());
        }

        if self.connection_params().is_empty() {
            warnings.push("No connection endpoint configured".to_string());
        }

        if !self.connections.is_empty() && self.connection.is_some() {
            warnings.push("Both connection and connections are set; connection is ignored".to_string());
        }

        warnings
    }
}
