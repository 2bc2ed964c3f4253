//! Resolves credentials from configuration and credential stores.

use std::sync::Arc;
use tracing::warn;

use crate::config::{Configurable, CredentialParams, PersistenceConfig};
use crate::connect::CredentialStore;
use crate::refer::{Referenceable, References};

/// Credential resolver
///
/// Lookup never fails: store errors are logged and treated as absence.
#[derive(Clone, Default)]
pub struct CredentialResolver {
    credentials: Vec<CredentialParams>,
    stores: Vec<Arc<dyn CredentialStore>>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// First usable credential, in declaration order
    pub async fn lookup(&self, correlation_id: Option<&str>) -> Option<CredentialParams> {
        for credential in &self.credentials {
            let Some(key) = credential.store_key() else {
                return Some(credential.clone());
            };

            if let Some(found) = self.lookup_in_stores(correlation_id, key).await {
                return Some(found);
            }
        }

        None
    }

    async fn lookup_in_stores(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> Option<CredentialParams> {
        for store in &self.stores {
            match store.lookup(correlation_id, key).await {
                Ok(Some(credential)) => return Some(credential),
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        correlation_id = ?correlation_id,
                        store_key = %key,
                        error = %e,
                        "Credential store lookup failed"
                    );
                }
            }
        }
        None
    }
}

impl Configurable for CredentialResolver {
    fn configure(&mut self, config: &PersistenceConfig) {
        self.credentials = config.credential_params();
    }
}

impl Referenceable for CredentialResolver {
    fn set_references(&mut self, references: &References) {
        self.stores = references.credential_stores();
    }
}
