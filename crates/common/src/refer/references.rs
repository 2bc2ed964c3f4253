//! Component registry.
//!
//! Components are registered under a [`Descriptor`] and resolved by locator.
//! Capabilities the resolvers need (discovery, credential stores) are kept in
//! typed registries; anything else goes into the untyped component registry
//! and is recovered by downcasting.

use std::any::Any;
use std::sync::Arc;

use crate::connect::{CredentialStore, Discovery};
use crate::refer::Descriptor;

/// Descriptor-indexed list of shared components
pub struct Registry<T: ?Sized> {
    entries: Vec<(Descriptor, Arc<T>)>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn put(&mut self, descriptor: Descriptor, component: Arc<T>) {
        self.entries.push((descriptor, component));
    }

    /// All components matching the locator, in registration order
    pub fn get_optional(&self, locator: &Descriptor) -> Vec<Arc<T>> {
        self.entries
            .iter()
            .filter(|(descriptor, _)| locator.matches(descriptor))
            .map(|(_, component)| component.clone())
            .collect()
    }

    /// First component matching the locator
    pub fn get_one_optional(&self, locator: &Descriptor) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|(descriptor, _)| locator.matches(descriptor))
            .map(|(_, component)| component.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locator of every discovery service
pub fn discovery_locator() -> Descriptor {
    Descriptor::new("*", "discovery", "*", "*", "*")
}

/// Locator of every credential store
pub fn credential_store_locator() -> Descriptor {
    Descriptor::new("*", "credential-store", "*", "*", "*")
}

/// References passed to components so they can find their dependencies
#[derive(Clone, Default)]
pub struct References {
    discovery: Registry<dyn Discovery>,
    credential_stores: Registry<dyn CredentialStore>,
    components: Registry<dyn Any + Send + Sync>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_discovery(&mut self, descriptor: Descriptor, discovery: Arc<dyn Discovery>) {
        self.discovery.put(descriptor, discovery);
    }

    pub fn put_credential_store(
        &mut self,
        descriptor: Descriptor,
        store: Arc<dyn CredentialStore>,
    ) {
        self.credential_stores.put(descriptor, store);
    }

    pub fn put_component<T: Any + Send + Sync>(&mut self, descriptor: Descriptor, component: Arc<T>) {
        self.components.put(descriptor, component);
    }

    /// Every registered discovery service
    pub fn discovery(&self) -> Vec<Arc<dyn Discovery>> {
        self.discovery.get_optional(&discovery_locator())
    }

    /// Every registered credential store
    pub fn credential_stores(&self) -> Vec<Arc<dyn CredentialStore>> {
        self.credential_stores
            .get_optional(&credential_store_locator())
    }

    /// First component matching the locator that has type `T`
    pub fn get_component<T: Any + Send + Sync>(&self, locator: &Descriptor) -> Option<Arc<T>> {
        self.components
            .get_optional(locator)
            .into_iter()
            .find_map(|component| component.downcast::<T>().ok())
    }
}

/// Component that resolves its dependencies from references
pub trait Referenceable {
    fn set_references(&mut self, references: &References);
}
