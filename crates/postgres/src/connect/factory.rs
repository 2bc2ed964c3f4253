//! Creates Postgres components by their descriptors.

use common::refer::Descriptor;

use crate::connect::PostgresConnection;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnectionFactory;

impl PostgresConnectionFactory {
    pub fn new() -> Self {
        Self
    }

    /// Descriptor under which created connections are registered
    pub fn connection_descriptor() -> Descriptor {
        Descriptor::new("persistence", "connection", "postgres", "*", "1.0")
    }

    pub fn can_create(&self, locator: &Descriptor) -> bool {
        locator.matches(&Self::connection_descriptor())
    }

    /// New, unconfigured connection; `None` when the locator is not served here
    pub fn create(&self, locator: &Descriptor) -> Option<PostgresConnection> {
        self.can_create(locator).then(PostgresConnection::new)
    }
}
