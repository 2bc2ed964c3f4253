//! Component descriptors used to locate dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

const WILDCARD: &str = "*";

/// Five-part component locator: `group:type:kind:name:version`
///
/// Any part may be `*`, which matches every value on the other side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    group: String,
    kind_type: String,
    kind: String,
    name: String,
    version: String,
}

impl Descriptor {
    pub fn new(
        group: impl Into<String>,
        kind_type: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind_type: kind_type.into(),
            kind: kind.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind_type(&self) -> &str {
        &self.kind_type
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Part-wise match where `*` on either side matches anything
    pub fn matches(&self, other: &Descriptor) -> bool {
        fn part(a: &str, b: &str) -> bool {
            a == WILDCARD || b == WILDCARD || a == b
        }

        part(&self.group, &other.group)
            && part(&self.kind_type, &other.kind_type)
            && part(&self.kind, &other.kind)
            && part(&self.name, &other.name)
            && part(&self.version, &other.version)
    }
}

impl FromStr for Descriptor {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 5 {
            return Err(ConfigurationError::invalid(
                None,
                "BAD_DESCRIPTOR",
                format!("Descriptor {value} is in wrong format"),
            ));
        }

        Ok(Self::new(
            parts[0].trim(),
            parts[1].trim(),
            parts[2].trim(),
            parts[3].trim(),
            parts[4].trim(),
        ))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.group, self.kind_type, self.kind, self.name, self.version
        )
    }
}
