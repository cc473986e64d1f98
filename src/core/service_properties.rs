use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::ports::service_component::{ServiceError, ServiceResult};

/// Property naming the service component that knows how to bind the service.
pub const COMPONENT: &str = "_component";
/// Property naming the subsystem that provides the service.
pub const SUBSYSTEM: &str = "_subsystem";
pub const QUALIFIER: &str = "_qualifier";
pub const API: &str = "_api";
pub const APPLICATION_INSTANCE_ID: &str = "_applicationInstanceId";

/// Flat string metadata describing where and how to reach a service.
///
/// Two property sets are equal when they hold the same entries. Lease
/// renewal relies on that to decide whether to rebind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceProperties {
    properties: BTreeMap<String, String>,
}

impl ServiceProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn component(&self) -> Option<&str> {
        self.get(COMPONENT).filter(|c| !c.is_empty())
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.get(SUBSYSTEM)
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.get(QUALIFIER)
    }

    pub fn api(&self) -> Option<&str> {
        self.get(API)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl FromIterator<(String, String)> for ServiceProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ServiceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// Versioning information for the API a bean is bound against.
///
/// Versioned APIs carry their own compatibility contract and may therefore
/// cross subsystem boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceVersioningContext {
    version: Option<u32>,
}

impl ServiceVersioningContext {
    pub fn non_versioned() -> Self {
        Self { version: None }
    }

    pub fn versioned(version: u32) -> Self {
        Self {
            version: Some(version),
        }
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }
}

/// Split a service URI of the form `<component>:<address>`.
pub fn split_service_uri(uri: &str) -> ServiceResult<(&str, &str)> {
    match uri.split_once(':') {
        Some((component, address)) if !component.is_empty() && !address.is_empty() => {
            Ok((component, address))
        }
        _ => Err(ServiceError::IllegalMetadata(format!(
            "Malformed service uri '{uri}', expected <component>:<address>"
        ))),
    }
}
