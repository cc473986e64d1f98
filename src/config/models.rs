//! Configuration data structures for Astrix.
//!
//! [`ContextSettings`] maps the `[astrix]` table of a TOML (also JSON / YAML)
//! settings file. Every field has a default so an empty table is valid.
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    config::validation::{ValidationError, ValidationResult},
    ports::settings::SettingsReader,
};

/// Subsystem assumed for consumers and providers that do not name one.
pub const DEFAULT_SUBSYSTEM: &str = "default";

/// Setting names understood by [`ContextSettings::from_reader`].
pub mod keys {
    pub const SUBSYSTEM: &str = "astrix.subsystem";
    pub const ENFORCE_SUBSYSTEM_BOUNDARIES: &str = "astrix.enforce_subsystem_boundaries";
    pub const BEAN_BIND_ATTEMPT_INTERVAL: &str = "astrix.bean_bind_attempt_interval";
    pub const SERVICE_LEASE_RENEW_INTERVAL: &str = "astrix.service_lease_renew_interval";
    pub const BIND_WORKER_POOL_SIZE: &str = "astrix.bind_worker_pool_size";
    pub const SERVICES: &str = "astrix.services";
    pub const BEANS: &str = "astrix.beans";

    /// Setting holding the service URI of a config-provided service.
    pub fn service(name: &str) -> String {
        format!("{SERVICES}.{name}")
    }

    /// Per-bean switch, `true` unless set. A bean set to `false` refuses
    /// every call whatever its bind state.
    pub fn bean_available(bean: &impl std::fmt::Display) -> String {
        format!("{BEANS}.{bean}.available")
    }
}

/// Runtime settings of an Astrix context
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ContextSettings {
    /// Subsystem this application belongs to
    pub subsystem: String,
    /// Refuse non-versioned services provided by other subsystems
    pub enforce_subsystem_boundaries: bool,
    /// How often unbound beans retry binding, e.g. "10s", "250ms"
    pub bean_bind_attempt_interval: String,
    /// How often bound beans re-run discovery
    pub service_lease_renew_interval: String,
    /// Maximum concurrent bind attempts
    pub bind_worker_pool_size: usize,
    /// Service URIs (`<component>:<address>`) by name, for config discovery
    pub services: BTreeMap<String, String>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            subsystem: DEFAULT_SUBSYSTEM.to_string(),
            enforce_subsystem_boundaries: true,
            bean_bind_attempt_interval: "10s".to_string(),
            service_lease_renew_interval: "30s".to_string(),
            bind_worker_pool_size: 4,
            services: BTreeMap::new(),
        }
    }
}

impl ContextSettings {
    /// Read the well-known settings, falling back to defaults.
    ///
    /// Service URIs are not enumerated; config discovery reads them by name
    /// when a bean binds.
    pub fn from_reader(reader: &dyn SettingsReader) -> Self {
        let defaults = Self::default();
        let pool_size = reader.get_long(
            keys::BIND_WORKER_POOL_SIZE,
            defaults.bind_worker_pool_size as i64,
        );
        Self {
            subsystem: reader
                .get_string(keys::SUBSYSTEM, Some(&defaults.subsystem))
                .unwrap_or(defaults.subsystem),
            enforce_subsystem_boundaries: reader.get_boolean(
                keys::ENFORCE_SUBSYSTEM_BOUNDARIES,
                defaults.enforce_subsystem_boundaries,
            ),
            bean_bind_attempt_interval: reader
                .get_string(
                    keys::BEAN_BIND_ATTEMPT_INTERVAL,
                    Some(&defaults.bean_bind_attempt_interval),
                )
                .unwrap_or(defaults.bean_bind_attempt_interval),
            service_lease_renew_interval: reader
                .get_string(
                    keys::SERVICE_LEASE_RENEW_INTERVAL,
                    Some(&defaults.service_lease_renew_interval),
                )
                .unwrap_or(defaults.service_lease_renew_interval),
            // Negative values become zero and are rejected by validation.
            bind_worker_pool_size: usize::try_from(pool_size).unwrap_or(0),
            services: BTreeMap::new(),
        }
    }

    pub fn bind_attempt_interval(&self) -> ValidationResult<Duration> {
        parse_interval("bean_bind_attempt_interval", &self.bean_bind_attempt_interval)
    }

    pub fn lease_renew_interval(&self) -> ValidationResult<Duration> {
        parse_interval(
            "service_lease_renew_interval",
            &self.service_lease_renew_interval,
        )
    }
}

fn parse_interval(field: &str, value: &str) -> ValidationResult<Duration> {
    humantime::parse_duration(value).map_err(|e| ValidationError::InvalidField {
        field: field.to_string(),
        message: format!("invalid duration '{value}': {e}"),
    })
}
