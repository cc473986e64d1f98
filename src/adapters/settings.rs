use scc::HashMap;

use crate::{
    config::models::{ContextSettings, keys},
    ports::settings::SettingsReader,
};

/// In-memory settings. Values are stored as strings and parsed on read, so
/// they can be changed while a context is running.
#[derive(Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.values
            .entry(name.to_string())
            .and_modify(|current| current.clone_from(&value))
            .or_insert(value);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// Builder-style [`MapSettings::set`].
    pub fn with(self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    fn get(&self, name: &str) -> Option<String> {
        self.values.read(name, |_, value| value.clone())
    }
}

impl SettingsReader for MapSettings {
    fn get_string(&self, name: &str, default: Option<&str>) -> Option<String> {
        self.get(name).or_else(|| default.map(str::to_string))
    }

    fn get_long(&self, name: &str, default: i64) -> i64 {
        self.get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_boolean(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl From<&ContextSettings> for MapSettings {
    fn from(settings: &ContextSettings) -> Self {
        let map = Self::new()
            .with(keys::SUBSYSTEM, settings.subsystem.clone())
            .with(
                keys::ENFORCE_SUBSYSTEM_BOUNDARIES,
                settings.enforce_subsystem_boundaries.to_string(),
            )
            .with(
                keys::BEAN_BIND_ATTEMPT_INTERVAL,
                settings.bean_bind_attempt_interval.clone(),
            )
            .with(
                keys::SERVICE_LEASE_RENEW_INTERVAL,
                settings.service_lease_renew_interval.clone(),
            )
            .with(
                keys::BIND_WORKER_POOL_SIZE,
                settings.bind_worker_pool_size.to_string(),
            );
        for (name, uri) in &settings.services {
            map.set(&keys::service(name), uri.clone());
        }
        map
    }
}

/// Settings read straight from a `config::Config`, typically built from a
/// settings file with `config::loader::build_config`.
pub struct ConfigSettingsReader {
    config: config::Config,
}

impl ConfigSettingsReader {
    pub fn new(config: config::Config) -> Self {
        Self { config }
    }

    pub fn from_file(settings_path: &str) -> eyre::Result<Self> {
        crate::config::loader::build_config(settings_path).map(Self::new)
    }
}

impl SettingsReader for ConfigSettingsReader {
    fn get_string(&self, name: &str, default: Option<&str>) -> Option<String> {
        self.config
            .get_string(name)
            .ok()
            .or_else(|| default.map(str::to_string))
    }

    fn get_long(&self, name: &str, default: i64) -> i64 {
        self.config.get_int(name).unwrap_or(default)
    }

    fn get_boolean(&self, name: &str, default: bool) -> bool {
        self.config.get_bool(name).unwrap_or(default)
    }
}
