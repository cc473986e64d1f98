use std::{
    any::{TypeId, type_name},
    fmt,
    sync::Arc,
};

use scc::HashMap;
use tracing::debug;

use crate::{
    core::{
        bean::{AnyInstance, downcast, erase},
        error::PluginError,
    },
    ports::service_component::{ServiceComponent, ServiceError, ServiceResult},
};

/// Registry of extension points, keyed by the plugin's type.
///
/// Plugin types are usually trait objects, e.g. `dyn ServiceComponent`.
/// Explicit registrations win over the default for the same type.
#[derive(Clone, Default)]
pub struct Plugins {
    inner: Arc<PluginsInner>,
}

#[derive(Default)]
struct PluginsInner {
    registered: HashMap<TypeId, Vec<AnyInstance>>,
    defaults: HashMap<TypeId, AnyInstance>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_plugin<T: ?Sized + Send + Sync + 'static>(&self, plugin: Arc<T>) {
        let instance = erase(plugin);
        self.inner
            .registered
            .entry(TypeId::of::<T>())
            .or_insert_with(Vec::new)
            .get_mut()
            .push(instance);
        debug!("Registered plugin for {}", type_name::<T>());
    }

    /// Fallback used only while no plugin of the type is registered.
    pub fn register_default_plugin<T: ?Sized + Send + Sync + 'static>(&self, plugin: Arc<T>) {
        let instance = erase(plugin);
        self.inner
            .defaults
            .entry(TypeId::of::<T>())
            .and_modify(|current| *current = instance.clone())
            .or_insert(instance);
    }

    /// All registered plugins of `T`, or the default one if none are.
    pub fn get_plugins<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let id = TypeId::of::<T>();
        let registered = self
            .inner
            .registered
            .read(&id, |_, plugins| {
                plugins.iter().filter_map(downcast::<T>).collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if !registered.is_empty() {
            return registered;
        }
        self.inner
            .defaults
            .read(&id, |_, plugin| downcast::<T>(plugin))
            .flatten()
            .into_iter()
            .collect()
    }

    /// The single plugin of `T`.
    pub fn get_plugin<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, PluginError> {
        let mut plugins = self.get_plugins::<T>();
        match plugins.len() {
            0 => Err(PluginError::MissingPlugin {
                plugin_type: type_name::<T>(),
            }),
            1 => Ok(plugins.remove(0)),
            count => Err(PluginError::MultiplePlugins {
                plugin_type: type_name::<T>(),
                count,
            }),
        }
    }
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugins")
            .field("registered_types", &self.inner.registered.len())
            .field("default_types", &self.inner.defaults.len())
            .finish()
    }
}

/// Service components looked up by name among the registered plugins.
#[derive(Clone, Debug)]
pub struct ServiceComponents {
    plugins: Plugins,
}

impl ServiceComponents {
    pub fn new(plugins: Plugins) -> Self {
        Self { plugins }
    }

    pub fn get(&self, name: &str) -> ServiceResult<Arc<dyn ServiceComponent>> {
        self.plugins
            .get_plugins::<dyn ServiceComponent>()
            .into_iter()
            .find(|component| component.name() == name)
            .ok_or_else(|| ServiceError::UnknownComponent(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins
            .get_plugins::<dyn ServiceComponent>()
            .iter()
            .map(|component| component.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct Fixed(u64);

    impl Clock for Fixed {
        fn now(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_missing_plugin() {
        let plugins = Plugins::new();
        assert!(plugins.get_plugins::<dyn Clock>().is_empty());
        assert!(matches!(
            plugins.get_plugin::<dyn Clock>(),
            Err(PluginError::MissingPlugin { .. })
        ));
    }

    #[test]
    fn test_default_used_only_without_registrations() {
        let plugins = Plugins::new();
        plugins.register_default_plugin::<dyn Clock>(Arc::new(Fixed(0)));
        assert_eq!(plugins.get_plugin::<dyn Clock>().unwrap().now(), 0);

        plugins.register_plugin::<dyn Clock>(Arc::new(Fixed(42)));
        assert_eq!(plugins.get_plugin::<dyn Clock>().unwrap().now(), 42);
    }

    #[test]
    fn test_multiple_plugins() {
        let plugins = Plugins::new();
        plugins.register_plugin::<dyn Clock>(Arc::new(Fixed(1)));
        plugins.register_plugin::<dyn Clock>(Arc::new(Fixed(2)));

        assert_eq!(plugins.get_plugins::<dyn Clock>().len(), 2);
        assert!(matches!(
            plugins.get_plugin::<dyn Clock>(),
            Err(PluginError::MultiplePlugins { count: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_component() {
        let components = ServiceComponents::new(Plugins::new());
        assert!(matches!(
            components.get("direct"),
            Err(ServiceError::UnknownComponent(name)) if name == "direct"
        ));
    }
}
