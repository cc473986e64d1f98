use std::sync::Arc;

use async_trait::async_trait;
use scc::HashMap;
use tracing::info;

use crate::{
    core::{
        bean::{BeanKey, erase},
        service_properties::ServiceProperties,
    },
    ports::{
        service_component::{ServiceComponent, ServiceResult},
        service_discovery::{ServiceDiscovery, ServiceDiscoveryFactory},
    },
};

/// Service registry held in memory: service properties per bean key.
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    entries: HashMap<BeanKey, ServiceProperties>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the properties for `key`.
    pub fn register(&self, key: BeanKey, properties: ServiceProperties) {
        info!("Registering service {} at {}", key, properties);
        self.entries
            .entry(key)
            .and_modify(|current| current.clone_from(&properties))
            .or_insert(properties);
    }

    /// Export `provider` through `component` and register the result.
    pub fn register_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
        component: &dyn ServiceComponent,
        key: BeanKey,
        provider: Arc<T>,
        subsystem: &str,
    ) -> ServiceResult<ServiceProperties> {
        let instance = component
            .requires_provider_instance()
            .then(|| erase(provider));
        let properties = component.export_service(&key, instance, subsystem)?;
        self.register(key, properties.clone());
        Ok(properties)
    }

    pub fn deregister(&self, key: &BeanKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            info!("Deregistered service {}", key);
        }
        removed
    }

    pub fn lookup(&self, key: &BeanKey) -> Option<ServiceProperties> {
        self.entries.read(key, |_, properties| properties.clone())
    }

    pub fn list_services(&self) -> Vec<(BeanKey, ServiceProperties)> {
        let mut services = Vec::with_capacity(self.entries.len());
        self.entries
            .scan(|key, properties| services.push((key.clone(), properties.clone())));
        services
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Discovery that looks one bean key up in an [`InMemoryServiceRegistry`].
pub struct RegistryServiceDiscovery {
    registry: Arc<InMemoryServiceRegistry>,
    key: BeanKey,
}

impl RegistryServiceDiscovery {
    pub fn new(registry: Arc<InMemoryServiceRegistry>, key: BeanKey) -> Self {
        Self { registry, key }
    }
}

#[async_trait]
impl ServiceDiscovery for RegistryServiceDiscovery {
    async fn run(&self) -> ServiceResult<Option<ServiceProperties>> {
        Ok(self.registry.lookup(&self.key))
    }

    fn description(&self) -> String {
        format!("InMemoryServiceRegistry lookup of {}", self.key)
    }
}

pub struct RegistryDiscoveryFactory {
    registry: Arc<InMemoryServiceRegistry>,
}

impl RegistryDiscoveryFactory {
    pub fn new(registry: Arc<InMemoryServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl ServiceDiscoveryFactory for RegistryDiscoveryFactory {
    fn create(&self, bean_key: &BeanKey) -> Arc<dyn ServiceDiscovery> {
        Arc::new(RegistryServiceDiscovery::new(
            self.registry.clone(),
            bean_key.clone(),
        ))
    }
}
