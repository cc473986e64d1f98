//! API providers group the beans an API exports and describe how they are
//! produced: as in-process library beans, as service beans found through a
//! discovery mechanism, or as service beans configured through settings.

use std::sync::Arc;

use crate::{
    adapters::config_discovery::ConfigDiscoveryFactory,
    config::models::keys,
    core::{
        bean::{BeanKey, BeanType},
        context::AstrixContext,
        factories::ServiceFactory,
        registry::FactoryBean,
        service_properties::ServiceVersioningContext,
    },
    ports::{factory_bean::FactoryBeanPlugin, service_discovery::ServiceDiscoveryFactory},
};

/// Metadata shared by every bean an API exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescriptor {
    name: String,
    version: Option<u32>,
    subsystem: Option<String>,
}

impl ApiDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            subsystem: None,
        }
    }

    /// Mark the API as versioned, allowing it to cross subsystem boundaries.
    pub fn versioned(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn in_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    pub fn subsystem(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    pub fn versioning(&self) -> ServiceVersioningContext {
        match self.version {
            Some(version) => ServiceVersioningContext::versioned(version),
            None => ServiceVersioningContext::non_versioned(),
        }
    }

    fn describe(&self, factory: FactoryBean) -> FactoryBean {
        let factory = factory.with_versioning(self.is_versioned());
        match &self.subsystem {
            Some(subsystem) => factory.with_subsystem(subsystem.clone()),
            None => factory,
        }
    }
}

pub struct LibraryProvider {
    descriptor: ApiDescriptor,
    exports: Vec<(Option<String>, Arc<dyn FactoryBeanPlugin>)>,
}

impl LibraryProvider {
    pub fn new(descriptor: ApiDescriptor) -> Self {
        Self {
            descriptor,
            exports: Vec::new(),
        }
    }

    pub fn export(mut self, factory: Arc<dyn FactoryBeanPlugin>) -> Self {
        self.exports.push((None, factory));
        self
    }

    pub fn export_qualified(mut self, qualifier: &str, factory: Arc<dyn FactoryBeanPlugin>) -> Self {
        self.exports.push((Some(qualifier.to_string()), factory));
        self
    }
}

pub struct ServiceProvider {
    descriptor: ApiDescriptor,
    discovery: Arc<dyn ServiceDiscoveryFactory>,
    services: Vec<BeanKey>,
}

impl ServiceProvider {
    pub fn new(descriptor: ApiDescriptor, discovery: Arc<dyn ServiceDiscoveryFactory>) -> Self {
        Self {
            descriptor,
            discovery,
            services: Vec::new(),
        }
    }

    pub fn service<T: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        self.services.push(BeanKey::of::<T>());
        self
    }

    pub fn qualified_service<T: ?Sized + Send + Sync + 'static>(mut self, qualifier: &str) -> Self {
        self.services.push(BeanKey::qualified::<T>(qualifier));
        self
    }
}

/// Service beans whose location is a service URI stored in settings under
/// `astrix.services.<entry>`.
pub struct ConfigProvider {
    descriptor: ApiDescriptor,
    services: Vec<(BeanKey, String)>,
}

impl ConfigProvider {
    pub fn new(descriptor: ApiDescriptor) -> Self {
        Self {
            descriptor,
            services: Vec::new(),
        }
    }

    pub fn service<T: ?Sized + Send + Sync + 'static>(mut self, entry: &str) -> Self {
        self.services.push((BeanKey::of::<T>(), entry.to_string()));
        self
    }

    pub fn qualified_service<T: ?Sized + Send + Sync + 'static>(
        mut self,
        qualifier: &str,
        entry: &str,
    ) -> Self {
        self.services
            .push((BeanKey::qualified::<T>(qualifier), entry.to_string()));
        self
    }
}

pub enum ApiProvider {
    Library(LibraryProvider),
    Service(ServiceProvider),
    Config(ConfigProvider),
}

impl ApiProvider {
    pub fn descriptor(&self) -> &ApiDescriptor {
        match self {
            Self::Library(provider) => &provider.descriptor,
            Self::Service(provider) => &provider.descriptor,
            Self::Config(provider) => &provider.descriptor,
        }
    }

    /// The factories this provider contributes to `context`.
    pub fn factory_beans(&self, context: &AstrixContext) -> Vec<FactoryBean> {
        match self {
            Self::Library(provider) => provider
                .exports
                .iter()
                .map(|(qualifier, factory)| {
                    let bean = match qualifier {
                        Some(qualifier) => FactoryBean::qualified(factory.clone(), qualifier),
                        None => FactoryBean::new(factory.clone()),
                    };
                    provider.descriptor.describe(bean)
                })
                .collect(),
            Self::Service(provider) => provider
                .services
                .iter()
                .map(|key| {
                    let factory =
                        ServiceFactory::for_type(key.bean_type(), provider.discovery.clone())
                            .with_versioning(provider.descriptor.versioning());
                    provider
                        .descriptor
                        .describe(keyed(key, Arc::new(factory)))
                })
                .collect(),
            Self::Config(provider) => provider
                .services
                .iter()
                .map(|(key, entry)| {
                    let discovery = ConfigDiscoveryFactory::new(
                        context.settings().clone(),
                        keys::service(entry),
                        context.service_components(),
                    );
                    let factory = ServiceFactory::for_type(key.bean_type(), Arc::new(discovery))
                        .with_versioning(provider.descriptor.versioning());
                    provider
                        .descriptor
                        .describe(keyed(key, Arc::new(factory)))
                })
                .collect(),
        }
    }

    pub fn bean_types(&self) -> Vec<BeanType> {
        match self {
            Self::Library(provider) => provider
                .exports
                .iter()
                .map(|(_, factory)| factory.bean_type())
                .collect(),
            Self::Service(provider) => provider.services.iter().map(BeanKey::bean_type).collect(),
            Self::Config(provider) => provider
                .services
                .iter()
                .map(|(key, _)| key.bean_type())
                .collect(),
        }
    }
}

fn keyed(key: &BeanKey, factory: Arc<dyn FactoryBeanPlugin>) -> FactoryBean {
    match key.qualifier() {
        Some(qualifier) => FactoryBean::qualified(factory, qualifier),
        None => FactoryBean::new(factory),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::in_memory_registry::{InMemoryServiceRegistry, RegistryDiscoveryFactory},
        core::factories::LibraryFactory,
    };

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = ApiDescriptor::new("pricing");
        assert_eq!(descriptor.name(), "pricing");
        assert!(!descriptor.is_versioned());
        assert_eq!(descriptor.subsystem(), None);
        assert_eq!(
            descriptor.versioning(),
            ServiceVersioningContext::non_versioned()
        );
    }

    #[tokio::test]
    async fn test_service_provider_produces_stateful_factories() {
        let context = AstrixContext::for_tests();
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let provider = ApiProvider::Service(
            ServiceProvider::new(
                ApiDescriptor::new("accounts").in_subsystem("accounts"),
                Arc::new(RegistryDiscoveryFactory::new(registry)),
            )
            .service::<String>()
            .qualified_service::<u64>("balance"),
        );

        let beans = provider.factory_beans(&context);
        assert_eq!(beans.len(), 2);
        assert!(beans.iter().all(FactoryBean::is_stateful));
        assert!(beans.iter().all(|b| b.subsystem() == Some("accounts")));
        assert_eq!(beans[1].key(), &BeanKey::qualified::<u64>("balance"));
        context.destroy().await;
    }

    #[tokio::test]
    async fn test_library_provider_keeps_qualifiers() {
        let context = AstrixContext::for_tests();
        let provider = ApiProvider::Library(
            LibraryProvider::new(ApiDescriptor::new("names").versioned(2))
                .export(Arc::new(LibraryFactory::of_instance(Arc::new("x".to_string()))))
                .export_qualified(
                    "short",
                    Arc::new(LibraryFactory::of_instance(Arc::new("y".to_string()))),
                ),
        );

        let beans = provider.factory_beans(&context);
        assert_eq!(beans[0].key(), &BeanKey::of::<String>());
        assert_eq!(beans[1].key(), &BeanKey::qualified::<String>("short"));
        assert!(beans.iter().all(FactoryBean::is_versioned));
        assert!(!beans.iter().any(FactoryBean::is_stateful));
        assert_eq!(provider.bean_types().len(), 2);
        context.destroy().await;
    }
}
