use std::{fmt, sync::Arc};

use scc::HashMap;
use tracing::debug;

use crate::{
    core::{
        bean::{BeanKey, BeanType},
        error::BeanError,
    },
    ports::factory_bean::FactoryBeanPlugin,
};

/// A registered factory together with the metadata of the API that exports it.
#[derive(Clone)]
pub struct FactoryBean {
    key: BeanKey,
    plugin: Arc<dyn FactoryBeanPlugin>,
    versioned: bool,
    subsystem: Option<String>,
}

impl FactoryBean {
    /// Factory that serves every qualifier of the plugin's bean type
    /// unless a qualifier-specific factory exists.
    pub fn new(plugin: Arc<dyn FactoryBeanPlugin>) -> Self {
        let key = BeanKey::new(plugin.bean_type(), None);
        Self {
            key,
            plugin,
            versioned: false,
            subsystem: None,
        }
    }

    pub fn qualified(plugin: Arc<dyn FactoryBeanPlugin>, qualifier: &str) -> Self {
        let key = BeanKey::new(plugin.bean_type(), Some(qualifier));
        Self {
            key,
            plugin,
            versioned: false,
            subsystem: None,
        }
    }

    pub fn with_versioning(mut self, versioned: bool) -> Self {
        self.versioned = versioned;
        self
    }

    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    pub fn key(&self) -> &BeanKey {
        &self.key
    }

    pub fn bean_type(&self) -> BeanType {
        self.key.bean_type()
    }

    pub fn plugin(&self) -> &Arc<dyn FactoryBeanPlugin> {
        &self.plugin
    }

    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Subsystem of the providing API, when it declared one.
    pub fn subsystem(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    pub fn is_stateful(&self) -> bool {
        self.plugin.is_stateful()
    }
}

impl fmt::Debug for FactoryBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryBean")
            .field("key", &self.key)
            .field("stateful", &self.is_stateful())
            .field("versioned", &self.versioned)
            .field("subsystem", &self.subsystem)
            .finish()
    }
}

/// Concurrent map from bean key to the factory that produces it.
#[derive(Default)]
pub struct FactoryBeanRegistry {
    factories: HashMap<BeanKey, FactoryBean>,
}

impl FactoryBeanRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory. A second registration for the same key is rejected.
    pub fn register(&self, factory: FactoryBean) -> Result<(), BeanError> {
        let key = factory.key().clone();
        self.factories
            .insert(key.clone(), factory)
            .map_err(|_| BeanError::DuplicateProvider { bean: key.clone() })?;
        debug!("Registered factory for bean {}", key);
        Ok(())
    }

    /// Find the factory for `key`.
    ///
    /// A qualified key falls back to the unqualified factory of the same type.
    pub fn lookup(&self, key: &BeanKey) -> Result<FactoryBean, BeanError> {
        if let Some(factory) = self.factories.read(key, |_, factory| factory.clone()) {
            return Ok(factory);
        }
        if key.qualifier().is_some() {
            let fallback = key.unqualified();
            if let Some(factory) = self.factories.read(&fallback, |_, factory| factory.clone()) {
                return Ok(factory);
            }
        }
        Err(BeanError::MissingProvider { bean: key.clone() })
    }

    /// Whether any factory, qualified or not, produces `bean_type`.
    pub fn contains(&self, bean_type: BeanType) -> bool {
        let mut found = false;
        self.factories.scan(|key, _| {
            if key.bean_type() == bean_type {
                found = true;
            }
        });
        found
    }

    pub fn bean_keys(&self) -> Vec<BeanKey> {
        let mut keys = Vec::with_capacity(self.factories.len());
        self.factories.scan(|key, _| keys.push(key.clone()));
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::core::{bean::BeanInstance, context::AstrixContext};

    struct NamedFactory;

    #[async_trait]
    impl FactoryBeanPlugin for NamedFactory {
        fn bean_type(&self) -> BeanType {
            BeanType::of::<String>()
        }

        async fn create(
            &self,
            key: &BeanKey,
            _context: &AstrixContext,
        ) -> Result<BeanInstance, BeanError> {
            Err(BeanError::MissingProvider { bean: key.clone() })
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = FactoryBeanRegistry::new();
        registry
            .register(FactoryBean::new(Arc::new(NamedFactory)))
            .unwrap();

        let err = registry
            .register(FactoryBean::new(Arc::new(NamedFactory)))
            .unwrap_err();
        assert!(matches!(err, BeanError::DuplicateProvider { bean } if bean == BeanKey::of::<String>()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_qualified_lookup_falls_back_to_unqualified() {
        let registry = FactoryBeanRegistry::new();
        registry
            .register(FactoryBean::new(Arc::new(NamedFactory)))
            .unwrap();

        let factory = registry.lookup(&BeanKey::qualified::<String>("east")).unwrap();
        assert_eq!(factory.key(), &BeanKey::of::<String>());
    }

    #[test]
    fn test_qualified_factory_preferred() {
        let registry = FactoryBeanRegistry::new();
        registry
            .register(FactoryBean::new(Arc::new(NamedFactory)))
            .unwrap();
        registry
            .register(FactoryBean::qualified(Arc::new(NamedFactory), "east"))
            .unwrap();

        let factory = registry.lookup(&BeanKey::qualified::<String>("east")).unwrap();
        assert_eq!(factory.key(), &BeanKey::qualified::<String>("east"));
        assert_eq!(registry.bean_keys().len(), 2);
    }

    #[test]
    fn test_missing_provider() {
        let registry = FactoryBeanRegistry::new();
        assert!(!registry.contains(BeanType::of::<String>()));
        assert!(matches!(
            registry.lookup(&BeanKey::of::<u64>()),
            Err(BeanError::MissingProvider { .. })
        ));
    }

    #[test]
    fn test_contains_sees_qualified_only_factories() {
        let registry = FactoryBeanRegistry::new();
        registry
            .register(FactoryBean::qualified(Arc::new(NamedFactory), "west"))
            .unwrap();
        assert!(registry.contains(BeanType::of::<String>()));
        assert!(registry.lookup(&BeanKey::of::<String>()).is_err());
    }
}
