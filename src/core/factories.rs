//! Factory bean plugins shipped with the runtime.

use std::{collections::HashMap, fmt, sync::Arc, time::Instant};

use async_trait::async_trait;
use tracing::Instrument;

use crate::{
    core::{
        bean::{Bean, BeanInstance, BeanKey, BeanType, erase},
        context::AstrixContext,
        error::BeanError,
        service_properties::ServiceVersioningContext,
    },
    ports::{factory_bean::FactoryBeanPlugin, service_discovery::ServiceDiscoveryFactory},
    tracing_setup::create_bean_span,
};

/// The beans a library factory declared, already created and ready to use.
///
/// Asking for anything that was not declared is an error, which keeps the
/// declared dependency graph honest for cycle detection.
pub struct BeanDependencies {
    dependent: BeanKey,
    beans: HashMap<BeanKey, BeanInstance>,
}

impl BeanDependencies {
    pub(crate) async fn fetch(
        dependent: &BeanKey,
        declared: &[BeanKey],
        context: &AstrixContext,
    ) -> Result<Self, BeanError> {
        let mut beans = HashMap::with_capacity(declared.len());
        for key in declared {
            let instance = context
                .get_bean_instance(key)
                .await
                .map_err(|e| e.as_missing_dependency(dependent, key))?;
            beans.insert(key.clone(), instance);
        }
        Ok(Self {
            dependent: dependent.clone(),
            beans,
        })
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Bean<T>, BeanError> {
        self.get_by_key(BeanKey::of::<T>())
    }

    pub fn get_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Bean<T>, BeanError> {
        self.get_by_key(BeanKey::qualified::<T>(qualifier))
    }

    pub fn get_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: BeanKey,
    ) -> Result<Bean<T>, BeanError> {
        let Some(instance) = self.beans.get(&key) else {
            return Err(BeanError::UndeclaredDependency {
                dependent: self.dependent.clone(),
                dependency: key,
            });
        };
        let instance = instance.clone();
        Bean::new(key, instance)
    }
}

type Constructor<T> = dyn Fn(&BeanDependencies) -> eyre::Result<Arc<T>> + Send + Sync;

/// Factory for plain in-process library beans.
pub struct LibraryFactory<T: ?Sized> {
    constructor: Arc<Constructor<T>>,
    dependencies: Vec<BeanKey>,
}

impl<T: ?Sized + Send + Sync + 'static> LibraryFactory<T> {
    pub fn new(
        constructor: impl Fn(&BeanDependencies) -> eyre::Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            constructor: Arc::new(constructor),
            dependencies: Vec::new(),
        }
    }

    /// Factory that always hands out the same instance.
    pub fn of_instance(instance: Arc<T>) -> Self {
        Self::new(move |_| Ok(instance.clone()))
    }

    pub fn depends_on(mut self, key: BeanKey) -> Self {
        self.dependencies.push(key);
        self
    }
}

impl<T: ?Sized> fmt::Debug for LibraryFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryFactory")
            .field("bean_type", &std::any::type_name::<T>())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[async_trait]
impl<T: ?Sized + Send + Sync + 'static> FactoryBeanPlugin for LibraryFactory<T> {
    fn bean_type(&self) -> BeanType {
        BeanType::of::<T>()
    }

    async fn create(&self, key: &BeanKey, context: &AstrixContext) -> Result<BeanInstance, BeanError> {
        let dependencies = BeanDependencies::fetch(key, &self.dependencies, context).await?;
        let instance = (self.constructor)(&dependencies).map_err(|e| BeanError::CreationFailed {
            bean: key.clone(),
            source: e.into(),
        })?;
        Ok(BeanInstance::Library(erase(instance)))
    }

    fn bean_dependencies(&self) -> Vec<BeanKey> {
        self.dependencies.clone()
    }
}

/// Factory for service beans: every key gets its own stateful instance fed
/// by a discovery created for that key.
pub struct ServiceFactory {
    bean_type: BeanType,
    versioning: ServiceVersioningContext,
    discovery: Arc<dyn ServiceDiscoveryFactory>,
}

impl ServiceFactory {
    pub fn new<T: ?Sized + Send + Sync + 'static>(discovery: Arc<dyn ServiceDiscoveryFactory>) -> Self {
        Self::for_type(BeanType::of::<T>(), discovery)
    }

    pub fn for_type(bean_type: BeanType, discovery: Arc<dyn ServiceDiscoveryFactory>) -> Self {
        Self {
            bean_type,
            versioning: ServiceVersioningContext::non_versioned(),
            discovery,
        }
    }

    pub fn with_versioning(mut self, versioning: ServiceVersioningContext) -> Self {
        self.versioning = versioning;
        self
    }
}

#[async_trait]
impl FactoryBeanPlugin for ServiceFactory {
    fn bean_type(&self) -> BeanType {
        self.bean_type
    }

    async fn create(&self, key: &BeanKey, context: &AstrixContext) -> Result<BeanInstance, BeanError> {
        let discovery = self.discovery.create(key);
        let bean = context
            .create_stateful_bean(key.clone(), self.versioning, discovery)
            .await;
        Ok(BeanInstance::Stateful(bean))
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

/// Decorator that records how long the wrapped factory took to create a bean.
pub struct TimedFactory {
    target: Arc<dyn FactoryBeanPlugin>,
}

impl TimedFactory {
    pub fn new(target: Arc<dyn FactoryBeanPlugin>) -> Self {
        Self { target }
    }
}

#[async_trait]
impl FactoryBeanPlugin for TimedFactory {
    fn bean_type(&self) -> BeanType {
        self.target.bean_type()
    }

    async fn create(&self, key: &BeanKey, context: &AstrixContext) -> Result<BeanInstance, BeanError> {
        let span = create_bean_span(key);
        let started = Instant::now();
        let created = self
            .target
            .create(key, context)
            .instrument(span.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        span.record("duration_ms", elapsed_ms);
        match &created {
            Ok(_) => tracing::debug!("Created bean {} in {}ms", key, elapsed_ms),
            Err(e) => tracing::warn!("Failed to create bean {} after {}ms: {}", key, elapsed_ms, e),
        }
        created
    }

    fn is_stateful(&self) -> bool {
        self.target.is_stateful()
    }

    fn decorated(&self) -> Option<&dyn FactoryBeanPlugin> {
        Some(self.target.as_ref())
    }
}
