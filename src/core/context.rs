//! The bean context: registration, lookup and the background machinery that
//! keeps service beans bound.

use std::{sync::Arc, time::Duration};

use futures_util::future::try_join_all;
use scc::HashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    adapters::settings::MapSettings,
    config::{
        models::ContextSettings,
        validation::{SettingsValidator, ValidationError},
    },
    core::{
        api_provider::ApiProvider,
        bean::{Bean, BeanInstance, BeanKey},
        bean_states::{BeanStateTable, BindState},
        error::BeanError,
        event_bus::EventBus,
        lease_manager::LeaseManager,
        plugins::{Plugins, ServiceComponents},
        rebind_worker::RebindWorker,
        registry::{FactoryBean, FactoryBeanRegistry},
        resolver::resolve_transitive_dependencies,
        service_properties::ServiceVersioningContext,
        stateful::{BeanStateChanged, StatefulBeanInstance, SubsystemPolicy},
    },
    ports::{
        service_component::ServiceComponent, service_discovery::ServiceDiscovery,
        settings::SettingsReader,
    },
};

/// Entry point for consumers. Cheap to clone; every clone shares the same
/// registry, caches and background tasks.
#[derive(Clone)]
pub struct AstrixContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    settings: ContextSettings,
    reader: Arc<dyn SettingsReader>,
    policy: SubsystemPolicy,
    registry: FactoryBeanRegistry,
    plugins: Plugins,
    event_bus: EventBus,
    bean_states: Arc<BeanStateTable>,
    rebind_worker: Arc<RebindWorker>,
    lease_manager: Arc<LeaseManager>,
    instances: HashMap<BeanKey, Arc<OnceCell<BeanInstance>>>,
    shutdown: CancellationToken,
}

impl AstrixContext {
    /// Build a context from runtime settings and start its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(reader: Arc<dyn SettingsReader>) -> Result<Self, ValidationError> {
        let settings = ContextSettings::from_reader(reader.as_ref());
        SettingsValidator::validate(&settings)?;
        let bind_interval = settings.bind_attempt_interval()?;
        let lease_interval = settings.lease_renew_interval()?;

        let shutdown = CancellationToken::new();
        // Stopped last by `destroy`, after beans have published their teardown.
        let event_bus = EventBus::start(CancellationToken::new());
        let bean_states = Arc::new(BeanStateTable::new());
        event_bus.subscribe::<BeanStateChanged, _>(bean_states.clone());

        let rebind_worker = Arc::new(RebindWorker::new(
            bind_interval,
            settings.bind_worker_pool_size,
            shutdown.child_token(),
        ));
        rebind_worker.spawn();
        let lease_manager = Arc::new(LeaseManager::new(lease_interval, shutdown.child_token()));

        let policy = SubsystemPolicy::new(
            settings.subsystem.clone(),
            settings.enforce_subsystem_boundaries,
        );
        info!(
            "Astrix context started. subsystem={} enforce_subsystem_boundaries={} bind_interval={:?} lease_interval={:?}",
            policy.consumer(),
            policy.is_enforced(),
            bind_interval,
            lease_interval
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                settings,
                reader,
                policy,
                registry: FactoryBeanRegistry::new(),
                plugins: Plugins::new(),
                event_bus,
                bean_states,
                rebind_worker,
                lease_manager,
                instances: HashMap::new(),
                shutdown,
            }),
        })
    }

    /// Build a context from a typed settings snapshot.
    pub fn from_settings(settings: &ContextSettings) -> Result<Self, ValidationError> {
        Self::new(Arc::new(MapSettings::from(settings)))
    }

    pub fn subsystem(&self) -> &str {
        self.inner.policy.consumer()
    }

    pub fn context_settings(&self) -> &ContextSettings {
        &self.inner.settings
    }

    /// The dynamic settings this context reads from.
    pub fn settings(&self) -> &Arc<dyn SettingsReader> {
        &self.inner.reader
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn bean_states(&self) -> &BeanStateTable {
        &self.inner.bean_states
    }

    pub fn rebind_worker(&self) -> &RebindWorker {
        &self.inner.rebind_worker
    }

    pub fn lease_manager(&self) -> &LeaseManager {
        &self.inner.lease_manager
    }

    pub fn register_plugin<T: ?Sized + Send + Sync + 'static>(&self, plugin: Arc<T>) {
        self.inner.plugins.register_plugin(plugin);
    }

    pub fn register_default_plugin<T: ?Sized + Send + Sync + 'static>(&self, plugin: Arc<T>) {
        self.inner.plugins.register_default_plugin(plugin);
    }

    pub fn get_plugins<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.inner.plugins.get_plugins::<T>()
    }

    pub fn get_plugin<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BeanError> {
        Ok(self.inner.plugins.get_plugin::<T>()?)
    }

    pub fn register_service_component(&self, component: Arc<dyn ServiceComponent>) {
        info!("Registering service component '{}'", component.name());
        self.inner.plugins.register_plugin(component);
    }

    pub fn service_components(&self) -> ServiceComponents {
        ServiceComponents::new(self.inner.plugins.clone())
    }

    pub fn register_bean_factory(&self, factory: FactoryBean) -> Result<(), BeanError> {
        self.inner.registry.register(factory)
    }

    /// Register every bean an API provider exports. Stops at the first
    /// duplicate; beans registered before it stay registered.
    pub fn register_api_provider(&self, provider: ApiProvider) -> Result<(), BeanError> {
        let factories = provider.factory_beans(self);
        info!(
            "Registering api provider '{}' exporting {} beans",
            provider.descriptor().name(),
            factories.len()
        );
        for factory in factories {
            self.register_bean_factory(factory)?;
        }
        Ok(())
    }

    pub fn has_provider(&self, key: &BeanKey) -> bool {
        self.inner.registry.lookup(key).is_ok()
    }

    pub async fn get_bean<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Bean<T>, BeanError> {
        self.get_bean_by_key(BeanKey::of::<T>()).await
    }

    pub async fn get_qualified_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Bean<T>, BeanError> {
        self.get_bean_by_key(BeanKey::qualified::<T>(qualifier)).await
    }

    /// Get the bean for `key`, creating it on first use.
    ///
    /// Never waits for a service to become available: a stateful bean is
    /// returned after one bind attempt, bound or not.
    pub async fn get_bean_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: BeanKey,
    ) -> Result<Bean<T>, BeanError> {
        let instance = self.get_bean_instance(&key).await?;
        Bean::new(key, instance)
    }

    /// Untyped lookup used by factories resolving their dependencies.
    pub async fn get_bean_instance(&self, key: &BeanKey) -> Result<BeanInstance, BeanError> {
        if self.is_destroyed() {
            return Err(BeanError::ContextDestroyed { bean: key.clone() });
        }
        let factory = self.inner.registry.lookup(key)?;
        resolve_transitive_dependencies(&self.inner.registry, &factory)?;
        self.check_subsystem(&factory)?;

        let cell = self.instance_cell(key);
        let instance = cell
            .get_or_try_init(|| factory.plugin().create(key, self))
            .await?;
        Ok(instance.clone())
    }

    /// Every bean `key` depends on, directly or transitively.
    pub fn transitive_dependencies(&self, key: &BeanKey) -> Result<Vec<BeanKey>, BeanError> {
        let factory = self.inner.registry.lookup(key)?;
        resolve_transitive_dependencies(&self.inner.registry, &factory)
    }

    pub async fn wait_for_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        timeout: Duration,
    ) -> Result<Bean<T>, BeanError> {
        self.wait_for_bean_by_key(BeanKey::of::<T>(), timeout).await
    }

    pub async fn wait_for_qualified_bean<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
        timeout: Duration,
    ) -> Result<Bean<T>, BeanError> {
        self.wait_for_bean_by_key(BeanKey::qualified::<T>(qualifier), timeout)
            .await
    }

    /// Get the bean for `key` and wait until it and every stateful bean it
    /// depends on have left `Unbound`.
    ///
    /// The waits run concurrently, so `timeout` bounds the whole call rather
    /// than each dependency.
    pub async fn wait_for_bean_by_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: BeanKey,
        timeout: Duration,
    ) -> Result<Bean<T>, BeanError> {
        let bean = self.get_bean_by_key::<T>(key.clone()).await?;
        let mut keys = self.transitive_dependencies(&key)?;
        keys.push(key);
        try_join_all(keys.into_iter().map(|key| self.wait_until_bound(key, timeout))).await?;
        Ok(bean)
    }

    async fn wait_until_bound(&self, key: BeanKey, timeout: Duration) -> Result<(), BeanError> {
        let factory = self.inner.registry.lookup(&key)?;
        if !factory.is_stateful() {
            return Ok(());
        }
        // Make sure the bean exists so something is trying to bind it.
        self.get_bean_instance(&key).await?;
        if self
            .inner
            .bean_states
            .wait_for_value(&key, BindState::Bound, timeout)
            .await
        {
            Ok(())
        } else {
            Err(BeanError::BindTimeout { bean: key, timeout })
        }
    }

    /// Create a stateful bean, make one bind attempt and hand it to the
    /// rebind worker and lease manager.
    pub async fn create_stateful_bean(
        &self,
        key: BeanKey,
        versioning: ServiceVersioningContext,
        discovery: Arc<dyn ServiceDiscovery>,
    ) -> Arc<StatefulBeanInstance> {
        let bean = StatefulBeanInstance::new(
            key,
            versioning,
            discovery,
            self.service_components(),
            self.inner.policy.clone(),
            self.inner.event_bus.clone(),
        )
        .with_settings(self.inner.reader.clone());
        let bean = Arc::new(bean);
        debug!(
            "Created stateful bean. bean={} bean_id={}",
            bean.bean_key(),
            bean.id()
        );
        bean.bind().await;
        self.inner.rebind_worker.add(bean.clone());
        self.inner.lease_manager.start_manage_lease(bean.clone());
        // `destroy` may have emptied the lease list while we were binding.
        if self.is_destroyed() {
            bean.destroy().await;
        }
        bean
    }

    /// Stop background work and release every bound service bean.
    pub async fn destroy(&self) {
        info!("Destroying astrix context. subsystem={}", self.subsystem());
        self.inner.shutdown.cancel();
        self.inner.lease_manager.destroy().await;
        self.inner.event_bus.shutdown();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn instance_cell(&self, key: &BeanKey) -> Arc<OnceCell<BeanInstance>> {
        if let Some(cell) = self.inner.instances.read(key, |_, cell| cell.clone()) {
            return cell;
        }
        self.inner
            .instances
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .get()
            .clone()
    }

    /// Reject non-versioned service beans whose provider declared a foreign
    /// subsystem before anything is created.
    fn check_subsystem(&self, factory: &FactoryBean) -> Result<(), BeanError> {
        let policy = &self.inner.policy;
        if !factory.is_stateful() || factory.is_versioned() || !policy.is_enforced() {
            return Ok(());
        }
        match factory.subsystem() {
            Some(provider) if provider != policy.consumer() => Err(BeanError::IllegalSubsystem {
                consumer: policy.consumer().to_string(),
                provider: provider.to_string(),
                bean_type: factory.bean_type(),
            }),
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let settings = ContextSettings {
            bean_bind_attempt_interval: "20ms".to_string(),
            service_lease_renew_interval: "20ms".to_string(),
            ..ContextSettings::default()
        };
        match Self::from_settings(&settings) {
            Ok(context) => context,
            Err(e) => panic!("test settings rejected: {e}"),
        }
    }
}

impl std::fmt::Debug for AstrixContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstrixContext")
            .field("subsystem", &self.subsystem())
            .field("registered_beans", &self.inner.registry.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::factories::LibraryFactory;

    trait Greeter: Send + Sync {
        fn greet(&self, name: &str) -> String;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self, name: &str) -> String {
            format!("hello {name}")
        }
    }

    #[tokio::test]
    async fn test_library_bean_has_no_background_work() {
        let context = AstrixContext::for_tests();
        context
            .register_bean_factory(FactoryBean::new(Arc::new(LibraryFactory::<dyn Greeter>::new(
                |_| {
                    let greeter: Arc<dyn Greeter> = Arc::new(Hello);
                    Ok(greeter)
                },
            ))))
            .unwrap();

        let greeter = context.get_bean::<dyn Greeter>().await.unwrap();
        assert_eq!(greeter.invoke(|g| g.greet("kim")).unwrap(), "hello kim");
        assert_eq!(context.rebind_worker().managed_bean_count(), 0);
        assert!(!context.lease_manager().is_started());
        context.destroy().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_instance_created_once_under_concurrency() {
        let context = AstrixContext::for_tests();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        context
            .register_bean_factory(FactoryBean::new(Arc::new(LibraryFactory::<String>::new(
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("shared".to_string()))
                },
            ))))
            .unwrap();

        let lookups = (0..8).map(|_| {
            let context = context.clone();
            tokio::spawn(async move { context.get_bean::<String>().await.map(|b| b.key().clone()) })
        });
        for lookup in lookups {
            lookup.await.unwrap().unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        context.destroy().await;
    }

    #[tokio::test]
    async fn test_missing_plugin_reported_as_bean_error() {
        let context = AstrixContext::for_tests();
        assert!(matches!(
            context.get_plugin::<dyn Greeter>(),
            Err(BeanError::Plugin(_))
        ));
        context.destroy().await;
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let settings = ContextSettings {
            bind_worker_pool_size: 0,
            ..ContextSettings::default()
        };
        assert!(AstrixContext::from_settings(&settings).is_err());
    }
}
