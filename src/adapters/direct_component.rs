use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use scc::HashMap;
use tracing::debug;

use crate::{
    core::{
        bean::{AnyInstance, BeanKey, BeanType, erase},
        service_properties::{
            API, COMPONENT, QUALIFIER, SUBSYSTEM, ServiceProperties, ServiceVersioningContext,
        },
    },
    ports::service_component::{
        BoundServiceBean, ServiceComponent, ServiceError, ServiceResult,
    },
};

/// Component name used in service properties and URIs (`direct:<id>`).
pub const DIRECT: &str = "direct";
/// Property carrying the provider id.
pub const PROVIDER_ID: &str = "providerId";

#[derive(Clone)]
struct DirectProvider {
    bean_type: BeanType,
    instance: AnyInstance,
}

/// In-process service component: providers are registered under generated
/// ids and bound by handing out the registered instance itself.
///
/// Useful for tests and for wiring services that happen to live in the
/// same process without a transport in between.
#[derive(Default)]
pub struct DirectComponent {
    next_id: AtomicU64,
    providers: HashMap<String, DirectProvider>,
    live_bindings: Arc<AtomicUsize>,
}

impl DirectComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider and return its id.
    pub fn register<T: ?Sized + Send + Sync + 'static>(&self, provider: Arc<T>) -> String {
        self.register_instance(BeanType::of::<T>(), erase(provider))
    }

    /// Register a provider and return the service properties that bind to it.
    pub fn register_service<T: ?Sized + Send + Sync + 'static>(
        &self,
        provider: Arc<T>,
    ) -> ServiceProperties {
        let bean_type = BeanType::of::<T>();
        let id = self.register_instance(bean_type, erase(provider));
        Self::properties_for(&id, bean_type)
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.providers.remove(id).is_some()
    }

    pub fn service_properties(&self, id: &str) -> ServiceResult<ServiceProperties> {
        let bean_type = self
            .providers
            .read(id, |_, provider| provider.bean_type)
            .ok_or_else(|| unknown_provider(id))?;
        Ok(Self::properties_for(id, bean_type))
    }

    /// Service URI of a registered provider.
    pub fn service_uri(id: &str) -> String {
        format!("{DIRECT}:{id}")
    }

    /// Bindings handed out and not yet released.
    pub fn live_binding_count(&self) -> usize {
        self.live_bindings.load(Ordering::SeqCst)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    fn register_instance(&self, bean_type: BeanType, instance: AnyInstance) -> String {
        let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        // Ids are never reused, so the insert cannot collide.
        let _ = self.providers.insert(
            id.clone(),
            DirectProvider {
                bean_type,
                instance,
            },
        );
        debug!("Registered direct provider {} for {}", id, bean_type);
        id
    }

    fn properties_for(id: &str, bean_type: BeanType) -> ServiceProperties {
        ServiceProperties::new()
            .with(COMPONENT, DIRECT)
            .with(PROVIDER_ID, id)
            .with(API, bean_type.name())
    }
}

fn unknown_provider(id: &str) -> ServiceError {
    ServiceError::Unavailable(format!("No direct provider registered with id={id}"))
}

struct DirectBinding {
    instance: AnyInstance,
    live_bindings: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl BoundServiceBean for DirectBinding {
    fn instance(&self) -> AnyInstance {
        self.instance.clone()
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.live_bindings.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ServiceComponent for DirectComponent {
    fn name(&self) -> &str {
        DIRECT
    }

    async fn bind(
        &self,
        _versioning: &ServiceVersioningContext,
        bean_type: BeanType,
        properties: &ServiceProperties,
    ) -> ServiceResult<Box<dyn BoundServiceBean>> {
        let id = properties.get(PROVIDER_ID).ok_or_else(|| {
            ServiceError::IllegalMetadata(format!("Missing {PROVIDER_ID} in {properties}"))
        })?;
        let provider = self
            .providers
            .read(id, |_, provider| provider.clone())
            .ok_or_else(|| unknown_provider(id))?;
        if provider.bean_type != bean_type {
            return Err(ServiceError::UnsupportedType {
                component: DIRECT.to_string(),
                bean_type,
            });
        }

        self.live_bindings.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(DirectBinding {
            instance: provider.instance,
            live_bindings: self.live_bindings.clone(),
            released: AtomicBool::new(false),
        }))
    }

    fn requires_provider_instance(&self) -> bool {
        true
    }

    fn parse_service_uri(&self, address: &str) -> ServiceResult<ServiceProperties> {
        self.service_properties(address)
    }

    fn export_service(
        &self,
        bean_key: &BeanKey,
        provider: Option<AnyInstance>,
        subsystem: &str,
    ) -> ServiceResult<ServiceProperties> {
        let instance = provider.ok_or_else(|| {
            ServiceError::IllegalMetadata(format!(
                "{DIRECT} component needs a provider instance to export {bean_key}"
            ))
        })?;
        let bean_type = bean_key.bean_type();
        if !bean_type.accepts(&instance) {
            return Err(ServiceError::UnsupportedType {
                component: DIRECT.to_string(),
                bean_type,
            });
        }

        let id = self.register_instance(bean_type, instance);
        let mut properties = Self::properties_for(&id, bean_type);
        properties.set(SUBSYSTEM, subsystem);
        if let Some(qualifier) = bean_key.qualifier() {
            properties.set(QUALIFIER, qualifier);
        }
        Ok(properties)
    }
}
