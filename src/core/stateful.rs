//! Stateful service beans.
//!
//! A [`StatefulBeanInstance`] is the long-lived object handed to consumers of
//! a service API. It is always in exactly one of four states:
//!
//! - `Unbound`: no usable service; calls fail with `ServiceUnavailable`.
//! - `Bound`: calls dispatch to the instance produced by a service component.
//! - `IllegalSubsystem`: the provider lives in another subsystem and the API
//!   is not versioned; calls fail with `IllegalSubsystem`.
//! - `IllegalServiceMetadata`: discovery returned properties that cannot be
//!   used; calls fail with `IllegalServiceMetadata`.
//!
//! Transitions happen under a per-instance async lock, so bind and lease
//! renewal never interleave for the same bean. Readers never take that lock:
//! the current state lives in an [`ArcSwap`] and is swapped in one step.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, debug, error, info, warn};

use crate::{
    config::models::{DEFAULT_SUBSYSTEM, keys},
    core::{
        bean::{AnyInstance, BeanKey},
        error::BeanError,
        event_bus::EventBus,
        plugins::ServiceComponents,
        service_properties::{ServiceProperties, ServiceVersioningContext},
    },
    ports::{
        service_component::{BoundServiceBean, ServiceError, ServiceResult},
        service_discovery::ServiceDiscovery,
        settings::SettingsReader,
    },
    tracing_setup::create_bind_span,
};

static NEXT_BEAN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeanStateKind {
    Unbound,
    Bound,
    IllegalSubsystem,
    IllegalServiceMetadata,
}

impl BeanStateKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unbound => "Unbound",
            Self::Bound => "Bound",
            Self::IllegalSubsystem => "IllegalSubsystem",
            Self::IllegalServiceMetadata => "IllegalServiceMetadata",
        }
    }

    /// Every state except `Unbound` is a definite outcome of binding.
    pub fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound)
    }
}

impl fmt::Display for BeanStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Published on the event bus after every state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanStateChanged {
    pub bean_key: BeanKey,
    pub bean_id: u64,
    pub previous: BeanStateKind,
    pub current: BeanStateKind,
}

pub struct BoundTarget {
    binding: Box<dyn BoundServiceBean>,
    instance: AnyInstance,
}

pub enum BeanState {
    Unbound,
    Bound(BoundTarget),
    IllegalSubsystem { consumer: String, provider: String },
    IllegalServiceMetadata { message: String },
}

impl BeanState {
    pub fn kind(&self) -> BeanStateKind {
        match self {
            Self::Unbound => BeanStateKind::Unbound,
            Self::Bound(_) => BeanStateKind::Bound,
            Self::IllegalSubsystem { .. } => BeanStateKind::IllegalSubsystem,
            Self::IllegalServiceMetadata { .. } => BeanStateKind::IllegalServiceMetadata,
        }
    }
}

/// Whether a consumer may bind to a provider in a given subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemPolicy {
    consumer: String,
    enforce: bool,
}

impl SubsystemPolicy {
    pub fn new(consumer: impl Into<String>, enforce: bool) -> Self {
        Self {
            consumer: consumer.into(),
            enforce,
        }
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Versioned APIs may always cross subsystem boundaries.
    pub fn allows(&self, versioning: &ServiceVersioningContext, provider: &str) -> bool {
        versioning.is_versioned() || !self.enforce || self.consumer == provider
    }
}

pub struct StatefulBeanInstance {
    id: u64,
    bean_key: BeanKey,
    versioning: ServiceVersioningContext,
    policy: SubsystemPolicy,
    discovery: Arc<dyn ServiceDiscovery>,
    components: ServiceComponents,
    event_bus: EventBus,
    settings: Option<Arc<dyn SettingsReader>>,
    state: ArcSwap<BeanState>,
    /// Serializes bind, renewal and teardown. Guards the properties the
    /// current state was derived from.
    current_properties: Mutex<Option<ServiceProperties>>,
    bound: watch::Sender<bool>,
    destroyed: AtomicBool,
}

impl StatefulBeanInstance {
    pub fn new(
        bean_key: BeanKey,
        versioning: ServiceVersioningContext,
        discovery: Arc<dyn ServiceDiscovery>,
        components: ServiceComponents,
        policy: SubsystemPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            id: NEXT_BEAN_ID.fetch_add(1, Ordering::Relaxed),
            bean_key,
            versioning,
            policy,
            discovery,
            components,
            event_bus,
            settings: None,
            state: ArcSwap::from_pointee(BeanState::Unbound),
            current_properties: Mutex::new(None),
            bound: watch::channel(false).0,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Read the per-bean availability switch from `settings` on every call.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsReader>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Process-unique id used in log messages.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bean_key(&self) -> &BeanKey {
        &self.bean_key
    }

    pub fn state_kind(&self) -> BeanStateKind {
        self.state.load().kind()
    }

    pub fn is_bound(&self) -> bool {
        self.state_kind().is_bound()
    }

    /// Properties the current state was derived from, if any.
    pub async fn current_properties(&self) -> Option<ServiceProperties> {
        self.current_properties.lock().await.clone()
    }

    /// Whether the bean is switched on in the runtime settings.
    pub fn is_available(&self) -> bool {
        self.settings.as_ref().is_none_or(|settings| {
            settings.get_boolean(&keys::bean_available(&self.bean_key), true)
        })
    }

    /// The instance calls should go to right now.
    pub fn current_target(&self) -> Result<AnyInstance, BeanError> {
        if !self.is_available() {
            return Err(BeanError::ServiceUnavailable {
                bean: self.bean_key.clone(),
                bean_id: self.id,
                reason: "is explicitly set in unavailable state",
            });
        }
        match &**self.state.load() {
            BeanState::Bound(target) => Ok(target.instance.clone()),
            BeanState::Unbound => Err(BeanError::ServiceUnavailable {
                bean: self.bean_key.clone(),
                bean_id: self.id,
                reason: "is not bound",
            }),
            BeanState::IllegalSubsystem { consumer, provider } => Err(BeanError::IllegalSubsystem {
                consumer: consumer.clone(),
                provider: provider.clone(),
                bean_type: self.bean_key.bean_type(),
            }),
            BeanState::IllegalServiceMetadata { message } => {
                Err(BeanError::IllegalServiceMetadata {
                    bean: self.bean_key.clone(),
                    bean_id: self.id,
                    message: message.clone(),
                })
            }
        }
    }

    /// Attempt to bind if not already in a definite state.
    ///
    /// Never fails: problems are logged and the bean stays `Unbound` so a
    /// later attempt can retry.
    pub async fn bind(&self) {
        let mut current = self.current_properties.lock().await;
        self.bind_locked(&mut current)
            .instrument(create_bind_span(&self.bean_key, self.id))
            .await;
    }

    /// Like [`StatefulBeanInstance::bind`], but gives up immediately if a
    /// bind or renewal is already running. Returns whether an attempt was made.
    pub async fn try_bind(&self) -> bool {
        let Ok(mut current) = self.current_properties.try_lock() else {
            debug!(
                "Bind already in progress, skipping. bean={} bean_id={}",
                self.bean_key, self.id
            );
            return false;
        };
        self.bind_locked(&mut current)
            .instrument(create_bind_span(&self.bean_key, self.id))
            .await;
        true
    }

    async fn bind_locked(&self, current: &mut Option<ServiceProperties>) {
        if self.is_bound() || self.is_destroyed() {
            return;
        }
        match self.discovery.run().await {
            Ok(Some(properties)) => self.bind_to(Some(properties), current).await,
            Ok(None) => info!(
                "Failed to discover service using {}. bean={} bean_id={}",
                self.discovery.description(),
                self.bean_key,
                self.id
            ),
            Err(e) => warn!(
                "Failed to bind service bean. bean={} bean_id={}: {}",
                self.bean_key, self.id, e
            ),
        }
    }

    /// Re-run discovery and rebind if the service properties changed.
    pub async fn renew_lease(&self) {
        let mut current = self.current_properties.lock().await;
        if self.is_destroyed() {
            return;
        }
        match self.discovery.run().await {
            Ok(discovered) if discovered != *current => {
                info!(
                    "Service properties changed, rebinding. bean={} bean_id={}",
                    self.bean_key, self.id
                );
                self.bind_to(discovered, &mut current)
                    .instrument(create_bind_span(&self.bean_key, self.id))
                    .await;
            }
            Ok(_) => debug!(
                "Service properties unchanged. bean={} bean_id={}",
                self.bean_key, self.id
            ),
            Err(e) => warn!(
                "Failed to renew lease for service bean. bean={} bean_id={}: {}",
                self.bean_key, self.id, e
            ),
        }
    }

    /// Drive the bean to the state implied by `properties`.
    ///
    /// Properties are only remembered for definite outcomes, so a failed bind
    /// leaves nothing to compare against and the next renewal retries.
    async fn bind_to(
        &self,
        properties: Option<ServiceProperties>,
        current: &mut Option<ServiceProperties>,
    ) {
        let Some(properties) = properties else {
            *current = None;
            self.install(BeanState::Unbound);
            return;
        };

        let provider = properties.subsystem().unwrap_or(DEFAULT_SUBSYSTEM).to_string();
        if !self.policy.allows(&self.versioning, &provider) {
            warn!(
                "Service provided by subsystem '{}' may not be used from subsystem '{}'. bean={} bean_id={}",
                provider,
                self.policy.consumer(),
                self.bean_key,
                self.id
            );
            self.install(BeanState::IllegalSubsystem {
                consumer: self.policy.consumer().to_string(),
                provider,
            });
            *current = Some(properties);
            return;
        }

        match self.create_target(&properties).await {
            Ok(target) => {
                self.install(BeanState::Bound(target));
                *current = Some(properties);
            }
            Err(ServiceError::IllegalMetadata(message)) => {
                error!(
                    "Illegal service metadata. bean={} bean_id={} properties={}: {}",
                    self.bean_key, self.id, properties, message
                );
                self.install(BeanState::IllegalServiceMetadata { message });
                *current = Some(properties);
            }
            Err(e) if e.is_configuration_error() => {
                error!(
                    "Cannot bind service bean. bean={} bean_id={} properties={}: {}",
                    self.bean_key, self.id, properties, e
                );
                self.install(BeanState::Unbound);
                *current = None;
            }
            Err(e) => {
                warn!(
                    "Failed to bind service bean. bean={} bean_id={}: {}",
                    self.bean_key, self.id, e
                );
                self.install(BeanState::Unbound);
                *current = None;
            }
        }
    }

    async fn create_target(&self, properties: &ServiceProperties) -> ServiceResult<BoundTarget> {
        let name = properties.component().ok_or_else(|| {
            ServiceError::IllegalMetadata(format!(
                "Expected a component name in service properties {properties}"
            ))
        })?;
        let component = self.components.get(name)?;
        let bean_type = self.bean_key.bean_type();
        if !component.can_bind_type(bean_type) {
            return Err(ServiceError::UnsupportedType {
                component: name.to_string(),
                bean_type,
            });
        }

        let binding = component.bind(&self.versioning, bean_type, properties).await?;
        let instance = binding.instance();
        if !bean_type.accepts(&instance) {
            binding.release();
            return Err(ServiceError::UnsupportedType {
                component: name.to_string(),
                bean_type,
            });
        }
        Ok(BoundTarget { binding, instance })
    }

    /// Publish the new state, then release whatever the old one held.
    fn install(&self, next: BeanState) {
        let current_kind = next.kind();
        let previous = self.state.swap(Arc::new(next));
        let previous_kind = previous.kind();

        if previous_kind != current_kind {
            info!(
                "Service bean entering new state. new_state={} previous_state={} bean={} bean_id={}",
                current_kind, previous_kind, self.bean_key, self.id
            );
        }
        self.publish(previous, current_kind);
    }

    fn publish(&self, previous: Arc<BeanState>, current_kind: BeanStateKind) {
        self.bound.send_replace(current_kind.is_bound());
        self.event_bus.fire_event(BeanStateChanged {
            bean_key: self.bean_key.clone(),
            bean_id: self.id,
            previous: previous.kind(),
            current: current_kind,
        });

        if let BeanState::Bound(target) = &*previous {
            target.binding.release();
        }
    }

    /// Wait until the bean leaves `Unbound`.
    pub async fn wait_until_bound(&self, timeout: Duration) -> Result<(), BeanError> {
        let mut receiver = self.bound.subscribe();
        let reached = tokio::time::timeout(timeout, receiver.wait_for(|bound| *bound)).await;
        if matches!(reached, Ok(Ok(_))) {
            Ok(())
        } else {
            Err(BeanError::BindTimeout {
                bean: self.bean_key.clone(),
                timeout,
            })
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Drop back to `Unbound` for good and release the current target. Later
    /// bind attempts and renewals are ignored.
    pub async fn destroy(&self) {
        let mut current = self.current_properties.lock().await;
        self.destroyed.store(true, Ordering::Release);
        *current = None;
        let previous = self.state.swap(Arc::new(BeanState::Unbound));
        self.publish(previous, BeanStateKind::Unbound);
        debug!("Destroyed service bean. bean={} bean_id={}", self.bean_key, self.id);
    }
}

impl fmt::Debug for StatefulBeanInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulBeanInstance")
            .field("id", &self.id)
            .field("bean_key", &self.bean_key)
            .field("state", &self.state_kind())
            .finish()
    }
}
