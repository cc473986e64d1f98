use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    core::{bean::BeanKey, service_properties::ServiceProperties},
    ports::service_component::ServiceResult,
};

/// ServiceDiscovery defines the port for locating a service
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// Look the service up.
    ///
    /// `Ok(None)` means the service is not currently provided; errors are
    /// reserved for discovery itself failing.
    async fn run(&self) -> ServiceResult<Option<ServiceProperties>>;

    /// Human readable description used in log messages
    fn description(&self) -> String;
}

/// Creates the discovery a stateful bean uses for its whole lifetime
pub trait ServiceDiscoveryFactory: Send + Sync + 'static {
    fn create(&self, bean_key: &BeanKey) -> Arc<dyn ServiceDiscovery>;
}
