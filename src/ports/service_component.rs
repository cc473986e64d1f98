use async_trait::async_trait;
use thiserror::Error;

use crate::core::{
    bean::{AnyInstance, BeanKey, BeanType},
    service_properties::{ServiceProperties, ServiceVersioningContext},
};

/// Custom error type for service discovery and binding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceError {
    /// The service could not be reached or is not currently provided
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The service properties are incomplete or inconsistent
    #[error("Illegal service metadata: {0}")]
    IllegalMetadata(String),

    /// No service component is registered under the given name
    #[error("No service component registered with name: {0}")]
    UnknownComponent(String),

    /// The component exists but cannot produce this bean type
    #[error("Service component '{component}' cannot bind bean type {bean_type}")]
    UnsupportedType {
        component: String,
        bean_type: BeanType,
    },

    /// The component cannot export providers
    #[error("Service component '{0}' does not support exporting services")]
    ExportNotSupported(String),

    /// Transport level failure talking to a remote party
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl ServiceError {
    /// Failures that retrying will not fix without a configuration change.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownComponent(_) | Self::UnsupportedType { .. }
        )
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A live binding produced by a [`ServiceComponent`].
pub trait BoundServiceBean: Send + Sync {
    /// The instance calls are dispatched to. Must hold an `Arc<T>` of the
    /// bean type the binding was requested for.
    fn instance(&self) -> AnyInstance;

    /// Free whatever the binding holds. Called at most once, after the
    /// binding has been replaced.
    fn release(&self) {}
}

/// ServiceComponent defines the port for turning service properties into a
/// live, callable instance
#[async_trait]
pub trait ServiceComponent: Send + Sync + 'static {
    /// Name matched against the `_component` service property
    fn name(&self) -> &str;

    /// Bind `bean_type` using the discovered service properties
    async fn bind(
        &self,
        versioning: &ServiceVersioningContext,
        bean_type: BeanType,
        properties: &ServiceProperties,
    ) -> ServiceResult<Box<dyn BoundServiceBean>>;

    fn can_bind_type(&self, _bean_type: BeanType) -> bool {
        true
    }

    /// Whether [`ServiceComponent::export_service`] needs the provider instance
    fn requires_provider_instance(&self) -> bool {
        false
    }

    /// Parse the address part of a `<component>:<address>` service URI
    fn parse_service_uri(&self, address: &str) -> ServiceResult<ServiceProperties>;

    /// Make a provider reachable through this component and describe it
    fn export_service(
        &self,
        _bean_key: &BeanKey,
        _provider: Option<AnyInstance>,
        _subsystem: &str,
    ) -> ServiceResult<ServiceProperties> {
        Err(ServiceError::ExportNotSupported(self.name().to_string()))
    }
}
