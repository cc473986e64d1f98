use async_trait::async_trait;

use crate::core::{
    bean::{BeanInstance, BeanKey, BeanType},
    context::AstrixContext,
    error::BeanError,
};

/// FactoryBeanPlugin defines the port for producing bean instances
#[async_trait]
pub trait FactoryBeanPlugin: Send + Sync + 'static {
    /// The type this factory produces
    fn bean_type(&self) -> BeanType;

    /// Create the instance for `key`.
    ///
    /// Called at most once per key; the context caches the result.
    async fn create(&self, key: &BeanKey, context: &AstrixContext)
    -> Result<BeanInstance, BeanError>;

    /// Stateful factories produce beans bound to a service that may come and go
    fn is_stateful(&self) -> bool {
        false
    }

    /// Beans this factory needs while creating its instance
    fn bean_dependencies(&self) -> Vec<BeanKey> {
        Vec::new()
    }

    /// The wrapped factory, for decorators
    fn decorated(&self) -> Option<&dyn FactoryBeanPlugin> {
        None
    }
}
