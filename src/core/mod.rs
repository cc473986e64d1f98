pub mod api_provider;
pub mod bean;
pub mod bean_states;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod factories;
pub mod lease_manager;
pub mod plugins;
pub mod rebind_worker;
pub mod registry;
pub mod resolver;
pub mod service_properties;
pub mod stateful;

pub use api_provider::{ApiDescriptor, ApiProvider, ConfigProvider, LibraryProvider, ServiceProvider};
pub use bean::{AnyInstance, Bean, BeanInstance, BeanKey, BeanType};
pub use context::AstrixContext;
pub use error::{BeanError, PluginError};
pub use factories::{BeanDependencies, LibraryFactory, ServiceFactory, TimedFactory};
pub use registry::{FactoryBean, FactoryBeanRegistry};
pub use service_properties::{ServiceProperties, ServiceVersioningContext};
pub use stateful::{BeanStateKind, StatefulBeanInstance};
