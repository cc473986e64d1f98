pub mod factory_bean;
pub mod service_component;
pub mod service_discovery;
pub mod settings;

pub use factory_bean::FactoryBeanPlugin;
pub use service_component::{BoundServiceBean, ServiceComponent, ServiceError, ServiceResult};
pub use service_discovery::{ServiceDiscovery, ServiceDiscoveryFactory};
pub use settings::SettingsReader;
