pub mod config_discovery;
pub mod direct_component;
pub mod in_memory_registry;
pub mod settings;

/// Re-export commonly used types from adapters
pub use config_discovery::{ConfigDiscoveryFactory, ConfigServiceDiscovery};
pub use direct_component::DirectComponent;
pub use in_memory_registry::{
    InMemoryServiceRegistry, RegistryDiscoveryFactory, RegistryServiceDiscovery,
};
pub use settings::{ConfigSettingsReader, MapSettings};
