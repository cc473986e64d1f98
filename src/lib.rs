//! Astrix - service provisioning and bean binding runtime.
//!
//! Astrix lets an application ask for an API by type (optionally with a
//! qualifier) and get back a handle, without knowing whether the API is
//! backed by an in-process library or by a remote service. The library
//! implements a **hexagonal architecture**: `ports` holds the traits that
//! service components, discovery mechanisms and settings sources implement,
//! `adapters` holds the bundled implementations, and `core` holds the
//! context, registry and binding machinery.
//!
//! # Features
//! - Factory registry keyed by API type and qualifier, with fallback from a
//!   qualified lookup to the unqualified provider
//! - Transitive dependency resolution with cycle detection before any bean
//!   is created
//! - Self-healing service beans: unbound beans are retried by a background
//!   rebind worker, bound beans follow their service through lease renewal
//! - Subsystem boundaries for non-versioned services
//! - Bean state change events and `wait_for_bean` for startup gating
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use astrix::{AstrixContext, DirectComponent, FactoryBean, LibraryFactory, MapSettings};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> String;
//! }
//!
//! struct Hello;
//!
//! impl Greeter for Hello {
//!     fn greet(&self, name: &str) -> String {
//!         format!("hello {name}")
//!     }
//! }
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let context = AstrixContext::new(Arc::new(MapSettings::new()))?;
//! context.register_service_component(Arc::new(DirectComponent::new()));
//! context.register_bean_factory(FactoryBean::new(Arc::new(
//!     LibraryFactory::<dyn Greeter>::new(|_| {
//!         let greeter: Arc<dyn Greeter> = Arc::new(Hello);
//!         Ok(greeter)
//!     }),
//! )))?;
//!
//! let greeter = context.get_bean::<dyn Greeter>().await?;
//! assert_eq!(greeter.invoke(|g| g.greet("astrix"))?, "hello astrix");
//! context.destroy().await;
//! # Ok(()) }
//! ```
//!
//! # Concurrency
//! Everything runs on tokio. Shared maps use `scc::HashMap`, hot-swapped
//! bean state uses `arc_swap::ArcSwap`, and background loops stop through a
//! `tokio_util::sync::CancellationToken` owned by the context.
//!
//! # Error Handling
//! Bean lookups return [`BeanError`]; service components return
//! [`ServiceError`]; settings loading returns `eyre::Result`.
pub mod config;
pub mod ports;
pub mod tracing_setup;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{
        ConfigServiceDiscovery, DirectComponent, InMemoryServiceRegistry, MapSettings,
        RegistryDiscoveryFactory,
    },
    core::{
        ApiDescriptor, ApiProvider, AstrixContext, Bean, BeanError, BeanKey, BeanStateKind,
        BeanType, FactoryBean, LibraryFactory, ServiceFactory, ServiceProperties, TimedFactory,
    },
    ports::{ServiceComponent, ServiceDiscovery, ServiceError, SettingsReader},
};
