use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    core::{
        bean::BeanKey,
        plugins::ServiceComponents,
        service_properties::{ServiceProperties, split_service_uri},
    },
    ports::{
        service_component::ServiceResult,
        service_discovery::{ServiceDiscovery, ServiceDiscoveryFactory},
        settings::SettingsReader,
    },
};

/// Discovery backed by a service URI stored in settings.
///
/// The setting is read on every run, so changing it at runtime moves the
/// bean on its next lease renewal. A missing setting means the service is
/// not provided.
pub struct ConfigServiceDiscovery {
    settings: Arc<dyn SettingsReader>,
    setting_name: String,
    components: ServiceComponents,
}

impl ConfigServiceDiscovery {
    pub fn new(
        settings: Arc<dyn SettingsReader>,
        setting_name: impl Into<String>,
        components: ServiceComponents,
    ) -> Self {
        Self {
            settings,
            setting_name: setting_name.into(),
            components,
        }
    }
}

#[async_trait]
impl ServiceDiscovery for ConfigServiceDiscovery {
    async fn run(&self) -> ServiceResult<Option<ServiceProperties>> {
        let Some(uri) = self.settings.get_string(&self.setting_name, None) else {
            return Ok(None);
        };
        let (component, address) = split_service_uri(&uri)?;
        self.components
            .get(component)?
            .parse_service_uri(address)
            .map(Some)
    }

    fn description(&self) -> String {
        format!("ConfigServiceDiscovery(setting={})", self.setting_name)
    }
}

pub struct ConfigDiscoveryFactory {
    settings: Arc<dyn SettingsReader>,
    setting_name: String,
    components: ServiceComponents,
}

impl ConfigDiscoveryFactory {
    pub fn new(
        settings: Arc<dyn SettingsReader>,
        setting_name: impl Into<String>,
        components: ServiceComponents,
    ) -> Self {
        Self {
            settings,
            setting_name: setting_name.into(),
            components,
        }
    }
}

impl ServiceDiscoveryFactory for ConfigDiscoveryFactory {
    fn create(&self, _bean_key: &BeanKey) -> Arc<dyn ServiceDiscovery> {
        Arc::new(ConfigServiceDiscovery::new(
            self.settings.clone(),
            self.setting_name.clone(),
            self.components.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{
            direct_component::{DirectComponent, PROVIDER_ID},
            settings::MapSettings,
        },
        core::plugins::Plugins,
        ports::service_component::{ServiceComponent, ServiceError},
    };

    fn discovery_with(settings: Arc<MapSettings>) -> (ConfigServiceDiscovery, Arc<DirectComponent>) {
        let plugins = Plugins::new();
        let direct = Arc::new(DirectComponent::new());
        plugins.register_plugin::<dyn ServiceComponent>(direct.clone());
        let discovery = ConfigServiceDiscovery::new(
            settings,
            "astrix.services.quotes",
            ServiceComponents::new(plugins),
        );
        (discovery, direct)
    }

    #[tokio::test]
    async fn test_missing_setting_means_not_provided() {
        let (discovery, _) = discovery_with(Arc::new(MapSettings::new()));
        assert_eq!(discovery.run().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolves_uri_through_component() {
        let settings = Arc::new(MapSettings::new());
        let (discovery, direct) = discovery_with(settings.clone());
        let id = direct.register(Arc::new(10_u32));
        settings.set("astrix.services.quotes", DirectComponent::service_uri(&id));

        let properties = discovery.run().await.unwrap().unwrap();
        assert_eq!(properties.get(PROVIDER_ID), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_component_in_uri() {
        let settings = Arc::new(MapSettings::new().with("astrix.services.quotes", "carrier:1"));
        let (discovery, _) = discovery_with(settings);
        assert!(matches!(
            discovery.run().await,
            Err(ServiceError::UnknownComponent(name)) if name == "carrier"
        ));
    }

    #[tokio::test]
    async fn test_malformed_uri() {
        let settings = Arc::new(MapSettings::new().with("astrix.services.quotes", "nonsense"));
        let (discovery, _) = discovery_with(settings);
        assert!(matches!(
            discovery.run().await,
            Err(ServiceError::IllegalMetadata(_))
        ));
    }
}
