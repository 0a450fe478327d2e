use serde::Deserialize;

use crate::bus::{ConnectionTarget, EntityOptions};
use crate::settings::Settings;

/// Azure Service Bus namespaces, one per configured bus.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceBusSettings {
    pub namespaces: Vec<NamespaceSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSettings {
    pub bus_name: String,
    /// Fully qualified namespace, `<name>.servicebus.windows.net`.
    pub host_name: String,
    #[serde(default)]
    pub shared_access_key_name: Option<String>,
    #[serde(default)]
    pub shared_access_key: Option<String>,
    #[serde(default)]
    pub transport: TransportType,
    /// Applied to queues and subscriptions that leave an option unset.
    #[serde(default)]
    pub entity_defaults: EntityOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportType {
    #[default]
    AmqpTcp,
    AmqpWebSockets,
}

impl TransportType {
    fn as_str(self) -> &'static str {
        match self {
            TransportType::AmqpTcp => "amqpTcp",
            TransportType::AmqpWebSockets => "amqpWebSockets",
        }
    }
}

impl NamespaceSettings {
    pub fn target(&self) -> ConnectionTarget {
        let mut target =
            ConnectionTarget::new(&self.bus_name, &self.host_name).with_property("transport", self.transport.as_str());
        target.user_name = self.shared_access_key_name.clone();
        target.password = self.shared_access_key.clone();
        target
    }
}

impl ServiceBusSettings {
    pub fn namespace(&self, bus_name: &str) -> Option<&NamespaceSettings> {
        self.namespaces.iter().find(|n| n.bus_name == bus_name)
    }
}

impl Settings for ServiceBusSettings {
    const SECTION: &'static str = "netfusion:azure:serviceBus";

    fn validate(&self) -> Result<(), String> {
        for namespace in &self.namespaces {
            if namespace.bus_name.is_empty() || namespace.host_name.is_empty() {
                return Err("every namespace needs a busName and hostName".to_string());
            }
            if namespace.shared_access_key_name.is_some() != namespace.shared_access_key.is_some() {
                return Err(format!(
                    "namespace {} must set both sharedAccessKeyName and sharedAccessKey",
                    namespace.bus_name
                ));
            }
        }
        Ok(())
    }
}
