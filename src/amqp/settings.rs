use std::time::Duration;

use serde::Deserialize;

use crate::bus::ConnectionTarget;
use crate::settings::Settings;

/// AMQP 1.0 hosts, one per configured bus.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmqpSettings {
    pub hosts: Vec<AmqpHostSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmqpHostSettings {
    pub bus_name: String,
    pub host_address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Pause between failed reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

impl AmqpHostSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn target(&self) -> ConnectionTarget {
        let mut target = ConnectionTarget::new(&self.bus_name, &self.host_address);
        target.port = self.port;
        target.user_name = self.username.clone();
        target.password = self.password.clone();
        target
    }
}

impl AmqpSettings {
    pub fn host(&self, bus_name: &str) -> Option<&AmqpHostSettings> {
        self.hosts.iter().find(|h| h.bus_name == bus_name)
    }
}

impl Settings for AmqpSettings {
    const SECTION: &'static str = "netfusion:amqp";

    fn validate(&self) -> Result<(), String> {
        for host in &self.hosts {
            if host.bus_name.is_empty() || host.host_address.is_empty() {
                return Err("every host needs a busName and hostAddress".to_string());
            }
        }
        Ok(())
    }
}
