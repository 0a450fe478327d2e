use serde::Deserialize;

use crate::bus::ConnectionTarget;
use crate::settings::Settings;

/// Redis connections, one per configured bus.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSettings {
    pub connections: Vec<RedisConnectionSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConnectionSettings {
    pub bus_name: String,
    pub host_name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database selected after connecting.
    #[serde(default)]
    pub database: u8,
}

impl RedisConnectionSettings {
    pub fn target(&self) -> ConnectionTarget {
        let mut target =
            ConnectionTarget::new(&self.bus_name, &self.host_name).with_property("database", self.database.to_string());
        target.port = self.port;
        target.password = self.password.clone();
        target
    }
}

impl RedisSettings {
    pub fn connection(&self, bus_name: &str) -> Option<&RedisConnectionSettings> {
        self.connections.iter().find(|c| c.bus_name == bus_name)
    }
}

impl Settings for RedisSettings {
    const SECTION: &'static str = "netfusion:redis";

    fn validate(&self) -> Result<(), String> {
        match self
            .connections
            .iter()
            .find(|c| c.bus_name.is_empty() || c.host_name.is_empty())
        {
            Some(_) => Err("every connection needs a busName and hostName".to_string()),
            None => Ok(()),
        }
    }
}
