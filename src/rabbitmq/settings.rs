use std::time::Duration;

use serde::Deserialize;

use crate::bus::ConnectionTarget;
use crate::settings::Settings;

/// RabbitMQ connections, one per configured bus.
///
/// ```toml
/// [[netfusion.rabbitMQ.connections]]
/// busName = "orders"
/// hostName = "rabbit.local"
/// virtualHost = "/sales"
/// rpcTimeoutMs = 5000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RabbitMqSettings {
    pub connections: Vec<RabbitMqConnection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RabbitMqConnection {
    pub bus_name: String,
    pub host_name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_virtual_host")]
    pub virtual_host: String,
    /// Default prefetch for consumer queues.
    #[serde(default)]
    pub prefetch_count: Option<u16>,
    /// How long an RPC client waits for a reply.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Pause between failed reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_virtual_host() -> String {
    "/".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

impl RabbitMqConnection {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn target(&self) -> ConnectionTarget {
        let mut target = ConnectionTarget::new(&self.bus_name, &self.host_name)
            .with_property("virtualHost", &self.virtual_host);
        target.port = self.port;
        target.user_name = self.user_name.clone();
        target.password = self.password.clone();
        target
    }
}

impl RabbitMqSettings {
    pub fn connection(&self, bus_name: &str) -> Option<&RabbitMqConnection> {
        self.connections.iter().find(|c| c.bus_name == bus_name)
    }
}

impl Settings for RabbitMqSettings {
    const SECTION: &'static str = "netfusion:rabbitMQ";

    fn validate(&self) -> Result<(), String> {
        for connection in &self.connections {
            if connection.bus_name.is_empty() || connection.host_name.is_empty() {
                return Err("every connection needs a busName and hostName".to_string());
            }
            if connection.rpc_timeout_ms == 0 {
                return Err(format!("rpcTimeoutMs of bus {} must be positive", connection.bus_name));
            }
        }
        Ok(())
    }
}
