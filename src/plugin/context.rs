use std::sync::Arc;

use crate::error::BootstrapError;
use crate::messaging::MessagingService;
use crate::settings::{Configuration, Settings};

/// What a plugin module can see of its application.
#[derive(Clone)]
pub struct PluginContext {
    configuration: Arc<Configuration>,
    app_name: String,
    host_id: String,
    messaging: MessagingService,
}

impl PluginContext {
    pub fn new(
        configuration: Arc<Configuration>,
        app_name: impl Into<String>,
        host_id: impl Into<String>,
        messaging: MessagingService,
    ) -> Self {
        Self {
            configuration,
            app_name: app_name.into(),
            host_id: host_id.into(),
            messaging,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Unique id of this running instance.
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.messaging
    }

    /// Load and validate a typed settings section.
    pub fn get_settings<T: Settings>(&self) -> Result<T, BootstrapError> {
        Ok(self.configuration.get::<T>()?)
    }
}
