use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::{PluginContext, PluginModule};
use crate::error::BootstrapError;
use crate::messaging::{MessagingService, MicroserviceEnricher};
use crate::settings::Configuration;

/// Lifecycle position of a `CompositeApp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Built,
    Composed,
    Started,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppState::Built => "built",
            AppState::Composed => "composed",
            AppState::Started => "started",
            AppState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Builder for a `CompositeApp`.
pub struct CompositeAppBuilder {
    app_name: String,
    host_id: Option<String>,
    configuration: Configuration,
    messaging: MessagingService,
    modules: Vec<Box<dyn PluginModule>>,
    names: HashSet<String>,
}

impl CompositeAppBuilder {
    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Defaults to a random id.
    pub fn with_host_id(mut self, host_id: impl Into<String>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }

    /// Add a module. Module names must be unique.
    pub fn add_module(mut self, module: impl PluginModule + 'static) -> Result<Self, BootstrapError> {
        let name = module.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(BootstrapError::DuplicateModule(name));
        }
        self.modules.push(Box::new(module));
        Ok(self)
    }

    pub fn build(self) -> CompositeApp {
        let host_id = self
            .host_id
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        CompositeApp {
            context: PluginContext::new(Arc::new(self.configuration), self.app_name, host_id, self.messaging),
            modules: self.modules,
            state: AppState::Built,
        }
    }
}

/// An application composed of plugin modules sharing one messaging service.
pub struct CompositeApp {
    context: PluginContext,
    modules: Vec<Box<dyn PluginModule>>,
    state: AppState,
}

impl CompositeApp {
    pub fn builder(app_name: impl Into<String>, messaging: MessagingService) -> CompositeAppBuilder {
        CompositeAppBuilder {
            app_name: app_name.into(),
            host_id: None,
            configuration: Configuration::new(),
            messaging,
            modules: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn messaging(&self) -> &MessagingService {
        self.context.messaging()
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    fn expect_state(&self, expected: AppState, operation: &str) -> Result<(), BootstrapError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BootstrapError::InvalidState(format!(
                "cannot {operation} an application that is {}",
                self.state
            )))
        }
    }

    /// Initialize every module, then configure every module.
    pub async fn compose(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(AppState::Built, "compose")?;
        for module in self.modules.iter_mut() {
            tracing::debug!(module = %module.name(), "initializing module");
            module.initialize(&self.context).await?;
        }
        for module in self.modules.iter_mut() {
            tracing::debug!(module = %module.name(), "configuring module");
            module.configure(&self.context).await?;
        }
        self.context.messaging().add_enricher(Arc::new(MicroserviceEnricher::new(
            self.context.app_name(),
            self.context.host_id(),
        )));
        self.state = AppState::Composed;
        tracing::info!(
            app = %self.context.app_name(),
            host_id = %self.context.host_id(),
            modules = self.modules.len(),
            "application composed"
        );
        Ok(())
    }

    /// Start modules in registration order.
    ///
    /// On the first failure the modules already started are stopped in
    /// reverse order and the app stays composed.
    pub async fn start(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(AppState::Composed, "start")?;
        for index in 0..self.modules.len() {
            let module = &mut self.modules[index];
            if let Err(err) = module.start(&self.context).await {
                tracing::error!(module = %module.name(), error = %err, "module failed to start");
                self.roll_back(index).await;
                return Err(err);
            }
            tracing::info!(module = %module.name(), "module started");
        }
        self.state = AppState::Started;
        Ok(())
    }

    async fn roll_back(&mut self, started: usize) {
        for module in self.modules[..started].iter_mut().rev() {
            match module.stop(&self.context).await {
                Ok(()) => tracing::info!(module = %module.name(), "module stopped after failed start"),
                Err(err) => tracing::error!(module = %module.name(), error = %err, "module failed to stop"),
            }
        }
    }

    /// Stop modules in reverse order. Every module is stopped even if some
    /// fail; the first failure is returned.
    pub async fn stop(&mut self) -> Result<(), BootstrapError> {
        self.expect_state(AppState::Started, "stop")?;
        let mut first_error = None;
        for module in self.modules.iter_mut().rev() {
            match module.stop(&self.context).await {
                Ok(()) => tracing::info!(module = %module.name(), "module stopped"),
                Err(err) => {
                    tracing::error!(module = %module.name(), error = %err, "module failed to stop");
                    first_error.get_or_insert(err);
                }
            }
        }
        self.state = AppState::Stopped;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
