//! Service registration and per-dispatch scopes.
//!
//! Every handler invocation gets a fresh `Scope`. Singletons are shared by
//! all scopes; scoped services are created lazily, at most once per scope.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::dispatch::HandlerError;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Scope) -> Instance + Send + Sync>;

/// Registered services, shared by every scope.
#[derive(Default, Clone)]
pub struct Services {
    singletons: HashMap<TypeId, Instance>,
    scoped: HashMap<TypeId, Factory>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_singleton<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.add_singleton_arc(Arc::new(value))
    }

    pub fn add_singleton_arc<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.singletons.insert(TypeId::of::<T>(), value);
        self
    }

    /// Register a service created once per scope.
    pub fn add_scoped<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        self.scoped
            .insert(TypeId::of::<T>(), Arc::new(move |scope: &Scope| Arc::new(factory(scope)) as Instance));
        self
    }

    pub fn singleton<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.singletons
            .get(&TypeId::of::<T>())
            .and_then(|i| i.clone().downcast::<T>().ok())
    }

    pub fn create_scope(self: &Arc<Self>) -> Scope {
        Scope {
            id: Uuid::new_v4(),
            services: self.clone(),
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("singletons", &self.singletons.len())
            .field("scoped", &self.scoped.len())
            .finish()
    }
}

/// Services resolved for one dispatch.
pub struct Scope {
    id: Uuid,
    services: Arc<Services>,
    instances: Mutex<HashMap<TypeId, Instance>>,
}

impl Scope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Resolve a scoped service, else a singleton.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();

        if let Some(factory) = self.services.scoped.get(&type_id) {
            let cached = self
                .instances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(&type_id)
                .cloned();
            let instance = match cached {
                Some(instance) => instance,
                None => {
                    // The factory may resolve other services, so it runs unlocked.
                    let created = factory(self);
                    self.instances
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .entry(type_id)
                        .or_insert(created)
                        .clone()
                }
            };
            return instance.downcast::<T>().ok();
        }

        self.services.singleton::<T>()
    }

    /// Resolve a service or fail the handler.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, HandlerError> {
        self.resolve::<T>()
            .ok_or_else(|| HandlerError::NotFound(format!("service {}", std::any::type_name::<T>())))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("id", &self.id).finish()
    }
}
