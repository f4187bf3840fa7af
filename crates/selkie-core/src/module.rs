//! Actor module (factory) registry
//!
//! The original design loads actor factories from shared libraries; here the
//! registry is a name-to-factory map that can be backed by static linkage.
//! The dispatcher only needs `create(module) -> factory` and drop semantics.

use crate::actor::Actor;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Factory producing actor instances for one module name
pub trait ActorModule: Send + Sync {
    /// Create a new actor instance
    fn create(&self, instance: &str) -> Result<Box<dyn Actor>>;
}

/// Adapter turning a closure into an [`ActorModule`]
pub struct FnModule<F>(F);

impl<F> FnModule<F>
where
    F: Fn(&str) -> Box<dyn Actor> + Send + Sync,
{
    /// Wrap a constructor closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ActorModule for FnModule<F>
where
    F: Fn(&str) -> Box<dyn Actor> + Send + Sync,
{
    fn create(&self, instance: &str) -> Result<Box<dyn Actor>> {
        Ok((self.0)(instance))
    }
}

/// Registry of actor modules by name
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn ActorModule>>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `name`
    ///
    /// Registering a name twice keeps the first module and logs a warning.
    pub fn register(&self, name: impl Into<String>, module: Arc<dyn ActorModule>) {
        let name = name.into();
        let mut modules = self.modules.write().unwrap();
        if modules.contains_key(&name) {
            warn!(module = %name, "module already registered, keeping existing");
            return;
        }
        modules.insert(name, module);
    }

    /// Register a constructor closure under `name`
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&str) -> Box<dyn Actor> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnModule::new(f)));
    }

    /// Create an actor instance from the named module
    pub fn create(&self, module: &str, instance: &str) -> Result<Box<dyn Actor>> {
        let factory = {
            let modules = self.modules.read().unwrap();
            modules
                .get(module)
                .cloned()
                .ok_or_else(|| Error::ModuleNotFound {
                    module: module.to_string(),
                })?
        };
        factory
            .create(instance)
            .map_err(|e| Error::InstanceCreateFailed {
                module: module.to_string(),
                instance: instance.to_string(),
                reason: e.to_string(),
            })
    }

    /// Whether a module is registered
    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().unwrap().contains_key(name)
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.read().unwrap().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.modules.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorContext;
    use crate::message::Msg;

    struct NullActor;

    impl Actor for NullActor {
        fn proc(&mut self, _ctx: &ActorContext, _msg: Msg) {}
    }

    #[test]
    fn test_register_and_create() {
        let registry = ModuleRegistry::new();
        registry.register_fn("example", |_| Box::new(NullActor));

        assert!(registry.contains("example"));
        assert!(registry.create("example", "1").is_ok());
    }

    #[test]
    fn test_unknown_module() {
        let registry = ModuleRegistry::new();
        let err = registry.create("ghost", "1").unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound { .. }));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = ModuleRegistry::new();
        registry.register_fn("example", |_| Box::new(NullActor));
        registry.register_fn("example", |_| Box::new(NullActor));
        assert_eq!(registry.len(), 1);
    }
}
