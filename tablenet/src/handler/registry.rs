//! Name-keyed handler factory.

use std::collections::HashMap;

use tablenet_core::ConfigError;

use super::adagrad::AdaGradHandler;
use super::sgd::SgdHandler;
use super::TableHandler;

type HandlerCtor = Box<dyn Fn() -> Box<dyn TableHandler> + Send + Sync>;

/// Maps string identifiers to handler constructors.
///
/// Registration happens at process start; each [`HandlerRegistry::create`]
/// call returns a fresh instance, so tables never share handler state.
#[derive(Default)]
pub struct HandlerRegistry {
    ctors: HashMap<String, HandlerCtor>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the shipped handlers: `"SGD"` and `"AdaGrad"`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("SGD", || Box::new(SgdHandler::new()));
        registry.register("AdaGrad", || Box::new(AdaGradHandler::new()));
        registry
    }

    /// Register a constructor under an identifier, replacing any previous
    /// registration.
    pub fn register<F>(&mut self, id: impl Into<String>, ctor: F)
    where
        F: Fn() -> Box<dyn TableHandler> + Send + Sync + 'static,
    {
        self.ctors.insert(id.into(), Box::new(ctor));
    }

    /// Construct a fresh handler by identifier.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownHandler`] when nothing is registered under
    /// `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn TableHandler>, ConfigError> {
        match self.ctors.get(id) {
            Some(ctor) => Ok(ctor()),
            None => Err(ConfigError::UnknownHandler { id: id.to_string() }),
        }
    }

    /// Whether an identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.ctors.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::super::{TableConfig, TableValue};
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.identifiers(), vec!["AdaGrad", "SGD"]);
    }

    #[test]
    fn create_returns_a_working_handler() {
        let registry = HandlerRegistry::with_builtins();
        let mut handler = registry.create("SGD").expect("known handler");
        handler.setup(&TableConfig::default());

        let stored = handler.put("w", TableValue::from_data(vec![1.0]));
        assert_eq!(stored.data, vec![1.0]);
    }

    #[test]
    fn unknown_identifier_is_a_config_error() {
        let registry = HandlerRegistry::with_builtins();
        assert!(matches!(
            registry.create("NoSuchHandler"),
            Err(ConfigError::UnknownHandler { id }) if id == "NoSuchHandler"
        ));
    }

    #[test]
    fn create_returns_fresh_instances() {
        let registry = HandlerRegistry::with_builtins();
        let mut first = registry.create("AdaGrad").expect("handler");
        let second = registry.create("AdaGrad").expect("handler");

        // Reconfiguring one instance must not leak into the other.
        first.setup(&TableConfig {
            learning_rate: 100.0,
            ..TableConfig::default()
        });
        let mut stored = first.put("w", TableValue::from_data(vec![1.0]));
        assert!(first.update(&mut stored, &TableValue::delta(vec![1.0])));

        let from_first = first.get("w", &stored);
        let from_second = second.get("w", &stored);
        assert_ne!(from_first.data, from_second.data);
    }

    #[test]
    fn custom_registrations_override() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.contains("SGD"));
        registry.register("SGD", || Box::new(SgdHandler::new()));
        assert!(registry.contains("SGD"));
        assert!(registry.create("SGD").is_ok());
    }
}
