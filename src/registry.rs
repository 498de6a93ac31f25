//! The set of commands a shell knows about.

use crate::command::CommandDescriptor;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Name → command map consulted by the executor and the completer.
///
/// Cheap to clone: descriptors are shared.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: BTreeMap<String, Rc<CommandDescriptor>>,
}

impl Registry {
    /// An empty registry, without the builtins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command, replacing (and returning) any command of the same name.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Option<Rc<CommandDescriptor>> {
        tracing::trace!(command = descriptor.name(), "registering command");
        self.commands
            .insert(descriptor.name().to_string(), Rc::new(descriptor))
    }

    /// Looks a command up by its exact name.
    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name).map(Rc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Command names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Descriptors, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values().map(Rc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::ParamType;
    use crate::value::Value;

    fn noop(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, |_args, _ctx| Ok(Value::None))
    }

    #[test]
    fn test_lookup_is_by_exact_name() {
        let mut registry = Registry::new();
        registry.register(noop("create_book"));
        registry.register(noop("echo"));

        assert!(registry.get("create_book").is_some());
        assert!(registry.get("create").is_none());
        assert!(registry.get("ECHO").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["create_book", "echo"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = Registry::new();
        assert!(registry.register(noop("echo")).is_none());
        let previous = registry.register(noop("echo").param("value", ParamType::Any));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().params().len(), 1);
    }
}
