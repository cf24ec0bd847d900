//! Component Registry
//!
//! Maps the component names used in task catalogs to host component types.
//! Names are resolved once, when the catalog is loaded; evaluation only ever
//! sees the resulting [`ComponentKey`].

use bevy_ecs::component::Component;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;

use crate::components::{Bleeding, Blocking, Construction, Controllable, Mob, Position, RoutineTasks, Tags};

/// Index of a registered component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey(pub usize);

/// A component named in a catalog, resolved at load time.
///
/// Deserializes from a bare string such as `"Mob"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComponentRef {
    name: String,
    key: Option<ComponentKey>,
}

impl ComponentRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` until resolved against a registry
    pub fn key(&self) -> Option<ComponentKey> {
        self.key
    }

    /// Resolves the name, returning it back on failure.
    pub fn resolve(&mut self, registry: &ComponentRegistry) -> Result<(), String> {
        match registry.key_of(&self.name) {
            Some(key) => {
                self.key = Some(key);
                Ok(())
            }
            None => Err(self.name.clone()),
        }
    }
}

impl From<String> for ComponentRef {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

impl From<ComponentRef> for String {
    fn from(value: ComponentRef) -> Self {
        value.name
    }
}

/// Resource: name -> component type lookup.
#[derive(Resource, Debug, Clone, Default)]
pub struct ComponentRegistry {
    by_name: HashMap<String, ComponentKey>,
    types: Vec<TypeId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with this crate's own components under their type names
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Controllable>("Controllable")
            .register::<Tags>("Tags")
            .register::<Position>("Position")
            .register::<Mob>("Mob")
            .register::<Bleeding>("Bleeding")
            .register::<Construction>("Construction")
            .register::<Blocking>("Blocking")
            .register::<RoutineTasks>("RoutineTasks");
        registry
    }

    /// Registers a component type under a name. Re-registering a name rebinds it.
    pub fn register<T: Component>(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        let type_id = TypeId::of::<T>();
        match self.by_name.get(&name) {
            Some(key) => self.types[key.0] = type_id,
            None => {
                let key = ComponentKey(self.types.len());
                self.types.push(type_id);
                self.by_name.insert(name, key);
            }
        }
        self
    }

    pub fn key_of(&self, name: &str) -> Option<ComponentKey> {
        self.by_name.get(name).copied()
    }

    pub fn type_id(&self, key: ComponentKey) -> Option<TypeId> {
        self.types.get(key.0).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Component)]
    struct Ore;

    #[test]
    fn test_builtin_names() {
        let registry = ComponentRegistry::with_builtin();
        assert!(registry.key_of("Mob").is_some());
        assert!(registry.key_of("Bleeding").is_some());
        assert!(registry.key_of("Ore").is_none());
    }

    #[test]
    fn test_register_custom_component() {
        let mut registry = ComponentRegistry::with_builtin();
        let before = registry.len();
        registry.register::<Ore>("Ore");

        let key = registry.key_of("Ore").unwrap();
        assert_eq!(registry.type_id(key), Some(TypeId::of::<Ore>()));
        assert_eq!(registry.len(), before + 1);
    }

    #[test]
    fn test_reregister_keeps_key() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Ore>("Thing");
        let key = registry.key_of("Thing").unwrap();

        registry.register::<Mob>("Thing");
        assert_eq!(registry.key_of("Thing"), Some(key));
        assert_eq!(registry.type_id(key), Some(TypeId::of::<Mob>()));
    }

    #[test]
    fn test_component_ref_resolution() {
        let registry = ComponentRegistry::with_builtin();

        let mut good: ComponentRef = serde_json::from_str(r#""Construction""#).unwrap();
        assert_eq!(good.key(), None);
        good.resolve(&registry).unwrap();
        assert_eq!(good.key(), registry.key_of("Construction"));

        let mut bad = ComponentRef::named("Nope");
        assert_eq!(bad.resolve(&registry), Err("Nope".to_string()));
    }
}
