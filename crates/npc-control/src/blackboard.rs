//! Blackboard
//!
//! Per-actor fact store. Tasks write their target and coordinates here under
//! configurable keys; preconditions and the behavior executor read them back.
//!
//! Evaluation never writes to a blackboard. Facts that only exist for the
//! duration of one check (a candidate target, say) are layered on top with a
//! [`FactOverlay`], which is dropped when the check returns.

use bevy_ecs::entity::Entity;
use npc_messages::Coordinates;
use std::collections::HashMap;

/// Key under which every blackboard stores its own actor.
pub const OWNER_KEY: &str = "Owner";

/// Default key for a task's target entity.
pub const DEFAULT_TARGET_KEY: &str = "Target";

/// Default key for a task's target coordinates.
pub const DEFAULT_COORDINATES_KEY: &str = "TargetCoordinates";

/// A single fact.
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Entity(Entity),
    Coordinates(Coordinates),
}

impl FactValue {
    pub fn as_entity(&self) -> Option<Entity> {
        match self {
            FactValue::Entity(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_coordinates(&self) -> Option<Coordinates> {
        match self {
            FactValue::Coordinates(c) => Some(*c),
            _ => None,
        }
    }
}

/// Read access to facts.
pub trait FactSource {
    fn fact(&self, key: &str) -> Option<&FactValue>;

    fn entity(&self, key: &str) -> Option<Entity> {
        self.fact(key).and_then(FactValue::as_entity)
    }

    fn coordinates(&self, key: &str) -> Option<Coordinates> {
        self.fact(key).and_then(FactValue::as_coordinates)
    }

    fn contains(&self, key: &str) -> bool {
        self.fact(key).is_some()
    }
}

/// An actor's fact store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blackboard {
    facts: HashMap<String, FactValue>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A blackboard that knows its owner
    pub fn for_actor(actor: Entity) -> Self {
        let mut board = Self::new();
        board.set(OWNER_KEY, FactValue::Entity(actor));
        board
    }

    pub fn set(&mut self, key: impl Into<String>, value: FactValue) {
        self.facts.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FactValue> {
        self.facts.remove(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

}

impl FactSource for Blackboard {
    fn fact(&self, key: &str) -> Option<&FactValue> {
        self.facts.get(key)
    }
}

/// Temporary facts layered over another source.
///
/// Later entries shadow earlier ones, and all entries shadow the base. An
/// entry added with [`without`](Self::without) hides the key entirely.
pub struct FactOverlay<'a> {
    base: &'a dyn FactSource,
    entries: Vec<(String, Option<FactValue>)>,
}

impl<'a> FactOverlay<'a> {
    pub fn new(base: &'a dyn FactSource) -> Self {
        Self {
            base,
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: FactValue) -> Self {
        self.entries.push((key.into(), Some(value)));
        self
    }

    /// Hides `key` from the base
    pub fn without(mut self, key: impl Into<String>) -> Self {
        self.entries.push((key.into(), None));
        self
    }

    /// Adds an entry only when a value is present
    pub fn with_opt(self, key: impl Into<String>, value: Option<FactValue>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }
}

impl FactSource for FactOverlay<'_> {
    fn fact(&self, key: &str) -> Option<&FactValue> {
        match self.entries.iter().rev().find(|(k, _)| k == key) {
            Some((_, value)) => value.as_ref(),
            None => self.base.fact(key),
        }
    }
}
