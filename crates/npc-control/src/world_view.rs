//! World View
//!
//! The narrow read-only interface the controller needs from the host: entity
//! existence, positions, tags, registered components, and a handful of
//! domain states. [`EcsWorldView`] implements it over a `bevy_ecs` world.

use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use npc_messages::{Coordinates, TilePos};

use crate::components::{Bleeding, Blocking, Construction, Mob, MobState, Position, Tags};
use crate::registry::{ComponentKey, ComponentRegistry};

/// Read-only queries against the host world.
pub trait WorldView {
    fn exists(&self, entity: Entity) -> bool;

    fn position(&self, entity: Entity) -> Option<Coordinates>;

    fn has_tag(&self, entity: Entity, tag: &str) -> bool;

    /// Whether the entity carries the component registered under `key`
    fn has_component(&self, entity: Entity, key: ComponentKey) -> bool;

    fn mob_state(&self, entity: Entity) -> Option<MobState>;

    fn is_bleeding(&self, entity: Entity) -> bool;

    fn construction(&self, entity: Entity) -> Option<Construction>;

    /// Positioned entities within `range` of `center`, in entity order
    fn entities_in_range(&self, center: Coordinates, range: f32) -> Vec<Entity>;

    /// No blocking entity stands on the tile
    fn is_tile_free(&self, tile: TilePos) -> bool;

    fn distance(&self, a: Entity, b: Entity) -> Option<f32> {
        Some(self.position(a)?.distance(&self.position(b)?))
    }
}

/// [`WorldView`] over a `bevy_ecs` world.
pub struct EcsWorldView<'w> {
    world: &'w World,
    registry: &'w ComponentRegistry,
}

impl<'w> EcsWorldView<'w> {
    pub fn new(world: &'w World, registry: &'w ComponentRegistry) -> Self {
        Self { world, registry }
    }
}

impl WorldView for EcsWorldView<'_> {
    fn exists(&self, entity: Entity) -> bool {
        self.world.get_entity(entity).is_some()
    }

    fn position(&self, entity: Entity) -> Option<Coordinates> {
        self.world.get::<Position>(entity).map(|p| p.0)
    }

    fn has_tag(&self, entity: Entity, tag: &str) -> bool {
        self.world
            .get::<Tags>(entity)
            .is_some_and(|tags| tags.contains(tag))
    }

    fn has_component(&self, entity: Entity, key: ComponentKey) -> bool {
        let Some(type_id) = self.registry.type_id(key) else {
            return false;
        };
        self.world
            .get_entity(entity)
            .is_some_and(|e| e.contains_type_id(type_id))
    }

    fn mob_state(&self, entity: Entity) -> Option<MobState> {
        self.world.get::<Mob>(entity).map(|m| m.state)
    }

    fn is_bleeding(&self, entity: Entity) -> bool {
        self.world
            .get::<Bleeding>(entity)
            .is_some_and(|b| b.rate > 0.0)
    }

    fn construction(&self, entity: Entity) -> Option<Construction> {
        self.world.get::<Construction>(entity).copied()
    }

    fn entities_in_range(&self, center: Coordinates, range: f32) -> Vec<Entity> {
        let mut found: Vec<Entity> = self
            .world
            .iter_entities()
            .filter_map(|e| {
                let pos = e.get::<Position>()?;
                (pos.0.distance(&center) <= range).then_some(e.id())
            })
            .collect();
        found.sort();
        found
    }

    fn is_tile_free(&self, tile: TilePos) -> bool {
        !self.world.iter_entities().any(|e| {
            e.contains::<Blocking>() && e.get::<Position>().is_some_and(|p| p.0.tile() == tile)
        })
    }
}
