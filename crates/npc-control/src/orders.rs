//! Multi-actor move orders.
//!
//! When several actors are sent to the same coordinates, the first gets the
//! requested spot and the rest spread out over free tiles in widening rings
//! around it. What happens to an actor for whom no free tile is found is the
//! configured [`CrowdingPolicy`].

use bevy_ecs::entity::Entity;
use npc_messages::{Coordinates, TilePos};
use std::collections::HashSet;

use crate::config::{CrowdingPolicy, MoveOrderConfig};
use crate::error::TaskError;
use crate::world_view::WorldView;

/// Destination per actor, plus actors left out under [`CrowdingPolicy::Skip`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveOrderPlan {
    pub slots: Vec<(Entity, Coordinates)>,
    pub skipped: Vec<Entity>,
}

impl MoveOrderPlan {
    pub fn destination(&self, actor: Entity) -> Option<Coordinates> {
        self.slots
            .iter()
            .find(|(a, _)| *a == actor)
            .map(|(_, c)| *c)
    }
}

/// Spreads `actors` around `destination`.
pub fn plan_move_order(
    actors: &[Entity],
    destination: Coordinates,
    config: &MoveOrderConfig,
    world: &dyn WorldView,
) -> Result<MoveOrderPlan, TaskError> {
    let mut plan = MoveOrderPlan::default();
    let Some((&first, rest)) = actors.split_first() else {
        return Ok(plan);
    };

    let origin = destination.tile();
    let mut taken: HashSet<TilePos> = HashSet::from([origin]);
    plan.slots.push((first, destination));

    for &actor in rest {
        match free_neighbor(origin, config.search_radius, &taken, world) {
            Some(tile) => {
                taken.insert(tile);
                plan.slots.push((actor, tile.center()));
            }
            None => match config.crowding {
                CrowdingPolicy::Stack => plan.slots.push((actor, destination)),
                CrowdingPolicy::Skip => {
                    tracing::debug!(?actor, ?destination, "No free tile, actor left out of move order");
                    plan.skipped.push(actor);
                }
                CrowdingPolicy::Fail => {
                    tracing::debug!(?destination, actors = actors.len(), "No free tile, move order rejected");
                    return Err(TaskError::NoFreeTile);
                }
            },
        }
    }
    Ok(plan)
}

/// Nearest free, unclaimed tile within `radius` rings of `origin`
fn free_neighbor(
    origin: TilePos,
    radius: u32,
    taken: &HashSet<TilePos>,
    world: &dyn WorldView,
) -> Option<TilePos> {
    (1..=radius)
        .flat_map(|r| origin.ring(r))
        .find(|tile| !taken.contains(tile) && world.is_tile_free(*tile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Blocking, Position};
    use crate::registry::ComponentRegistry;
    use crate::world_view::EcsWorldView;
    use bevy_ecs::world::World;

    /// A 3x3 pocket open only at its center and east side
    fn walled_world(actors: usize) -> (World, Vec<Entity>) {
        let mut world = World::new();
        for (x, y) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (-1, 1), (0, 1), (1, 1)] {
            world.spawn((Position::new(x as f32 + 0.5, y as f32 + 0.5), Blocking));
        }
        let ids = (0..actors).map(|_| world.spawn_empty().id()).collect();
        (world, ids)
    }

    fn config(crowding: CrowdingPolicy) -> MoveOrderConfig {
        MoveOrderConfig {
            search_radius: 1,
            crowding,
        }
    }

    #[test]
    fn test_spreads_over_free_tiles() {
        let (world, actors) = walled_world(2);
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let dest = Coordinates::new(0.5, 0.5);

        let plan = plan_move_order(&actors, dest, &config(CrowdingPolicy::Fail), &view).unwrap();
        assert_eq!(plan.destination(actors[0]), Some(dest));
        assert_eq!(plan.destination(actors[1]), Some(TilePos::new(1, 0).center()));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_crowding_policies() {
        let (world, actors) = walled_world(3);
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let dest = Coordinates::new(0.5, 0.5);

        let stacked = plan_move_order(&actors, dest, &config(CrowdingPolicy::Stack), &view).unwrap();
        assert_eq!(stacked.destination(actors[2]), Some(dest));

        let skipped = plan_move_order(&actors, dest, &config(CrowdingPolicy::Skip), &view).unwrap();
        assert_eq!(skipped.slots.len(), 2);
        assert_eq!(skipped.skipped, vec![actors[2]]);

        assert_eq!(
            plan_move_order(&actors, dest, &config(CrowdingPolicy::Fail), &view),
            Err(TaskError::NoFreeTile)
        );
    }

    #[test]
    fn test_empty_order() {
        let world = World::new();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let plan = plan_move_order(&[], Coordinates::new(0.0, 0.0), &MoveOrderConfig::default(), &view).unwrap();
        assert_eq!(plan, MoveOrderPlan::default());
    }
}
