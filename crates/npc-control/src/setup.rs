//! World Setup
//!
//! Populates a demo world: a scatter of rocks and trees, a few controllable
//! workers with routine lists, and the resources the systems expect.

use bevy_ecs::prelude::*;
use npc_messages::ControllerId;
use rand::rngs::SmallRng;
use rand::Rng;
use std::time::Duration;

use crate::catalog::TaskCatalog;
use crate::components::{Blocking, Controllable, Mob, MobState, Position, RoutineEntry, RoutineTasks, Tags};
use crate::config::ControllerConfig;
use crate::controller::TaskController;
use crate::executor::BehaviorExecutor;
use crate::registry::ComponentRegistry;
use crate::systems::{Inbox, Outbox, SimClock};

/// Seeded random number generator resource
#[derive(Resource)]
pub struct SimRng(pub SmallRng);

/// How much to spawn.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub actors: usize,
    pub rocks: usize,
    pub trees: usize,
    /// Side length of the square map, in tiles
    pub map_size: f32,
    /// The user that owns every spawned actor
    pub owner: ControllerId,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            actors: 4,
            rocks: 12,
            trees: 12,
            map_size: 32.0,
            owner: ControllerId(1),
        }
    }
}

/// Inserts the controller and the resources the systems read.
pub fn insert_resources(
    world: &mut World,
    catalog: TaskCatalog,
    config: ControllerConfig,
    registry: ComponentRegistry,
    executor: Box<dyn BehaviorExecutor>,
    dt: Duration,
) {
    world.insert_resource(registry);
    world.insert_resource(TaskController::new(catalog, config, executor));
    world.insert_resource(SimClock::new(dt));
    world.insert_resource(Inbox::default());
    world.insert_resource(Outbox::default());
}

fn random_position(rng: &mut SmallRng, size: f32) -> Position {
    Position::new(rng.gen_range(0.0..size).floor() + 0.5, rng.gen_range(0.0..size).floor() + 0.5)
}

/// The routine every spawned worker follows
fn worker_routine() -> RoutineTasks {
    RoutineTasks::new(vec![
        RoutineEntry::new("Mine", 10).finish_on_failed(),
        RoutineEntry::new("Chop", 10).finish_on_failed(),
        RoutineEntry::new("Wander", 0),
    ])
}

/// Spawns resources and workers. Returns the workers.
pub fn spawn_world(world: &mut World, config: &SpawnConfig, rng: &mut SmallRng) -> Vec<Entity> {
    for _ in 0..config.rocks {
        let position = random_position(rng, config.map_size);
        world.spawn((position, Tags::new(["Rock"]), Blocking));
    }
    for _ in 0..config.trees {
        let position = random_position(rng, config.map_size);
        world.spawn((position, Tags::new(["Tree"]), Blocking));
    }

    (0..config.actors)
        .map(|_| {
            let position = random_position(rng, config.map_size);
            world
                .spawn((
                    position,
                    Tags::new(["Worker"]),
                    Mob::new(MobState::Alive),
                    Controllable::owned_by(config.owner),
                    worker_routine(),
                ))
                .id()
        })
        .collect()
}

/// Counts of what a world holds
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SpawnSummary {
    pub actors: usize,
    pub rocks: usize,
    pub trees: usize,
}

pub fn spawn_summary(world: &mut World) -> SpawnSummary {
    let mut summary = SpawnSummary {
        actors: world.query::<&Controllable>().iter(world).count(),
        ..Default::default()
    };
    for tags in world.query::<&Tags>().iter(world) {
        if tags.contains("Rock") {
            summary.rocks += 1;
        }
        if tags.contains("Tree") {
            summary.trees += 1;
        }
    }
    summary
}

impl std::fmt::Display for SpawnSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} actors, {} rocks, {} trees", self.actors, self.rocks, self.trees)
    }
}
