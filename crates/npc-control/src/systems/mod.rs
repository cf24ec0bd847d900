//! ECS Systems
//!
//! Drives the [`TaskController`] resource from a `bevy_ecs` schedule: keeps
//! the actor registry in step with [`Controllable`] components, feeds client
//! messages in, ticks active tasks, runs routines, and turns controller
//! events into outgoing messages.

use bevy_ecs::prelude::*;
use npc_messages::{ClientMessage, ServerMessage, SimTime};
use std::time::Duration;

use crate::components::{Controllable, RoutineTasks};
use crate::controller::TaskController;
use crate::net::{event_messages, handle_client_message};
use crate::registry::ComponentRegistry;
use crate::world_view::EcsWorldView;

/// Simulation clock resource
#[derive(Resource, Debug, Clone, Copy)]
pub struct SimClock {
    pub now: SimTime,
    pub dt: Duration,
}

impl SimClock {
    pub fn new(dt: Duration) -> Self {
        Self {
            now: SimTime::ZERO,
            dt,
        }
    }
}

/// Client messages waiting to be handled this tick
#[derive(Resource, Debug, Default)]
pub struct Inbox(pub Vec<ClientMessage>);

/// Messages produced this tick, for the host to deliver
#[derive(Resource, Debug, Default)]
pub struct Outbox(pub Vec<ServerMessage>);

impl Outbox {
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.0)
    }
}

pub fn advance_clock(mut clock: ResMut<SimClock>) {
    let dt = clock.dt;
    clock.now += dt;
}

/// Brings the controller to the current tick before anything assigns.
pub fn sync_controller_clock(clock: Res<SimClock>, mut controller: ResMut<TaskController>) {
    controller.set_time(clock.now);
}

/// New or edited `Controllable` components update the actor registry.
pub fn register_controllables(
    mut controller: ResMut<TaskController>,
    changed: Query<(Entity, &Controllable), Changed<Controllable>>,
) {
    for (actor, controllable) in &changed {
        controller.register_actor(actor, controllable.controllers.clone());
    }
}

/// Actors that lost `Controllable` (or were despawned) give up their task.
pub fn release_despawned(mut controller: ResMut<TaskController>, mut removed: RemovedComponents<Controllable>) {
    for actor in removed.read() {
        controller.unregister_actor(actor);
    }
}

pub fn process_inbox(world: &mut World) {
    let messages = std::mem::take(&mut world.resource_mut::<Inbox>().0);
    if messages.is_empty() {
        return;
    }

    let replies = world.resource_scope(|world, mut controller: Mut<TaskController>| {
        let world: &World = world;
        let view = EcsWorldView::new(world, world.resource::<ComponentRegistry>());
        let mut replies = Vec::new();
        for message in &messages {
            replies.extend(handle_client_message(&mut controller, message, &view));
        }
        replies
    });
    world.resource_mut::<Outbox>().0.extend(replies);
}

pub fn tick_controller(world: &mut World) {
    let now = world.resource::<SimClock>().now;
    world.resource_scope(|world, mut controller: Mut<TaskController>| {
        let world: &World = world;
        let view = EcsWorldView::new(world, world.resource::<ComponentRegistry>());
        controller.tick(now, &view);
    });
}

/// Gives idle actors work from their routine lists.
pub fn schedule_routines(world: &mut World) {
    let routines: Vec<(Entity, RoutineTasks)> = world
        .query::<(Entity, &RoutineTasks)>()
        .iter(world)
        .map(|(actor, routine)| (actor, routine.clone()))
        .collect();
    if routines.is_empty() {
        return;
    }

    world.resource_scope(|world, mut controller: Mut<TaskController>| {
        let world: &World = world;
        let view = EcsWorldView::new(world, world.resource::<ComponentRegistry>());
        let assigned = controller.run_routines(&routines, &view);
        if !assigned.is_empty() {
            tracing::debug!(count = assigned.len(), "Routine tasks assigned");
        }
    });
}

pub fn flush_events(mut controller: ResMut<TaskController>, mut outbox: ResMut<Outbox>) {
    for event in controller.drain_events() {
        outbox.0.extend(event_messages(&event));
    }
}

/// The full per-tick pipeline, in order.
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            advance_clock,
            sync_controller_clock,
            register_controllables,
            release_despawned,
            process_inbox,
            tick_controller,
            schedule_routines,
            flush_events,
        )
            .chain(),
    );
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TargetKind, TaskCatalog, TaskDefinition};
    use crate::components::{Position, RoutineEntry};
    use crate::config::ControllerConfig;
    use crate::executor::RecordingExecutor;
    use crate::net::to_net;
    use crate::preconditions::Precondition;
    use npc_messages::{ControllerId, Coordinates, TaskId, TaskInfo, TaskRequest};

    fn world_with(defs: Vec<TaskDefinition>) -> (World, RecordingExecutor) {
        let registry = ComponentRegistry::with_builtin();
        let catalog = TaskCatalog::new(defs, &registry).unwrap();
        let executor = RecordingExecutor::new();
        let controller = TaskController::new(catalog, ControllerConfig::default(), Box::new(executor.clone()));

        let mut world = World::new();
        world.insert_resource(registry);
        world.insert_resource(controller);
        world.insert_resource(SimClock::new(Duration::from_millis(250)));
        world.insert_resource(Inbox::default());
        world.insert_resource(Outbox::default());
        (world, executor)
    }

    fn wander() -> TaskDefinition {
        let mut def = TaskDefinition::new("Wander", "WanderCompound");
        def.target = TargetKind::Nothing;
        def
    }

    #[test]
    fn test_spawned_actor_gets_routine_task() {
        let (mut world, executor) = world_with(vec![wander()]);
        let actor = world
            .spawn((
                Controllable::owned_by(ControllerId(1)),
                Position::new(0.0, 0.0),
                RoutineTasks::new(vec![RoutineEntry::new("Wander", 0)]),
            ))
            .id();

        let mut schedule = build_schedule();
        schedule.run(&mut world);

        assert_eq!(executor.started(actor), vec!["WanderCompound".to_string()]);
        let sent = world.resource_mut::<Outbox>().drain();
        assert_eq!(
            sent,
            vec![ServerMessage::TaskInfo(TaskInfo {
                recipient: ControllerId(1),
                actor: to_net(actor),
                task_id: Some(TaskId::new("Wander")),
                target: None,
                coordinates: None,
            })]
        );
    }

    #[test]
    fn test_despawn_releases_actor() {
        let (mut world, _) = world_with(vec![wander()]);
        let actor = world
            .spawn((
                Controllable::owned_by(ControllerId(1)),
                RoutineTasks::new(vec![RoutineEntry::new("Wander", 0)]),
            ))
            .id();

        let mut schedule = build_schedule();
        schedule.run(&mut world);
        assert!(!world.resource::<TaskController>().is_idle(actor));

        world.despawn(actor);
        schedule.run(&mut world);
        assert!(!world.resource::<TaskController>().is_registered(actor));
        assert!(world.resource::<TaskController>().index().is_empty());
    }

    #[test]
    fn test_clock_advances_each_run() {
        let (mut world, _) = world_with(Vec::new());
        let mut schedule = build_schedule();
        schedule.run(&mut world);
        schedule.run(&mut world);

        assert_eq!(world.resource::<SimClock>().now, SimTime::from_secs_f64(0.5));
        assert_eq!(world.resource::<TaskController>().now(), SimTime::from_secs_f64(0.5));
    }

    #[test]
    fn test_ordered_task_finish_measured_from_assignment() {
        let mut move_to = TaskDefinition::new("Move", "MoveToCompound");
        move_to.target = TargetKind::Coordinates;
        move_to.finish_preconditions = vec![Precondition::AlwaysTrue];
        move_to.finish_check_rate = 1.0;
        let (mut world, _) = world_with(vec![move_to]);
        let actor = world
            .spawn((Controllable::owned_by(ControllerId(1)), Position::new(0.0, 0.0)))
            .id();

        let mut schedule = build_schedule();
        schedule.run(&mut world);
        world.resource_mut::<Inbox>().0.push(ClientMessage::TaskRequest(TaskRequest {
            requester: ControllerId(1),
            actors: vec![to_net(actor)],
            target: None,
            coordinates: Some(Coordinates::new(4.5, 4.5)),
        }));
        schedule.run(&mut world);

        let assigned_at = world.resource::<SimClock>().now;
        let task = world.resource::<TaskController>().current_task(actor).cloned().unwrap();
        assert_eq!(task.started_at, assigned_at);

        // Three more ticks is 0.75s after assignment
        for _ in 0..3 {
            schedule.run(&mut world);
        }
        assert!(!world.resource::<TaskController>().is_idle(actor));

        schedule.run(&mut world);
        assert_eq!(world.resource::<SimClock>().now.since(assigned_at), Duration::from_secs(1));
        assert!(world.resource::<TaskController>().is_idle(actor));
    }
}
