//! Periodic checks on active tasks.

use bevy_ecs::entity::Entity;
use npc_messages::SimTime;
use std::collections::BTreeSet;

use super::TaskController;
use crate::preconditions::{all_hold, EvalContext};
use crate::world_view::WorldView;

/// Why `tick` ended a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Succeeded,
    Failed(&'static str),
}

impl TaskController {
    /// Advances the clock and checks every active task:
    ///
    /// - a task missing from the catalog fails at once
    /// - a task whose target is gone fails
    /// - performers beyond a (reloaded) `max_performers` fail, keeping the
    ///   first ones in index order
    /// - a plan failure older than the task's fail-await time fails
    /// - every `finish_check_rate`, finish preconditions are evaluated and,
    ///   if there are any and all hold, the task succeeds
    ///
    /// Passive marks on despawned targets are dropped.
    pub fn tick(&mut self, now: SimTime, world: &dyn WorldView) {
        self.set_time(now);
        let now = self.now;

        let busy: Vec<Entity> = self
            .actors
            .iter()
            .filter(|(_, s)| s.active.is_some())
            .map(|(&a, _)| a)
            .collect();
        let surplus = self.surplus_performers();

        for actor in busy {
            let verdict = if surplus.contains(&actor) {
                Verdict::Failed("over capacity")
            } else {
                self.check(actor, now, world)
            };
            match verdict {
                Verdict::Keep => {}
                Verdict::Succeeded => {
                    self.finish(actor, false);
                }
                Verdict::Failed(reason) => {
                    tracing::debug!(?actor, reason, "Ending task");
                    self.finish(actor, true);
                }
            }
        }

        self.passive.retain(|target, _| world.exists(target));
        self.cooldowns.retain(|_, until| now < *until);
        self.routine_holds.retain(|_, until| now < *until);
    }

    fn surplus_performers(&self) -> BTreeSet<Entity> {
        let mut surplus = BTreeSet::new();
        for ((_, task), actors) in self.index.iter() {
            let Some(max) = self.catalog.get(task.as_str()).ok().and_then(|d| d.max_performers) else {
                continue;
            };
            surplus.extend(actors.iter().skip(max as usize).copied());
        }
        surplus
    }

    fn check(&mut self, actor: Entity, now: SimTime, world: &dyn WorldView) -> Verdict {
        let Some(state) = self.actors.get_mut(&actor) else {
            return Verdict::Keep;
        };
        let Some(active) = state.active.as_mut() else {
            return Verdict::Keep;
        };

        let Ok(def) = self.catalog.get(active.task_id.as_str()) else {
            tracing::error!(?actor, task = %active.task_id, "Active task missing from catalog");
            return Verdict::Failed("unknown task");
        };
        if active.target.is_some_and(|t| !world.exists(t)) {
            return Verdict::Failed("target despawned");
        }
        if active.plan_failed_deadline.is_some_and(|d| now >= d) {
            tracing::warn!(?actor, task = %active.task_id, "No plan within fail-await time");
            return Verdict::Failed("plan failed");
        }

        if now.since(active.last_finish_check) < def.finish_check_rate() {
            return Verdict::Keep;
        }
        active.last_finish_check = now;
        if def.finish_preconditions.is_empty() {
            return Verdict::Keep;
        }

        let ctx = EvalContext::new(Some(actor), &state.blackboard, world);
        if all_hold(&def.finish_preconditions, &ctx) {
            Verdict::Succeeded
        } else {
            Verdict::Keep
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskDefinition;
    use crate::components::{Position, Tags};
    use crate::controller::tests::controller_with;
    use crate::controller::ControllerEvent;
    use crate::preconditions::Precondition;
    use crate::registry::ComponentRegistry;
    use crate::world_view::EcsWorldView;
    use bevy_ecs::world::World;
    use npc_messages::{ControllerId, TaskId};
    use std::time::Duration;

    fn finished(events: &[ControllerEvent]) -> Vec<(TaskId, bool)> {
        events
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::TaskFinished { task_id, failed, .. } => Some((task_id.clone(), *failed)),
                _ => None,
            })
            .collect()
    }

    fn chop() -> TaskDefinition {
        let mut def = TaskDefinition::new("Chop", "ChopCompound");
        def.whitelist.tags = vec!["Tree".into()];
        def.fail_await_time = 2.0;
        def
    }

    #[test]
    fn test_plan_failure_debounce() {
        let mut world = World::new();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let (mut controller, _) = controller_with(vec![chop()]);
        controller.register_actor(actor, vec![ControllerId(1)]);
        let chop_id = TaskId::new("Chop");

        {
            let view = EcsWorldView::new(&world, &registry);
            controller.assign(actor, &chop_id, Some(tree), None, &view).unwrap();

            // A failure that recovers in time is forgiven
            controller.report_plan_failed(actor, SimTime::from_secs_f64(0.5));
            controller.tick(SimTime::from_secs_f64(1.0), &view);
            controller.report_plan_started(actor);
            controller.tick(SimTime::from_secs_f64(3.0), &view);
            assert!(!controller.is_idle(actor));

            // Repeated reports do not push the deadline back
            controller.report_plan_failed(actor, SimTime::from_secs_f64(3.0));
            controller.report_plan_failed(actor, SimTime::from_secs_f64(4.0));
            assert_eq!(
                controller.current_task(actor).unwrap().plan_failed_deadline(),
                Some(SimTime::from_secs_f64(5.0))
            );
            controller.tick(SimTime::from_secs_f64(4.5), &view);
            assert!(!controller.is_idle(actor));
            controller.tick(SimTime::from_secs_f64(5.0), &view);
            assert!(controller.is_idle(actor));
        }

        let events = controller.drain_events();
        assert_eq!(finished(&events), vec![(chop_id, true)]);
    }

    #[test]
    fn test_despawned_target_fails_task() {
        let mut world = World::new();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let (mut controller, _) = controller_with(vec![chop()]);
        controller.register_actor(actor, Vec::new());

        {
            let view = EcsWorldView::new(&world, &registry);
            controller
                .assign(actor, &TaskId::new("Chop"), Some(tree), None, &view)
                .unwrap();
        }
        world.despawn(tree);
        {
            let view = EcsWorldView::new(&world, &registry);
            controller.tick(SimTime::from_secs_f64(0.1), &view);
        }

        assert!(controller.is_idle(actor));
        assert_eq!(controller.performers(tree, &TaskId::new("Chop")), 0);
    }

    #[test]
    fn test_reload_removing_active_task_fails_closed() {
        let mut world = World::new();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let (mut controller, _) = controller_with(vec![chop()]);
        controller.register_actor(actor, Vec::new());
        controller
            .assign(actor, &TaskId::new("Chop"), Some(tree), None, &view)
            .unwrap();

        controller
            .reload_catalog(vec![TaskDefinition::new("Other", "OtherCompound")], &registry)
            .unwrap();
        controller.drain_events();
        controller.tick(SimTime::from_secs_f64(0.1), &view);

        assert!(controller.is_idle(actor));
        assert_eq!(
            finished(&controller.drain_events()),
            vec![(TaskId::new("Chop"), true)]
        );
    }

    #[test]
    fn test_finish_check_respects_rate() {
        let mut world = World::new();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);

        let mut def = chop();
        def.finish_check_rate = 2.0;
        def.finish_preconditions = vec![Precondition::has_tag("Tree")];
        let (mut controller, _) = controller_with(vec![def]);
        controller.register_actor(actor, Vec::new());
        controller
            .assign(actor, &TaskId::new("Chop"), Some(tree), None, &view)
            .unwrap();

        let mut now = SimTime::ZERO;
        for _ in 0..3 {
            now += Duration::from_millis(500);
            controller.tick(now, &view);
            assert!(!controller.is_idle(actor));
        }
        now += Duration::from_millis(500);
        controller.tick(now, &view);
        assert!(controller.is_idle(actor));
    }

    #[test]
    fn test_empty_finish_list_never_finishes() {
        let mut world = World::new();
        let actor = world.spawn(Position::new(0.0, 0.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let (mut controller, _) = controller_with(vec![chop()]);
        controller.register_actor(actor, Vec::new());
        controller
            .assign(actor, &TaskId::new("Chop"), Some(tree), None, &view)
            .unwrap();

        controller.tick(SimTime::from_secs_f64(100.0), &view);
        assert!(!controller.is_idle(actor));
    }

    #[test]
    fn test_lowered_capacity_fails_surplus_performers() {
        let mut world = World::new();
        let first = world.spawn(Position::new(0.0, 0.0)).id();
        let second = world.spawn(Position::new(0.0, 1.0)).id();
        let third = world.spawn(Position::new(0.0, 2.0)).id();
        let tree = world.spawn((Position::new(1.0, 0.0), Tags::new(["Tree"]))).id();
        let registry = ComponentRegistry::with_builtin();
        let view = EcsWorldView::new(&world, &registry);
        let mut crowded = chop();
        crowded.max_performers = Some(3);
        let (mut controller, _) = controller_with(vec![crowded]);
        let chop_id = TaskId::new("Chop");
        for actor in [first, second, third] {
            controller.register_actor(actor, Vec::new());
            controller.assign(actor, &chop_id, Some(tree), None, &view).unwrap();
        }
        controller.drain_events();

        let mut narrowed = chop();
        narrowed.max_performers = Some(1);
        controller.reload_catalog(vec![narrowed], &registry).unwrap();
        controller.tick(SimTime::from_secs_f64(0.1), &view);

        assert!(!controller.is_idle(first));
        assert!(controller.is_idle(second));
        assert!(controller.is_idle(third));
        assert_eq!(controller.performers(tree, &chop_id), 1);
        assert_eq!(
            finished(&controller.drain_events()),
            vec![(chop_id.clone(), true), (chop_id, true)]
        );
    }
}
