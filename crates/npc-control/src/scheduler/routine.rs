//! Routine task selection for idle actors.

use bevy_ecs::entity::Entity;
use npc_messages::TaskId;

use crate::catalog::TargetKind;
use crate::components::RoutineTasks;
use crate::controller::{AssignmentOrigin, TaskController};
use crate::world_view::WorldView;

impl TaskController {
    /// For each idle actor whose scan is due, assigns the highest priority
    /// routine entry (list order among equals) that is off cooldown and has
    /// a target. Returns what was assigned.
    pub fn run_routines(
        &mut self,
        routines: &[(Entity, RoutineTasks)],
        world: &dyn WorldView,
    ) -> Vec<(Entity, TaskId)> {
        let mut assigned = Vec::new();
        if !self.config().routine.enabled {
            return assigned;
        }

        for (actor, routine) in routines {
            let actor = *actor;
            if !self.take_routine_scan(actor) {
                continue;
            }
            if let Some(task) = self.pick_routine(actor, routine, world) {
                assigned.push((actor, task));
            }
        }
        assigned
    }

    fn pick_routine(&mut self, actor: Entity, routine: &RoutineTasks, world: &dyn WorldView) -> Option<TaskId> {
        for entry in routine.by_priority() {
            let Ok(def) = self.catalog().get(entry.task.as_str()).cloned() else {
                tracing::debug!(?actor, task = %entry.task, "Routine entry names an unknown task");
                continue;
            };
            if def.manual_only || self.on_cooldown(actor, &def.id) {
                continue;
            }

            let target = match def.target {
                TargetKind::Entity => match self.passive_task_target(actor, &def, world) {
                    Some(target) => Some(target),
                    None => continue,
                },
                TargetKind::Nothing => None,
                // Nothing to pick coordinates from
                TargetKind::Coordinates => continue,
            };

            let origin = AssignmentOrigin::Routine {
                finish_on_failed: entry.finish_on_failed,
            };
            match self.assign_with_origin(actor, &def.id, target, None, origin, world) {
                Ok(()) => return Some(def.id.clone()),
                Err(err) => {
                    tracing::debug!(?actor, task = %def.id, %err, "Routine assignment rejected");
                }
            }
        }
        None
    }
}
