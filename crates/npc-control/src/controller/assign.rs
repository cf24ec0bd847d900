//! Task resolution, assignment and finishing.

use bevy_ecs::entity::Entity;
use npc_messages::{Coordinates, TaskId};

use super::{ActiveTask, AssignmentOrigin, ControllerEvent, TaskController};
use crate::blackboard::{FactOverlay, FactValue};
use crate::catalog::TaskDefinition;
use crate::error::TaskError;
use crate::preconditions::{all_hold, EvalContext};
use crate::world_view::WorldView;

/// Outcome of [`TaskController::request_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResolution {
    /// Zero or one task qualifies and it may be assigned directly
    Tasks(Vec<TaskId>),
    /// The user has to pick; never resolved automatically
    AmbiguousNeedsUI(Vec<TaskId>),
}

impl TaskResolution {
    /// Every qualifying task, in catalog order
    pub fn options(&self) -> &[TaskId] {
        match self {
            TaskResolution::Tasks(ids) | TaskResolution::AmbiguousNeedsUI(ids) => ids,
        }
    }

    /// The task to assign without asking, if any
    pub fn automatic(&self) -> Option<&TaskId> {
        match self {
            TaskResolution::Tasks(ids) => ids.first(),
            TaskResolution::AmbiguousNeedsUI(_) => None,
        }
    }
}

impl TaskController {
    /// Target eligibility and start preconditions for `actor`, with the
    /// would-be target and coordinates visible under the task's keys.
    pub fn is_eligible(
        &self,
        def: &TaskDefinition,
        actor: Entity,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        world: &dyn WorldView,
    ) -> bool {
        let Some(state) = self.actors.get(&actor) else {
            return false;
        };
        if !def.accepts_target(Some(actor), target, coordinates, world) {
            return false;
        }
        let coordinates = coordinates.or_else(|| target.and_then(|t| world.position(t)));
        let mut facts = FactOverlay::new(&state.blackboard);
        // Assigning fails the current task first, which clears its keys
        if let Some(active) = state.active.as_ref().filter(|a| a.delete_keys_on_finish) {
            facts = facts
                .without(active.target_key.as_str())
                .without(active.coordinates_key.as_str());
        }
        let facts = facts
            .with_opt(def.target_key.as_str(), target.map(FactValue::Entity))
            .with_opt(
                def.target_coordinates_key.as_str(),
                coordinates.map(FactValue::Coordinates),
            );
        all_hold(
            &def.start_preconditions,
            &EvalContext::new(Some(actor), &facts, world),
        )
    }

    /// Which tasks `actor` could perform on this target / at these
    /// coordinates. More than one candidate, or a sole `manual_only` one,
    /// needs a pick from the user.
    pub fn request_task(
        &self,
        actor: Entity,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        world: &dyn WorldView,
    ) -> Result<TaskResolution, TaskError> {
        if !self.actors.contains_key(&actor) {
            return Err(TaskError::UnknownActor);
        }

        let candidates: Vec<&TaskDefinition> = self
            .catalog
            .iter()
            .map(|def| def.as_ref())
            .filter(|def| self.is_eligible(def, actor, target, coordinates, world))
            .collect();
        let ids: Vec<TaskId> = candidates.iter().map(|d| d.id.clone()).collect();

        let resolution = match candidates.as_slice() {
            [] => TaskResolution::Tasks(ids),
            [only] if !only.manual_only => TaskResolution::Tasks(ids),
            _ => TaskResolution::AmbiguousNeedsUI(ids),
        };
        tracing::debug!(?actor, ?target, ?resolution, "Resolved task request");
        Ok(resolution)
    }

    /// Orders `actor` to perform `task_id`. Eligibility and capacity are
    /// checked again here; a previous task is finished as failed first.
    pub fn assign(
        &mut self,
        actor: Entity,
        task_id: &TaskId,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        world: &dyn WorldView,
    ) -> Result<(), TaskError> {
        self.assign_with_origin(actor, task_id, target, coordinates, AssignmentOrigin::Order, world)
    }

    pub(crate) fn assign_with_origin(
        &mut self,
        actor: Entity,
        task_id: &TaskId,
        target: Option<Entity>,
        coordinates: Option<Coordinates>,
        origin: AssignmentOrigin,
        world: &dyn WorldView,
    ) -> Result<(), TaskError> {
        if !self.actors.contains_key(&actor) {
            return Err(TaskError::UnknownActor);
        }
        let def = self.catalog.get(task_id.as_str())?.clone();

        if !self.is_eligible(&def, actor, target, coordinates, world) {
            tracing::debug!(?actor, task = %task_id, ?target, "Assignment rejected: not eligible");
            return Err(TaskError::NotEligible {
                task: task_id.clone(),
            });
        }
        if let (Some(target), Some(max)) = (target, def.max_performers) {
            if !self.index.has_room(target, &def.id, actor, Some(max)) {
                tracing::debug!(?actor, task = %task_id, ?target, max, "Assignment rejected: at capacity");
                return Err(TaskError::CapacityExceeded {
                    task: task_id.clone(),
                    max,
                });
            }
        }

        self.finish(actor, true);

        let coordinates = coordinates.or_else(|| target.and_then(|t| world.position(t)));
        let now = self.now;
        let Some(state) = self.actors.get_mut(&actor) else {
            return Err(TaskError::UnknownActor);
        };
        if let Some(target) = target {
            state
                .blackboard
                .set(def.target_key.as_str(), FactValue::Entity(target));
        }
        if let Some(coordinates) = coordinates {
            state.blackboard.set(
                def.target_coordinates_key.as_str(),
                FactValue::Coordinates(coordinates),
            );
        }
        self.executor.start(actor, &def.task, &state.blackboard);
        state.active = Some(ActiveTask::new(&def, target, coordinates, origin, now));

        if let Some(target) = target {
            self.index.insert(target, &def.id, actor);
            if self.passive.mark(target).is_some_and(|m| m.task == def.id) {
                self.passive.remove(target);
                tracing::debug!(?target, task = %def.id, "Consumed passive mark");
            }
        }

        tracing::info!(?actor, task = %def.id, ?target, ?coordinates, ?origin, "Assigned task");
        self.push_task_changed(actor);
        Ok(())
    }

    /// Ends the actor's current task. Runs the completion tree, clears the
    /// task's keys, frees its capacity slot and, on failure, starts the
    /// cooldown. Does nothing for an idle actor.
    ///
    /// Returns the finished task.
    pub fn finish(&mut self, actor: Entity, failed: bool) -> Option<TaskId> {
        let state = self.actors.get_mut(&actor)?;
        let active = state.active.take()?;

        self.executor.stop(actor);
        if let Some(tree) = active.on_finish_task.as_deref() {
            self.executor
                .run_to_completion(actor, tree, &mut state.blackboard);
        }
        if active.delete_keys_on_finish {
            state.blackboard.remove(&active.target_key);
            state.blackboard.remove(&active.coordinates_key);
        }
        let recipients = state.controllers.clone();

        if let Some(target) = active.target {
            self.index.remove(target, &active.task_id, actor);
        }

        if failed {
            let key = (actor, active.task_id.clone());
            if !active.fail_cooldown.is_zero() {
                self.cooldowns.insert(key.clone(), self.now + active.fail_cooldown);
            }
            if let AssignmentOrigin::Routine {
                finish_on_failed: true,
            } = active.origin
            {
                let hold = active
                    .fail_cooldown
                    .max(self.config.routine.failed_retry_delay());
                self.routine_holds.insert(key, self.now + hold);
            }
            tracing::warn!(?actor, task = %active.task_id, "Task failed");
        } else {
            tracing::info!(?actor, task = %active.task_id, "Task finished");
        }

        self.events.push(ControllerEvent::TaskFinished {
            actor,
            task_id: active.task_id.clone(),
            failed,
            recipients,
        });
        self.push_task_changed(actor);
        Some(active.task_id)
    }
}
