//! Passive target marking and passive target lookup.

use bevy_ecs::entity::Entity;
use npc_messages::{ControllerId, TaskId};
use std::collections::BTreeSet;

use crate::blackboard::{Blackboard, FactOverlay, FactValue};
use crate::catalog::TaskDefinition;
use crate::controller::TaskController;
use crate::error::TaskError;
use crate::preconditions::{all_hold, EvalContext};
use crate::query::{best, NearestScorer, QueryContext};
use crate::world_view::WorldView;

impl TaskController {
    /// Marks the targets that fit `task` right now: whitelist and start
    /// preconditions, evaluated without an actor. Targets already marked
    /// for another task are skipped. Returns the targets now marked for
    /// `task`.
    pub fn mark_passive(
        &mut self,
        controller: ControllerId,
        task: &TaskId,
        targets: &[Entity],
        world: &dyn WorldView,
    ) -> Result<Vec<Entity>, TaskError> {
        let def = self.catalog().get(task.as_str())?.clone();
        if !def.passive {
            return Err(TaskError::NotEligible { task: task.clone() });
        }

        let mut marked = Vec::new();
        for &target in targets {
            if !passive_fit(&def, target, world) {
                continue;
            }
            if self.passive.insert(target, def.id.clone(), controller) {
                marked.push(target);
            }
        }
        tracing::info!(%controller, %task, requested = targets.len(), marked = marked.len(), "Marked passive targets");
        Ok(marked)
    }

    /// Removes marks `controller` placed for `task`. Returns the targets unmarked.
    pub fn unmark_passive(&mut self, controller: ControllerId, task: &TaskId, targets: &[Entity]) -> Vec<Entity> {
        let mut removed = Vec::new();
        for &target in targets {
            let owned = self
                .passive
                .mark(target)
                .is_some_and(|m| &m.task == task && m.controller == controller);
            if owned {
                self.passive.remove(target);
                removed.push(target);
            }
        }
        tracing::debug!(%controller, %task, removed = removed.len(), "Unmarked passive targets");
        removed
    }

    /// Where `actor` should perform `def` on its own: the nearest marked
    /// target it is eligible for and that has room, else the best result of
    /// the task's utility query.
    pub fn passive_task_target(
        &self,
        actor: Entity,
        def: &TaskDefinition,
        world: &dyn WorldView,
    ) -> Option<Entity> {
        let board = self.blackboard(actor)?;
        let ctx = QueryContext::new(EvalContext::new(Some(actor), board, world)).with_marks(&self.passive);
        let usable = |target: &Entity| {
            self.index().has_room(*target, &def.id, actor, def.max_performers)
                && self.is_eligible(def, actor, Some(*target), None, world)
        };

        let marked: BTreeSet<Entity> = self.passive.targets_for(&def.id).filter(usable).collect();
        if let Some(target) = best(&marked, &NearestScorer, &ctx) {
            return Some(target);
        }

        let query = def.query.as_ref()?;
        let mut candidates = query.candidates(&ctx);
        candidates.retain(usable);
        query.rank(&candidates, &ctx)
    }
}

/// Whitelist and start preconditions with nobody performing.
fn passive_fit(def: &TaskDefinition, target: Entity, world: &dyn WorldView) -> bool {
    if !def.accepts_target(None, Some(target), None, world) {
        return false;
    }
    let empty = Blackboard::new();
    let facts = FactOverlay::new(&empty)
        .with(def.target_key.as_str(), FactValue::Entity(target))
        .with_opt(
            def.target_coordinates_key.as_str(),
            world.position(target).map(FactValue::Coordinates),
        );
    all_hold(&def.start_preconditions, &EvalContext::new(None, &facts, world))
}
