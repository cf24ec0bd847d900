//! Passive/Routine Scheduler
//!
//! Opportunistic work for idle actors. Users mark targets as passive
//! opportunities for a task ("mine these rocks whenever someone is free");
//! actors with a [`RoutineTasks`](crate::components::RoutineTasks) list pick
//! the highest priority task that has a target, preferring marked ones.

mod passive;
mod routine;

use bevy_ecs::entity::Entity;
use npc_messages::{ControllerId, TaskId};
use std::collections::BTreeMap;

/// Who marked a target, and for what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassiveMark {
    pub task: TaskId,
    pub controller: ControllerId,
}

/// At most one mark per target.
#[derive(Debug, Clone, Default)]
pub struct PassiveMarks {
    marks: BTreeMap<Entity, PassiveMark>,
}

impl PassiveMarks {
    pub fn mark(&self, target: Entity) -> Option<&PassiveMark> {
        self.marks.get(&target)
    }

    /// Marks a target unless it already carries a mark. Returns whether the
    /// target now carries a mark for `task`.
    pub fn insert(&mut self, target: Entity, task: TaskId, controller: ControllerId) -> bool {
        match self.marks.get(&target) {
            Some(existing) => existing.task == task,
            None => {
                self.marks.insert(target, PassiveMark { task, controller });
                true
            }
        }
    }

    pub fn remove(&mut self, target: Entity) -> Option<PassiveMark> {
        self.marks.remove(&target)
    }

    /// Targets marked for `task`, in entity order
    pub fn targets_for<'a>(&'a self, task: &'a TaskId) -> impl Iterator<Item = Entity> + 'a {
        self.marks
            .iter()
            .filter(move |(_, m)| &m.task == task)
            .map(|(&e, _)| e)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(Entity, &PassiveMark) -> bool) {
        self.marks.retain(|&e, m| keep(e, m));
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
