//! Who is performing what on which target.

use bevy_ecs::entity::Entity;
use npc_messages::TaskId;
use std::collections::{BTreeMap, BTreeSet};

/// `(target, task) -> performers`. Only entity-targeted tasks are tracked.
#[derive(Debug, Clone, Default)]
pub struct TaskAssignmentIndex {
    performers: BTreeMap<(Entity, TaskId), BTreeSet<Entity>>,
}

impl TaskAssignmentIndex {
    pub fn insert(&mut self, target: Entity, task: &TaskId, actor: Entity) {
        self.performers
            .entry((target, task.clone()))
            .or_default()
            .insert(actor);
    }

    pub fn remove(&mut self, target: Entity, task: &TaskId, actor: Entity) {
        let key = (target, task.clone());
        if let Some(actors) = self.performers.get_mut(&key) {
            actors.remove(&actor);
            if actors.is_empty() {
                self.performers.remove(&key);
            }
        }
    }

    pub fn performers(&self, target: Entity, task: &TaskId) -> BTreeSet<Entity> {
        self.performers
            .get(&(target, task.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Performers other than `actor`
    pub fn count_excluding(&self, target: Entity, task: &TaskId, actor: Entity) -> usize {
        self.performers
            .get(&(target, task.clone()))
            .map_or(0, |actors| actors.iter().filter(|&&a| a != actor).count())
    }

    /// Whether one more actor fits under `max`; `None` is unlimited
    pub fn has_room(&self, target: Entity, task: &TaskId, actor: Entity, max: Option<u32>) -> bool {
        max.map_or(true, |max| self.count_excluding(target, task, actor) < max as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Entity, TaskId), &BTreeSet<Entity>)> {
        self.performers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.performers.is_empty()
    }
}
